//! Bearer token routes

use axum::{extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Exchange Basic credentials for a short-lived bearer token
pub async fn issue_token(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Json<TokenResponse>> {
    let user = auth_user.account()?;
    let access_token = state.jwt.issue(user)?;

    tracing::info!(user_id = %user.id, "Bearer token issued");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.jwt.expiry_seconds(),
    }))
}

/// Identity carried by the presented bearer token
pub async fn me(auth_user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: auth_user.user_id,
        email: auth_user.email,
    })
}
