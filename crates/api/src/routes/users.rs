//! User account routes

use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use usermod_shared::{TokenPurpose, User, UserPatch};
use uuid::Uuid;

use crate::{
    auth::{AuthUser, CredentialError, NewAccount},
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Floor on forgot-password response time, so known and unknown addresses
/// cannot be told apart by latency
pub const FORGOT_PASSWORD_MIN_RESPONSE: Duration = Duration::from_millis(500);

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default, alias = "phone_number")]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone_number,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "newPassword", alias = "new_password")]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub user_id: Uuid,
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Register an account and issue its activation token
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreateUserResponse>)> {
    let user = state
        .credentials
        .create(NewAccount {
            name: req.name,
            email: req.email,
            password: req.password,
            phone_number: req.phone,
        })
        .await?;

    let token = match state.tokens.issue(user.id, TokenPurpose::Activation).await {
        Ok(token) => token,
        Err(e) => {
            // Without a token the account could never be activated; retire it
            // so the address can register again
            if let Err(cleanup) = state.credentials.soft_delete(user.id).await {
                tracing::error!(user_id = %user.id, error = %cleanup, "Failed to retire unactivatable account");
            }
            return Err(e.into());
        }
    };
    state.delivery.deliver(&user, &token).await;

    Ok((StatusCode::CREATED, Json(CreateUserResponse { id: user.id })))
}

/// Return the authenticated user's profile
pub async fn get_user(auth_user: AuthUser) -> ApiResult<Json<UserResponse>> {
    let user = auth_user.account()?.clone();
    Ok(Json(user.into()))
}

/// Merge-patch the authenticated user's profile
pub async fn update_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(patch): Json<UserPatch>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.credentials.update(auth_user.user_id, patch).await?;
    Ok(Json(user.into()))
}

/// Soft delete the authenticated user
pub async fn delete_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Json<MessageResponse>> {
    state.credentials.soft_delete(auth_user.user_id).await?;
    Ok(MessageResponse::new("Account deleted"))
}

/// Change the authenticated user's password
pub async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .credentials
        .change_password(auth_user.user_id, &req.new_password)
        .await?;
    Ok(MessageResponse::new("Password changed"))
}

/// Redeem an activation token and activate its account
pub async fn activate_user(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let token = query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Token must be specified".to_string()))?;

    let user_id = state.tokens.redeem(&token, TokenPurpose::Activation).await?;
    state.credentials.activate(user_id).await?;

    Ok(MessageResponse::new("Account activated"))
}

/// Issue a password reset token for an activated account.
///
/// Responds the same, and no sooner than [`FORGOT_PASSWORD_MIN_RESPONSE`],
/// whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let email = query
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No email specified".to_string()))?;

    let start = Instant::now();
    let result = forgot_password_inner(&state, &email).await;

    let elapsed = start.elapsed();
    if elapsed < FORGOT_PASSWORD_MIN_RESPONSE {
        tokio::time::sleep(FORGOT_PASSWORD_MIN_RESPONSE - elapsed).await;
    }

    result
}

async fn forgot_password_inner(state: &AppState, email: &str) -> ApiResult<Json<MessageResponse>> {
    match state.credentials.find_activated_by_email(email).await {
        Ok(user) => {
            let token = state.tokens.issue(user.id, TokenPurpose::PasswordReset).await?;
            state.delivery.deliver(&user, &token).await;
        }
        Err(CredentialError::NotFound) => {
            tracing::debug!("Password reset requested for unknown or inactive account");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(MessageResponse::new(
        "If an account exists with that email, a password reset token has been issued.",
    ))
}

/// Consume a password reset token and set a new password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    // Cheap read-only check before paying for a hash
    state
        .tokens
        .validate(req.user_id, &req.token, TokenPurpose::PasswordReset)
        .await?;

    // Hash before redeeming so a hashing failure leaves the token usable
    let password_hash = state.credentials.hash_new_password(&req.password).await?;

    let user_id = state
        .tokens
        .redeem_for_user(req.user_id, &req.token, TokenPurpose::PasswordReset)
        .await?;

    if let Err(e) = state.credentials.store_password_hash(user_id, &password_hash).await {
        state.tokens.release(&req.token).await;
        return Err(e.into());
    }

    Ok(MessageResponse::new("Password has been reset"))
}
