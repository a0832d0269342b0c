//! Request authentication
//!
//! An [`AuthStrategy`] turns request headers into an [`AuthUser`] or an
//! error response. The [`require_auth`] middleware runs a strategy and, on
//! success, stores the identity in the request extensions where handlers
//! pick it up through the [`AuthUser`] extractor.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use usermod_shared::User;
use uuid::Uuid;

use super::{credentials::CredentialError, jwt::JwtManager, CredentialStore};
use crate::error::{ApiError, ApiResult};

/// How the current request was authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Basic,
    Bearer,
}

/// Identity resolved for the current request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    /// Full account record, present when the request carried credentials
    pub user: Option<User>,
    pub method: AuthMethod,
}

impl AuthUser {
    /// The account record, for handlers mounted behind Basic auth
    pub fn account(&self) -> ApiResult<&User> {
        self.user.as_ref().ok_or(ApiError::Unauthorized)
    }
}

// A missing identity means the route was not wrapped by `require_auth`;
// treat it as unauthenticated.
#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Resolves an identity from request headers
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<AuthUser>;

    /// `WWW-Authenticate` challenge sent with 401 responses
    fn challenge(&self) -> &'static str;
}

/// Shared handle to a strategy, used as middleware state
pub type DynAuthStrategy = Arc<dyn AuthStrategy>;

/// Middleware that rejects requests the strategy cannot authenticate
pub async fn require_auth(
    State(strategy): State<DynAuthStrategy>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = strategy.authenticate(request.headers()).await;
    match resolved {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            let mut response = err.into_response();
            if response.status() == StatusCode::UNAUTHORIZED {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static(strategy.challenge()));
            }
            response
        }
    }
}

/// Extract the credentials part of an `Authorization: <scheme> <credentials>` header
fn authorization_credentials<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (given, credentials) = value.split_once(' ')?;
    if !given.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let credentials = credentials.trim();
    (!credentials.is_empty()).then_some(credentials)
}

/// Decode `base64(email:password)`
fn decode_basic(credentials: &str) -> Option<(String, String)> {
    let decoded = STANDARD.decode(credentials).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (email, password) = decoded.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

/// HTTP Basic authentication against the credential store
#[derive(Clone)]
pub struct BasicAuth {
    credentials: CredentialStore,
}

impl BasicAuth {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl AuthStrategy for BasicAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<AuthUser> {
        let (email, password) = authorization_credentials(headers, "Basic")
            .and_then(decode_basic)
            .ok_or(ApiError::Unauthorized)?;

        match self.credentials.authenticate_by_email(&email, &password).await {
            Ok(user) => Ok(AuthUser {
                user_id: user.id,
                email: Some(user.email.clone()),
                user: Some(user),
                method: AuthMethod::Basic,
            }),
            Err(
                e @ (CredentialError::NotFound
                | CredentialError::InvalidCredentials
                | CredentialError::NotActivated),
            ) => {
                tracing::warn!(reason = %e, "Basic authentication rejected");
                Err(ApiError::Forbidden)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn challenge(&self) -> &'static str {
        "Basic realm=\"usermod\", charset=\"UTF-8\""
    }
}

/// Bearer JWT authentication
#[derive(Clone)]
pub struct BearerAuth {
    jwt: Arc<JwtManager>,
}

impl BearerAuth {
    pub fn new(jwt: Arc<JwtManager>) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl AuthStrategy for BearerAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<AuthUser> {
        let token = authorization_credentials(headers, "Bearer").ok_or(ApiError::Unauthorized)?;

        // Fail closed: configuration problems reject the request like a bad token
        let claims = self.jwt.validate(token).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            ApiError::Unauthorized
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: Some(claims.email),
            user: None,
            method: AuthMethod::Bearer,
        })
    }

    fn challenge(&self) -> &'static str {
        "Bearer"
    }
}
