//! Account activation and password reset tokens
//!
//! Tokens are single-use and expire. The token id doubles as the secret
//! handed to the user, so a redemption is a single conditional update in
//! storage: concurrent attempts on one token produce exactly one winner.
//! Unknown, used, expired, foreign and wrong-purpose tokens all fail with the
//! same [`TokenError::Invalid`].

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use usermod_shared::{OperationToken, StoreError, TokenPurpose, TokenStore};
use uuid::Uuid;

/// Default lifetime of an operation token
pub const DEFAULT_TOKEN_TTL: Duration = Duration::hours(48);
/// Longest lifetime accepted from configuration
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

/// Issues, checks and consumes operation tokens
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    default_ttl: Duration,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token with the configured default lifetime
    pub async fn issue(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
    ) -> Result<OperationToken, TokenError> {
        self.issue_with_ttl(user_id, purpose, self.default_ttl).await
    }

    pub async fn issue_with_ttl(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> Result<OperationToken, TokenError> {
        let expires_at = OffsetDateTime::now_utc()
            .checked_add(ttl)
            .ok_or(TokenError::Lifetime)?;
        let token = OperationToken::new(user_id, purpose, expires_at);
        self.store.insert_token(&token).await?;

        tracing::info!(
            user_id = %user_id,
            purpose = %purpose,
            expires_at = %token.expires_at,
            "Operation token issued"
        );

        Ok(token)
    }

    /// Consume a token, returning the user it was issued to
    pub async fn redeem(&self, raw_token: &str, purpose: TokenPurpose) -> Result<Uuid, TokenError> {
        self.consume(raw_token, purpose, None).await
    }

    /// Consume a token that must belong to `user_id`
    pub async fn redeem_for_user(
        &self,
        user_id: Uuid,
        raw_token: &str,
        purpose: TokenPurpose,
    ) -> Result<Uuid, TokenError> {
        self.consume(raw_token, purpose, Some(user_id)).await
    }

    async fn consume(
        &self,
        raw_token: &str,
        purpose: TokenPurpose,
        expected_user: Option<Uuid>,
    ) -> Result<Uuid, TokenError> {
        let token_id = parse_token(raw_token)?;
        let now = OffsetDateTime::now_utc();

        match self
            .store
            .mark_token_used(token_id, purpose, expected_user, now)
            .await?
        {
            Some(user_id) => {
                tracing::info!(
                    user_id = %user_id,
                    purpose = %purpose,
                    "Operation token redeemed"
                );
                Ok(user_id)
            }
            None => {
                tracing::warn!(purpose = %purpose, "Rejected operation token redemption");
                Err(TokenError::Invalid)
            }
        }
    }

    /// Put a redeemed token back so a failed follow-up can be retried.
    /// Failures are logged; the token then stays spent.
    pub async fn release(&self, raw_token: &str) {
        let Ok(token_id) = parse_token(raw_token) else {
            return;
        };
        match self.store.release_token(token_id).await {
            Ok(()) => tracing::info!(token = %token_id, "Operation token released"),
            Err(e) => tracing::error!(error = %e, "Failed to release operation token"),
        }
    }

    /// Check a token without consuming it
    pub async fn validate(
        &self,
        user_id: Uuid,
        raw_token: &str,
        purpose: TokenPurpose,
    ) -> Result<OperationToken, TokenError> {
        let token_id = parse_token(raw_token)?;

        let token = self
            .store
            .find_token(token_id)
            .await?
            .ok_or(TokenError::Invalid)?;

        if token.user_id != user_id
            || token.purpose != purpose
            || !token.is_live(OffsetDateTime::now_utc())
        {
            return Err(TokenError::Invalid);
        }

        Ok(token)
    }
}

fn parse_token(raw_token: &str) -> Result<Uuid, TokenError> {
    Uuid::parse_str(raw_token.trim()).map_err(|_| TokenError::Invalid)
}

/// Token validation errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Invalid,
    #[error("Token lifetime out of range")]
    Lifetime,
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}
