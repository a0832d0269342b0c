//! Out-of-band delivery of operation tokens
//!
//! Activation and reset tokens have to reach the account holder through a
//! channel other than the HTTP response (mail, SMS, a queue). Deployments
//! plug that channel in as a [`TokenDelivery`].

use async_trait::async_trait;
use usermod_shared::{OperationToken, User};

#[async_trait]
pub trait TokenDelivery: Send + Sync {
    /// Hand `token` to its owner. Failures are the sink's to report; the
    /// token stays valid and the request is not failed.
    async fn deliver(&self, user: &User, token: &OperationToken);
}

/// Emits a `tracing` event per token. The token id is only recorded at
/// debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

#[async_trait]
impl TokenDelivery for LogDelivery {
    async fn deliver(&self, user: &User, token: &OperationToken) {
        tracing::info!(
            user_id = %user.id,
            purpose = %token.purpose,
            expires_at = %token.expires_at,
            "Operation token ready for delivery"
        );
        tracing::debug!(user_id = %user.id, token = %token.id, "Operation token value");
    }
}
