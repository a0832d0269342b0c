//! Shared application state

use std::sync::Arc;

use usermod_shared::{TokenStore, UserStore};

use crate::{
    auth::{BasicAuth, BearerAuth, CredentialStore, DynAuthStrategy, JwtManager, PasswordVault, TokenManager},
    config::AuthConfig,
    delivery::{LogDelivery, TokenDelivery},
};

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub credentials: CredentialStore,
    pub tokens: TokenManager,
    pub jwt: Arc<JwtManager>,
    pub delivery: Arc<dyn TokenDelivery>,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        auth: &AuthConfig,
        vault: PasswordVault,
    ) -> Self {
        Self {
            credentials: CredentialStore::new(users.clone(), vault, auth.policy),
            tokens: TokenManager::new(tokens, auth.token_ttl),
            jwt: Arc::new(JwtManager::new(&auth.jwt_secret, auth.jwt_expiry_minutes)),
            delivery: Arc::new(LogDelivery),
            users,
        }
    }

    /// Replace the channel activation and reset tokens are sent through
    pub fn with_delivery(mut self, delivery: Arc<dyn TokenDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Basic-auth strategy for `require_auth`
    pub fn basic_auth(&self) -> DynAuthStrategy {
        Arc::new(BasicAuth::new(self.credentials.clone()))
    }

    /// Bearer-token strategy for `require_auth`
    pub fn bearer_auth(&self) -> DynAuthStrategy {
        Arc::new(BearerAuth::new(self.jwt.clone()))
    }
}
