//! Credential store
//!
//! Owns every read and write of a user's authentication fields. Passwords go
//! through [`PasswordVault`] on their way in and are never stored, logged or
//! returned in plaintext.

use std::sync::Arc;

use tokio::sync::OnceCell;
use usermod_shared::{StoreError, User, UserPatch, UserStore};
use uuid::Uuid;

use super::password::{validate_password, PasswordError, PasswordVault};

/// Whether authentication requires an activated account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    pub require_activation: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            require_activation: true,
        }
    }
}

/// Input for account registration
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
}

#[derive(Clone)]
pub struct CredentialStore {
    users: Arc<dyn UserStore>,
    vault: PasswordVault,
    policy: AuthPolicy,
    /// Hash of an unguessable password, verified against when no account
    /// matches so misses cost the same as wrong passwords
    decoy_hash: Arc<OnceCell<Vec<u8>>>,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserStore>, vault: PasswordVault, policy: AuthPolicy) -> Self {
        Self {
            users,
            vault,
            policy,
            decoy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn policy(&self) -> AuthPolicy {
        self.policy
    }

    /// Register a new, unactivated account
    pub async fn create(&self, account: NewAccount) -> Result<User, CredentialError> {
        let email = normalize_email(&account.email)?;
        validate_password(&account.password)
            .map_err(|e| CredentialError::Validation(e.to_string()))?;

        let password_hash = self.vault.hash_blocking(account.password).await?;
        let user = User::new(account.name.trim(), email, password_hash, account.phone_number);
        self.users.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "User account created");
        Ok(user)
    }

    pub async fn authenticate_by_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, CredentialError> {
        let Some(user) = self.users.find_user_by_email(&lookup_key(email)).await? else {
            self.verify_decoy(password).await;
            return Err(CredentialError::NotFound);
        };
        self.check_password(user, password).await
    }

    pub async fn authenticate_by_id(
        &self,
        id: Uuid,
        password: &str,
    ) -> Result<User, CredentialError> {
        let Some(user) = self.users.find_user_by_id(id).await? else {
            self.verify_decoy(password).await;
            return Err(CredentialError::NotFound);
        };
        self.check_password(user, password).await
    }

    /// Spend one password verification on the decoy hash. The outcome is
    /// discarded; the caller reports `NotFound` either way.
    async fn verify_decoy(&self, password: &str) {
        let decoy = self
            .decoy_hash
            .get_or_try_init(|| self.vault.hash_blocking(Uuid::new_v4().to_string()))
            .await;

        let outcome = match decoy {
            Ok(hash) => self
                .vault
                .verify_blocking(hash.clone(), password.to_string())
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "Decoy password verification failed");
        }
    }

    #[cfg(test)]
    pub(crate) fn decoy_ready(&self) -> bool {
        self.decoy_hash.initialized()
    }

    // Password first, so only a holder of the right password learns the
    // account is not yet activated.
    async fn check_password(&self, user: User, password: &str) -> Result<User, CredentialError> {
        let matches = self
            .vault
            .verify_blocking(user.password_hash.clone(), password.to_string())
            .await?;
        if !matches {
            tracing::debug!(user_id = %user.id, "Password verification failed");
            return Err(CredentialError::InvalidCredentials);
        }

        if self.policy.require_activation && !user.is_activated {
            tracing::debug!(user_id = %user.id, "Rejected login for unactivated account");
            return Err(CredentialError::NotActivated);
        }

        Ok(user)
    }

    /// Replace the stored hash with a hash of `new_password`
    pub async fn change_password(
        &self,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<(), CredentialError> {
        let password_hash = self.hash_new_password(new_password).await?;
        self.store_password_hash(user_id, &password_hash).await
    }

    /// Validate and hash a password without touching storage
    pub async fn hash_new_password(&self, new_password: &str) -> Result<Vec<u8>, CredentialError> {
        validate_password(new_password).map_err(|e| CredentialError::Validation(e.to_string()))?;
        Ok(self.vault.hash_blocking(new_password.to_string()).await?)
    }

    /// Store a hash produced by [`hash_new_password`](Self::hash_new_password)
    pub async fn store_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &[u8],
    ) -> Result<(), CredentialError> {
        self.users.update_password_hash(user_id, password_hash).await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Mark the account activated. Activating twice is not an error.
    pub async fn activate(&self, user_id: Uuid) -> Result<(), CredentialError> {
        self.users.set_activated(user_id, true).await?;
        tracing::info!(user_id = %user_id, "User activated");
        Ok(())
    }

    /// Clear the activated flag. Under an activation-required policy the
    /// account can no longer authenticate until it is activated again.
    pub async fn deactivate(&self, user_id: Uuid) -> Result<(), CredentialError> {
        self.users.set_activated(user_id, false).await?;
        tracing::info!(user_id = %user_id, "User deactivated");
        Ok(())
    }

    /// Remove the account from the authentication surface, keeping the row
    pub async fn soft_delete(&self, user_id: Uuid) -> Result<(), CredentialError> {
        self.users.soft_delete_user(user_id).await?;
        tracing::info!(user_id = %user_id, "User soft deleted");
        Ok(())
    }

    /// Merge-patch the profile fields. Absent fields are left unchanged.
    pub async fn update(&self, user_id: Uuid, mut patch: UserPatch) -> Result<User, CredentialError> {
        if let Some(email) = patch.email.take() {
            patch.email = Some(normalize_email(&email)?);
        }
        if let Some(name) = patch.name.take() {
            patch.name = Some(name.trim().to_string());
        }

        if patch.is_empty() {
            return self
                .users
                .find_user_by_id(user_id)
                .await?
                .ok_or(CredentialError::NotFound);
        }

        Ok(self.users.apply_user_patch(user_id, &patch).await?)
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> Result<User, CredentialError> {
        self.users
            .find_user_by_id(user_id)
            .await?
            .ok_or(CredentialError::NotFound)
    }

    /// Look up an activated, live account by email
    pub async fn find_activated_by_email(&self, email: &str) -> Result<User, CredentialError> {
        self.users
            .find_user_by_email(&lookup_key(email))
            .await?
            .filter(|u| u.is_activated)
            .ok_or(CredentialError::NotFound)
    }
}

/// Stored emails are normalized, so lookups use the same folding
fn lookup_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trim and lower-case an email, rejecting obviously malformed addresses
pub fn normalize_email(email: &str) -> Result<String, CredentialError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(CredentialError::Validation("Invalid email address".to_string()));
    }
    Ok(email)
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("User not found")]
    NotFound,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account not activated")]
    NotActivated,
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CredentialError::NotFound,
            StoreError::DuplicateEmail => CredentialError::DuplicateEmail,
            other => CredentialError::Storage(other),
        }
    }
}
