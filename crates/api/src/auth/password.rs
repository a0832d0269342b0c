//! Password hashing with Argon2
//!
//! The vault is the only place a plaintext password is handled. Hashes are
//! stored as the PHC string bytes (`$argon2id$v=19$m=...`), which embed the
//! salt and cost parameters so verification needs nothing else.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;
/// Maximum accepted password length
pub const MAX_PASSWORD_LEN: usize = 128;

/// Argon2id password hasher and verifier
#[derive(Debug, Clone)]
pub struct PasswordVault {
    params: Params,
}

impl Default for PasswordVault {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordVault {
    /// Create a vault with explicit Argon2 cost parameters
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<Vec<u8>, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string().into_bytes())
            .map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// Verify a password against a stored hash.
    ///
    /// The final digest comparison is constant-time; a malformed stored hash
    /// is an error, never a match.
    pub fn verify(&self, hash: &[u8], password: &str) -> Result<bool, PasswordError> {
        let encoded =
            std::str::from_utf8(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
        let parsed_hash =
            PasswordHash::new(encoded).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

        Ok(self
            .argon2()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// [`hash`](Self::hash) on the blocking thread pool
    pub async fn hash_blocking(&self, password: String) -> Result<Vec<u8>, PasswordError> {
        let vault = self.clone();
        tokio::task::spawn_blocking(move || vault.hash(&password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// [`verify`](Self::verify) on the blocking thread pool
    pub async fn verify_blocking(
        &self,
        hash: Vec<u8>,
        password: String,
    ) -> Result<bool, PasswordError> {
        let vault = self.clone();
        tokio::task::spawn_blocking(move || vault.verify(&hash, &password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }
}

/// Validate password length
pub fn validate_password(password: &str) -> Result<(), PasswordValidationError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(PasswordValidationError::TooShort);
    }
    if len > MAX_PASSWORD_LEN {
        return Err(PasswordValidationError::TooLong);
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
    #[error("Password hashing task failed: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordValidationError {
    #[error("Password must be at least 8 characters")]
    TooShort,
    #[error("Password must be at most 128 characters")]
    TooLong,
}

#[cfg(test)]
pub(crate) fn test_vault() -> PasswordVault {
    // Cheap parameters so tests don't spend seconds per hash
    PasswordVault::new(Params::new(1024, 1, 1, None).unwrap())
}
