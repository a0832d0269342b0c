//! JWT token generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use usermod_shared::User;
use uuid::Uuid;

/// Expiry used when none (or a non-positive one) is configured
pub const DEFAULT_JWT_EXPIRY_MINUTES: i64 = 15;
/// Upper bound on bearer token lifetime (30 days)
pub const MAX_JWT_EXPIRY_MINUTES: i64 = 30 * 24 * 60;

/// JWT claims structure for issued bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Email
    pub email: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// JWT manager for token operations.
///
/// Built once from configuration. Without a signing secret every issue and
/// validate call fails.
#[derive(Clone)]
pub struct JwtManager {
    keys: Option<Keys>,
    expiry_minutes: i64,
}

impl JwtManager {
    /// Create a new JWT manager. An empty secret disables bearer tokens.
    /// Expiries above [`MAX_JWT_EXPIRY_MINUTES`] are clamped.
    pub fn new(secret: &str, expiry_minutes: i64) -> Self {
        let keys = (!secret.is_empty()).then(|| Keys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        });

        Self {
            keys,
            expiry_minutes: if expiry_minutes > 0 {
                expiry_minutes.min(MAX_JWT_EXPIRY_MINUTES)
            } else {
                DEFAULT_JWT_EXPIRY_MINUTES
            },
        }
    }

    /// Mint a bearer token for an authenticated user
    pub fn issue(&self, user: &User) -> Result<String, JwtError> {
        let keys = self.keys.as_ref().ok_or(JwtError::MissingSecret)?;

        let now = OffsetDateTime::now_utc();
        let exp = now
            .checked_add(Duration::minutes(self.expiry_minutes))
            .ok_or_else(|| JwtError::Encoding("expiry out of range".to_string()))?;

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        // Explicit algorithm prevents algorithm confusion attacks
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate and decode a token
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        let keys = self.keys.as_ref().ok_or(JwtError::MissingSecret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }

    /// Token lifetime in seconds
    pub fn expiry_seconds(&self) -> i64 {
        self.expiry_minutes * 60
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("JWT signing secret is not configured")]
    MissingSecret,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}
