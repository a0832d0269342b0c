//! Application configuration

use std::env;

use time::Duration;

use crate::auth::{
    jwt::{DEFAULT_JWT_EXPIRY_MINUTES, MAX_JWT_EXPIRY_MINUTES},
    tokens::MAX_TOKEN_TTL_HOURS,
    AuthPolicy, DEFAULT_TOKEN_TTL,
};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub log_format: LogFormat,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub auth: AuthConfig,
}

/// Authentication settings, fixed for the life of the process
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiry_minutes: i64,
    pub token_ttl: Duration,
    pub policy: AuthPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expiry_minutes: DEFAULT_JWT_EXPIRY_MINUTES,
            token_ttl: DEFAULT_TOKEN_TTL,
            policy: AuthPolicy::default(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &if self.jwt_secret.is_empty() { "<unset>" } else { "<redacted>" })
            .field("jwt_expiry_minutes", &self.jwt_expiry_minutes)
            .field("token_ttl", &self.token_ttl)
            .field("policy", &self.policy)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Authentication
            auth: AuthConfig::from_env()?,
        })
    }
}

impl AuthConfig {
    /// Load the authentication settings from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if secret.len() < 32 => {
                return Err(ConfigError::WeakSecret(
                    "JWT_SECRET must be at least 32 characters",
                ));
            }
            Ok(secret) => secret,
            Err(_) => String::new(),
        };

        Ok(Self {
            jwt_secret,
            jwt_expiry_minutes: positive_var(
                "JWT_EXPIRATION",
                DEFAULT_JWT_EXPIRY_MINUTES,
                MAX_JWT_EXPIRY_MINUTES,
            )?,
            token_ttl: Duration::hours(positive_var(
                "TOKEN_TTL_HOURS",
                DEFAULT_TOKEN_TTL.whole_hours(),
                MAX_TOKEN_TTL_HOURS,
            )?),
            policy: AuthPolicy {
                require_activation: env::var("REQUIRE_ACTIVATION")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
            },
        })
    }
}

/// Read a positive integer, falling back to `default` when unset, unparsable
/// or non-positive. Values above `max` are rejected.
fn positive_var(name: &'static str, default: i64, max: i64) -> Result<i64, ConfigError> {
    let value = env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default);

    if value > max {
        return Err(ConfigError::OutOfRange { name, max });
    }
    Ok(value)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("{name} must be at most {max}")]
    OutOfRange { name: &'static str, max: i64 },
}
