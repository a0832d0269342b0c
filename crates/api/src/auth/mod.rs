//! Authentication module for usermod

pub mod credentials;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod tokens;

pub use credentials::{normalize_email, AuthPolicy, CredentialError, CredentialStore, NewAccount};
pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{require_auth, AuthMethod, AuthStrategy, AuthUser, BasicAuth, BearerAuth, DynAuthStrategy};
pub use password::{validate_password, PasswordError, PasswordVault};
pub use tokens::{TokenError, TokenManager, DEFAULT_TOKEN_TTL};
