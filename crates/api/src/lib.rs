//! usermod API library
//!
//! Password credentials, single-use account operation tokens, and request
//! authentication (HTTP Basic and bearer JWT) for services that need a
//! pluggable user-identity component.

pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{AuthConfig, Config};
pub use delivery::{LogDelivery, TokenDelivery};
pub use error::{ApiError, ApiResult};
pub use state::AppState;
