//! usermod shared types and storage
//!
//! This crate contains the user-identity domain types, the storage contracts
//! the authentication core depends on, and their PostgreSQL and in-process
//! implementations.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{MemoryStore, PgStore, TokenStore, UserStore};
pub use types::*;
