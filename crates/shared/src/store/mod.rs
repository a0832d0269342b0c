//! Storage contracts for users and operation tokens
//!
//! The authentication core only talks to storage through these traits. Reads
//! never return soft-deleted users, and token redemption is a single
//! conditional mutation evaluated by the backend itself.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{error::StoreError, types::{OperationToken, TokenPurpose, User, UserPatch}};

/// Persistence for the authentication-relevant fields of a [`User`]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user. Fails with [`StoreError::DuplicateEmail`] when a
    /// live account already owns the (case-insensitive) email.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Look up a live user by id
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Look up a live user by email (case-insensitive)
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &[u8]) -> Result<(), StoreError>;

    /// Set or clear `is_activated`. Writing the current value succeeds.
    async fn set_activated(&self, id: Uuid, activated: bool) -> Result<(), StoreError>;

    /// Flag the account deleted. The row is retained.
    async fn soft_delete_user(&self, id: Uuid) -> Result<(), StoreError>;

    /// Merge `patch` into the stored profile and return the result
    async fn apply_user_patch(&self, id: Uuid, patch: &UserPatch) -> Result<User, StoreError>;

    /// Round-trip to the backend, used by readiness checks
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Persistence for [`OperationToken`]s
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &OperationToken) -> Result<(), StoreError>;

    async fn find_token(&self, id: Uuid) -> Result<Option<OperationToken>, StoreError>;

    /// Atomically flip `used` to true where the token exists, has the given
    /// purpose, is unused, has not expired at `now` and (when given) belongs
    /// to `expected_user`. Returns the owning user id, or `None` when no
    /// token matched. Of any number of concurrent calls for one token, at
    /// most one returns `Some`.
    async fn mark_token_used(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        expected_user: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, StoreError>;

    /// Clear `used` on a token whose redemption could not be completed.
    /// Expiry, purpose and owner still apply to the next attempt.
    async fn release_token(&self, id: Uuid) -> Result<(), StoreError>;
}
