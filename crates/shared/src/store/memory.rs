//! In-process storage
//!
//! Backs single-process deployments and tests. Each operation holds the
//! relevant lock for its whole read-check-write, which gives the same
//! conditional-update guarantee the SQL backend gets from row locking.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{TokenStore, UserStore};
use crate::{
    error::StoreError,
    types::{OperationToken, TokenPurpose, User, UserPatch},
};

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    tokens: RwLock<HashMap<Uuid, OperationToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a user row regardless of its deleted flag
    pub async fn user_record(&self, id: Uuid) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Option<Uuid>) -> bool {
        users
            .values()
            .any(|u| !u.is_deleted && Some(u.id) != except && same_email(&u.email, email))
    }
}

// Full Unicode case folding, matching `lower()` on the SQL side
fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn live_mut(users: &mut HashMap<Uuid, User>, id: Uuid) -> Result<&mut User, StoreError> {
    users
        .get_mut(&id)
        .filter(|u| !u.is_deleted)
        .ok_or(StoreError::NotFound)
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if Self::email_taken(&users, &user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id).filter(|u| !u.is_deleted).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| !u.is_deleted && same_email(&u.email, email))
            .cloned())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &[u8]) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = live_mut(&mut users, id)?;
        user.password_hash = password_hash.to_vec();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn set_activated(&self, id: Uuid, activated: bool) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = live_mut(&mut users, id)?;
        user.is_activated = activated;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = live_mut(&mut users, id)?;
        user.is_deleted = true;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn apply_user_patch(&self, id: Uuid, patch: &UserPatch) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if let Some(email) = &patch.email {
            if Self::email_taken(&users, email, Some(id)) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let user = live_mut(&mut users, id)?;
        patch.apply_to(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: &OperationToken) -> Result<(), StoreError> {
        self.tokens.write().await.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_token(&self, id: Uuid) -> Result<Option<OperationToken>, StoreError> {
        Ok(self.tokens.read().await.get(&id).cloned())
    }

    async fn mark_token_used(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        expected_user: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut tokens = self.tokens.write().await;
        let Some(token) = tokens.get_mut(&id) else {
            return Ok(None);
        };

        let owner_matches = expected_user.map_or(true, |uid| uid == token.user_id);
        if token.purpose != purpose || !owner_matches || !token.is_live(now) {
            return Ok(None);
        }

        token.used = true;
        Ok(Some(token.user_id))
    }

    async fn release_token(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().await;
        let token = tokens.get_mut(&id).ok_or(StoreError::NotFound)?;
        token.used = false;
        Ok(())
    }
}
