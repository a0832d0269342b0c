//! PostgreSQL-backed storage

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{TokenStore, UserStore};
use crate::{
    error::StoreError,
    types::{OperationToken, TokenPurpose, User, UserPatch},
};

const USER_COLUMNS: &str = "id, name, email, password_hash, phone_number, is_activated, is_deleted, created_at, updated_at";

/// Storage over a shared connection pool. Safe to clone and share between
/// server processes; atomicity comes from the database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn rows_or_not_found(rows: u64) -> Result<(), StoreError> {
    if rows == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, phone_number, is_activated, is_deleted, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone_number)
        .bind(user.is_activated)
        .bind(user.is_deleted)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_write)?;

        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT {} FROM users WHERE id = $1 AND is_deleted = FALSE",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1) AND is_deleted = FALSE",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &[u8]) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = NOW()
            WHERE id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;

        rows_or_not_found(result.rows_affected())
    }

    async fn set_activated(&self, id: Uuid, activated: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_activated = $2, updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(activated)
        .execute(&self.pool)
        .await?;

        rows_or_not_found(result.rows_affected())
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        rows_or_not_found(result.rows_affected())
    }

    async fn apply_user_patch(&self, id: Uuid, patch: &UserPatch) -> Result<User, StoreError> {
        let query = format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone_number = CASE WHEN $4 THEN $5 ELSE phone_number END,
                updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let phone = patch.phone_number.as_ref();

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(patch.name.as_deref())
            .bind(patch.email.as_deref())
            .bind(phone.is_some())
            .bind(phone.and_then(|p| p.as_deref()))
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_write)?
            .ok_or(StoreError::NotFound)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, token: &OperationToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_operation_tokens (id, user_id, purpose, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.purpose)
        .bind(token.expires_at)
        .bind(token.used)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_token(&self, id: Uuid) -> Result<Option<OperationToken>, StoreError> {
        let token = sqlx::query_as::<_, OperationToken>(
            r#"
            SELECT id, user_id, purpose, expires_at, used, created_at
            FROM user_operation_tokens
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn mark_token_used(
        &self,
        id: Uuid,
        purpose: TokenPurpose,
        expected_user: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Uuid>, StoreError> {
        // Single statement: the row lock taken by UPDATE serializes racing
        // redemptions, and the loser re-evaluates `used = FALSE` and matches nothing.
        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE user_operation_tokens
            SET used = TRUE
            WHERE id = $1
              AND purpose = $2
              AND used = FALSE
              AND expires_at >= $3
              AND ($4::uuid IS NULL OR user_id = $4)
            RETURNING user_id
            "#,
        )
        .bind(id)
        .bind(purpose)
        .bind(now)
        .bind(expected_user)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }

    async fn release_token(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE user_operation_tokens SET used = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        rows_or_not_found(result.rows_affected())
    }
}
