//! Storage error types

use thiserror::Error;

/// Errors surfaced by a [`UserStore`](crate::UserStore) or
/// [`TokenStore`](crate::TokenStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map a write error, folding PostgreSQL unique violations into
    /// [`StoreError::DuplicateEmail`].
    pub fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                // PostgreSQL unique violation
                if code == "23505" {
                    return StoreError::DuplicateEmail;
                }
            }
        }
        StoreError::Database(err)
    }
}
