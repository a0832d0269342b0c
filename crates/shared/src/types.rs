//! Common types used across usermod

use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// What an operation token authorizes its holder to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Activation,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(Self::Activation),
            "password_reset" => Ok(Self::PasswordReset),
            _ => Err(format!("Invalid token purpose: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// A user account.
///
/// `password_hash` holds the PHC-encoded output of the password hasher and is
/// never serialized or printed.
#[derive(Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub phone_number: Option<String>,
    pub is_activated: bool,
    pub is_deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Build a fresh, unactivated account around an already-computed hash
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: Vec<u8>,
        phone_number: Option<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash,
            phone_number,
            is_activated: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("phone_number", &self.phone_number)
            .field("is_activated", &self.is_activated)
            .field("is_deleted", &self.is_deleted)
            .finish()
    }
}

/// Single-use, expiring capability scoped to one user and one purpose.
/// The id is the bearer secret.
#[derive(Debug, Clone, FromRow)]
pub struct OperationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: TokenPurpose,
    pub expires_at: OffsetDateTime,
    pub used: bool,
    pub created_at: OffsetDateTime,
}

impl OperationToken {
    pub fn new(user_id: Uuid, purpose: TokenPurpose, expires_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            purpose,
            expires_at,
            used: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Whether the token could still be redeemed at `now`
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        !self.used && self.expires_at >= now
    }
}

// =============================================================================
// Profile patches
// =============================================================================

/// Partial update of a user's profile fields.
///
/// `None` leaves a field untouched. For the nullable phone number,
/// `Some(None)` clears it while `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "phone", deserialize_with = "present")]
    pub phone_number: Option<Option<String>>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone_number.is_none()
    }

    /// Merge the present fields into `user`
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(phone) = &self.phone_number {
            user.phone_number = phone.clone();
        }
    }
}

/// Marks a field as present even when its value is `null`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
