//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user row as cached and handed to request handlers.
///
/// Secrets (password hash, TOTP secret) are deliberately absent; they only travel on
/// [`LoginUser`], which is never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub token: Option<String>,
    pub token_created_at: Option<DateTime<Utc>>,
}

/// A user together with the credentials needed to log them in.
#[derive(Debug, Clone, FromRow)]
pub struct LoginUser {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: Option<String>,
    pub two_factor_secret: Option<String>,
}

/// Database request for creating (or re-seeding) a superuser account
#[derive(Debug, Clone)]
pub struct SuperuserSeedDBRequest {
    pub email: String,
    pub password_hash: Option<String>,
    pub two_factor_secret: Option<String>,
}
