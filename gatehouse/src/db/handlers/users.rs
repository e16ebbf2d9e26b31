//! Database repository for users.

use crate::db::{
    errors::{DbError, Result},
    models::users::{LoginUser, SuperuserSeedDBRequest, User},
};
use crate::types::{UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

/// Columns of [`User`], in declaration order.
const USER_COLUMNS: &str = "id, username, email, is_active, is_superuser, created_at, last_login, token, token_created_at";

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip_all, err)]
    pub async fn get_by_token(&mut self, token: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE token = $1"))
            .bind(token)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_login_user_by_email(&mut self, email: &str) -> Result<Option<LoginUser>> {
        let user = sqlx::query_as::<_, LoginUser>(&format!(
            "SELECT {USER_COLUMNS}, password_hash, two_factor_secret FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update_last_login(&mut self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET last_login = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }

    #[instrument(skip(self, token), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn rotate_token(&mut self, id: UserId, token: &str, at: DateTime<Utc>) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET token = $2, token_created_at = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(token)
        .bind(at)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn clear_token(&mut self, id: UserId) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET token = NULL, token_created_at = NULL WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }

    /// Create the superuser if the email is unknown, otherwise promote it and (optionally) reset
    /// its password. Idempotent.
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn upsert_superuser(&mut self, request: &SuperuserSeedDBRequest) -> Result<UserId> {
        let mut tx = self.db.begin().await?;

        let existing: Option<UserId> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(&request.email)
            .fetch_optional(&mut *tx)
            .await?;

        let id = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET is_superuser = TRUE,
                        is_active = TRUE,
                        password_hash = COALESCE($2, password_hash),
                        two_factor_secret = COALESCE($3, two_factor_secret)
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&request.password_hash)
                .bind(&request.two_factor_secret)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO users (id, username, email, password_hash, two_factor_secret, is_active, is_superuser)
                    VALUES ($1, $2, $2, $3, $4, TRUE, TRUE)
                    "#,
                )
                .bind(id)
                .bind(&request.email)
                .bind(&request.password_hash)
                .bind(&request.two_factor_secret)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        tx.commit().await?;
        Ok(id)
    }
}
