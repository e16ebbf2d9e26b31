//! PostgreSQL implementation of [`AuthRepository`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::{
    errors::Result,
    handlers::{AuthRepository, Groups, Organizations, Users},
    models::{
        organizations::Organization,
        users::{LoginUser, User},
    },
};
use crate::types::{GroupId, UserId};

/// Pool-backed repository. Each call acquires its own connection, so no connection (and no
/// transaction) outlives a single repository call.
#[derive(Clone)]
pub struct PgAuthRepository {
    db: PgPool,
}

impl PgAuthRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AuthRepository for PgAuthRepository {
    async fn load_user_by_token(&self, token: &str) -> Result<Option<User>> {
        let mut conn = self.db.acquire().await?;
        Users::new(&mut conn).get_by_token(token).await
    }

    async fn load_group_names_by_user_id(&self, id: UserId) -> Result<Vec<String>> {
        let mut conn = self.db.acquire().await?;
        Groups::new(&mut conn).group_names_for_user(id).await
    }

    async fn load_permission_names_by_user_id(&self, id: UserId) -> Result<Vec<String>> {
        let mut conn = self.db.acquire().await?;
        Groups::new(&mut conn).permission_names_for_user(id).await
    }

    async fn load_organization_by_user_id(&self, id: UserId) -> Result<Option<Organization>> {
        let mut conn = self.db.acquire().await?;
        Organizations::new(&mut conn).get_by_user_id(id).await
    }

    async fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<User> {
        let mut conn = self.db.acquire().await?;
        Users::new(&mut conn).update_last_login(id, at).await
    }

    async fn load_login_user_by_email(&self, email: &str) -> Result<Option<LoginUser>> {
        let mut conn = self.db.acquire().await?;
        Users::new(&mut conn).get_login_user_by_email(email).await
    }

    async fn rotate_token(&self, id: UserId, token: &str, at: DateTime<Utc>) -> Result<User> {
        let mut conn = self.db.acquire().await?;
        Users::new(&mut conn).rotate_token(id, token, at).await
    }

    async fn clear_token(&self, id: UserId) -> Result<User> {
        let mut conn = self.db.acquire().await?;
        Users::new(&mut conn).clear_token(id).await
    }

    async fn set_user_groups(&self, id: UserId, group_names: &[String]) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        Groups::new(&mut conn).set_user_groups(id, group_names).await
    }

    async fn set_user_permissions(&self, id: UserId, permission_names: &[String]) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        Groups::new(&mut conn).set_user_permissions(id, permission_names).await
    }

    async fn set_group_permissions(&self, id: GroupId, permission_names: &[String]) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        Groups::new(&mut conn).set_group_permissions(id, permission_names).await
    }
}
