//! Database repository for organizations.

use crate::db::{errors::Result, models::organizations::Organization};
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Organizations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Organizations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// The organization a user is linked to. A user is linked to at most one.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_by_user_id(&mut self, user_id: UserId) -> Result<Option<Organization>> {
        let organization = sqlx::query_as::<_, Organization>(
            r#"
            SELECT o.id, o.organization_name, o.email, o.created_at
            FROM organizations o
            INNER JOIN organization_users ou ON ou.organization_id = o.id
            WHERE ou.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(organization)
    }
}
