//! Database repository for groups, permissions and their memberships.

use std::collections::BTreeSet;

use crate::db::errors::{DbError, Result};
use crate::types::{GroupId, PermissionId, UserId, abbrev_uuid};
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

pub struct Groups<'c> {
    db: &'c mut PgConnection,
}

/// Resolve names in `table` ("groups" or "permissions") to ids, failing if any is unknown.
async fn resolve_names(tx: &mut Transaction<'_, Postgres>, table: &str, names: &[String]) -> Result<Vec<Uuid>> {
    let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let rows: Vec<(Uuid, String)> = sqlx::query_as(&format!("SELECT id, name FROM {table} WHERE name = ANY($1)"))
        .bind(names)
        .fetch_all(&mut **tx)
        .await?;

    let found: BTreeSet<&str> = rows.iter().map(|(_, name)| name.as_str()).collect();
    let missing: Vec<String> = wanted.difference(&found).map(|s| s.to_string()).collect();
    if !missing.is_empty() {
        return Err(DbError::UnknownReference {
            entity_type: table.trim_end_matches('s').to_string(),
            names: missing,
        });
    }

    Ok(rows.into_iter().map(|(id, _)| id).collect())
}

async fn ensure_exists(tx: &mut Transaction<'_, Postgres>, table: &str, id: Uuid) -> Result<()> {
    let exists: bool = sqlx::query_scalar(&format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"))
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    if exists { Ok(()) } else { Err(DbError::NotFound) }
}

impl<'c> Groups<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn group_names_for_user(&mut self, user_id: UserId) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT g.name
            FROM groups g
            INNER JOIN user_groups ug ON ug.group_id = g.id
            WHERE ug.user_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(names)
    }

    /// Direct permissions plus every permission granted by one of the user's groups.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn permission_names_for_user(&mut self, user_id: UserId) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name
            FROM permissions p
            INNER JOIN user_permissions up ON up.permission_id = p.id
            WHERE up.user_id = $1
            UNION
            SELECT p.name
            FROM permissions p
            INNER JOIN group_permissions gp ON gp.permission_id = p.id
            INNER JOIN user_groups ug ON ug.group_id = gp.group_id
            WHERE ug.user_id = $1
            ORDER BY 1
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(names)
    }

    #[instrument(skip(self, group_names), fields(user_id = %abbrev_uuid(&user_id), count = group_names.len()), err)]
    pub async fn set_user_groups(&mut self, user_id: UserId, group_names: &[String]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        ensure_exists(&mut tx, "users", user_id).await?;
        let group_ids: Vec<GroupId> = resolve_names(&mut tx, "groups", group_names).await?;

        sqlx::query("DELETE FROM user_groups WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO user_groups (user_id, group_id) SELECT $1, UNNEST($2::uuid[])")
            .bind(user_id)
            .bind(&group_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, permission_names), fields(user_id = %abbrev_uuid(&user_id), count = permission_names.len()), err)]
    pub async fn set_user_permissions(&mut self, user_id: UserId, permission_names: &[String]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        ensure_exists(&mut tx, "users", user_id).await?;
        let permission_ids: Vec<PermissionId> = resolve_names(&mut tx, "permissions", permission_names).await?;

        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO user_permissions (user_id, permission_id) SELECT $1, UNNEST($2::uuid[])")
            .bind(user_id)
            .bind(&permission_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, permission_names), fields(group_id = %abbrev_uuid(&group_id), count = permission_names.len()), err)]
    pub async fn set_group_permissions(&mut self, group_id: GroupId, permission_names: &[String]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        ensure_exists(&mut tx, "groups", group_id).await?;
        let permission_ids: Vec<PermissionId> = resolve_names(&mut tx, "permissions", permission_names).await?;

        sqlx::query("DELETE FROM group_permissions WHERE group_id = $1")
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO group_permissions (group_id, permission_id) SELECT $1, UNNEST($2::uuid[])")
            .bind(group_id)
            .bind(&permission_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
