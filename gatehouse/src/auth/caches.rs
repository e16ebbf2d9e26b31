//! The caches behind the resolvers, and the hooks mutation paths use to invalidate them.
//!
//! One [`AuthCaches`] is built at startup and shared through `Arc` by the resolvers, the
//! middleware and every handler that mutates tokens, memberships or organization links. Whoever
//! commits such a mutation must call the matching hook before responding:
//!
//! | mutation | hook |
//! |---|---|
//! | token rotated, cleared, or user row changed | [`AuthCaches::invalidate_token`] |
//! | a user's groups or direct permissions changed | [`AuthCaches::invalidate_user_groups_and_permissions`] |
//! | a group's permissions changed | [`AuthCaches::flush_all_groups_and_permissions`] |
//! | a user's organization link changed | [`AuthCaches::invalidate_organization`] |

use std::sync::Arc;

use tracing::debug;

use crate::{
    cache::Cache,
    db::models::organizations::Organization,
    types::{UserId, abbrev_token, abbrev_uuid},
};

/// Name lists are shared between the cache and every request context built from it.
pub type NameList = Arc<Vec<String>>;

#[derive(Debug, Default)]
pub struct AuthCaches {
    /// token -> serialized user snapshot
    pub users: Cache<String, serde_json::Value>,
    /// user id -> group names
    pub groups: Cache<UserId, NameList>,
    /// user id -> permission names (direct and group-granted)
    pub permissions: Cache<UserId, NameList>,
    /// user id -> organization, `None` meaning the user has no organization
    pub organizations: Cache<UserId, Option<Organization>>,
}

impl AuthCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the user cached under `token`. Idempotent.
    pub fn invalidate_token(&self, token: &str) -> bool {
        let existed = self.users.del(token);
        debug!(token = %abbrev_token(token), existed, "Invalidated token cache entry");
        existed
    }

    /// Forget one user's group and permission names. Idempotent.
    pub fn invalidate_user_groups_and_permissions(&self, user_id: UserId) {
        let groups = self.groups.del(&user_id);
        let permissions = self.permissions.del(&user_id);
        debug!(user_id = %abbrev_uuid(&user_id), groups, permissions, "Invalidated membership cache entries");
    }

    /// Drop every cached group and permission list. Calling it on empty caches is a no-op.
    pub fn flush_all_groups_and_permissions(&self) {
        self.groups.flush();
        self.permissions.flush();
        debug!("Flushed group and permission caches");
    }

    /// Forget one user's cached organization. Idempotent.
    pub fn invalidate_organization(&self, user_id: UserId) {
        let existed = self.organizations.del(&user_id);
        debug!(user_id = %abbrev_uuid(&user_id), existed, "Invalidated organization cache entry");
    }
}
