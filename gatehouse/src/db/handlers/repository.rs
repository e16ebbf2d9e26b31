//! The data-access trait the auth layer depends on.

use chrono::{DateTime, Utc};

use crate::db::errors::Result;
use crate::db::models::{
    organizations::Organization,
    users::{LoginUser, User},
};
use crate::types::{GroupId, UserId};

/// Everything the authentication, authorization and tenant resolvers need from storage.
///
/// Implementations must be safe to share between concurrently running request handlers. None of
/// the methods are called while a cache lock is held.
#[async_trait::async_trait]
pub trait AuthRepository: Send + Sync {
    /// Load the user whose *current* token is `token`.
    async fn load_user_by_token(&self, token: &str) -> Result<Option<User>>;

    /// Names of the groups the user is a member of.
    async fn load_group_names_by_user_id(&self, id: UserId) -> Result<Vec<String>>;

    /// Names of the permissions the user holds, directly or through any of their groups.
    async fn load_permission_names_by_user_id(&self, id: UserId) -> Result<Vec<String>>;

    /// The organization the user is linked to, if any.
    async fn load_organization_by_user_id(&self, id: UserId) -> Result<Option<Organization>>;

    /// Persist a new `last_login` timestamp and return the updated row.
    async fn update_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<User>;

    /// Load a user and their credentials by (normalised) email.
    async fn load_login_user_by_email(&self, email: &str) -> Result<Option<LoginUser>>;

    /// Replace the user's token and set its creation time to `at`.
    async fn rotate_token(&self, id: UserId, token: &str, at: DateTime<Utc>) -> Result<User>;

    /// Remove the user's token entirely.
    async fn clear_token(&self, id: UserId) -> Result<User>;

    /// Replace the user's group memberships with the named groups.
    async fn set_user_groups(&self, id: UserId, group_names: &[String]) -> Result<()>;

    /// Replace the user's direct permissions with the named permissions.
    async fn set_user_permissions(&self, id: UserId, permission_names: &[String]) -> Result<()>;

    /// Replace the permissions a group grants.
    async fn set_group_permissions(&self, id: GroupId, permission_names: &[String]) -> Result<()>;
}
