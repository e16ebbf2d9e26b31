//! Group and permission resolution, and the route requirement check built on it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::{
    auth::caches::{AuthCaches, NameList},
    cache::Cache,
    db::{errors::DbError, handlers::AuthRepository, models::users::User},
    errors::{Error, Result},
    types::UserId,
};

/// The one place the superuser exemption is decided. Both group and permission checks consult
/// it before touching a cache or the database.
pub fn superuser_bypass(user: &User) -> bool {
    user.is_superuser
}

/// What a route demands of the caller. The requirement is met when the user is in `group` *or*
/// holds `permission`; with neither set, any authenticated user passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirement {
    pub group: Option<String>,
    pub permission: Option<String>,
}

impl Requirement {
    /// Any authenticated user.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: Some(name.into()),
            permission: None,
        }
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self {
            group: None,
            permission: Some(name.into()),
        }
    }

    pub fn or_group(mut self, name: impl Into<String>) -> Self {
        self.group = Some(name.into());
        self
    }

    pub fn or_permission(mut self, name: impl Into<String>) -> Self {
        self.permission = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_none() && self.permission.is_none()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.group, &self.permission) {
            (None, None) => write!(f, "authenticated"),
            (Some(g), None) => write!(f, "group {g}"),
            (None, Some(p)) => write!(f, "permission {p}"),
            (Some(g), Some(p)) => write!(f, "group {g} or permission {p}"),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationResolver {
    caches: Arc<AuthCaches>,
    repo: Arc<dyn AuthRepository>,
}

impl AuthorizationResolver {
    pub fn new(caches: Arc<AuthCaches>, repo: Arc<dyn AuthRepository>) -> Self {
        Self { caches, repo }
    }

    /// Names of the user's groups, read through the group cache.
    #[instrument(skip(self), err)]
    pub async fn group_names(&self, user_id: UserId) -> Result<NameList> {
        read_through(&self.caches.groups, user_id, || self.repo.load_group_names_by_user_id(user_id)).await
    }

    /// Names of the user's permissions, read through the permission cache.
    #[instrument(skip(self), err)]
    pub async fn permission_names(&self, user_id: UserId) -> Result<NameList> {
        read_through(&self.caches.permissions, user_id, || self.repo.load_permission_names_by_user_id(user_id)).await
    }

    pub async fn has_group(&self, user: &User, name: &str) -> Result<bool> {
        if superuser_bypass(user) {
            return Ok(true);
        }
        Ok(self.group_names(user.id).await?.iter().any(|g| g == name))
    }

    pub async fn has_permission(&self, user: &User, name: &str) -> Result<bool> {
        if superuser_bypass(user) {
            return Ok(true);
        }
        Ok(self.permission_names(user.id).await?.iter().any(|p| p == name))
    }

    /// Check `requirement` for `user`, failing with [`Error::Unauthorized`] when unmet.
    #[instrument(skip_all, fields(user_id = %user.id, requirement = %requirement))]
    pub async fn authorize(&self, user: &User, requirement: &Requirement) -> Result<()> {
        if requirement.is_empty() {
            return Ok(());
        }

        if let Some(group) = &requirement.group
            && self.has_group(user, group).await?
        {
            return Ok(());
        }
        if let Some(permission) = &requirement.permission
            && self.has_permission(user, permission).await?
        {
            return Ok(());
        }

        debug!("Requirement not met");
        Err(Error::Unauthorized {
            requirement: requirement.to_string(),
        })
    }
}

async fn read_through<F, Fut>(cache: &Cache<UserId, NameList>, user_id: UserId, load: F) -> Result<NameList>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<Vec<String>, DbError>>,
{
    if let Some(names) = cache.get(&user_id) {
        trace!("Cache hit");
        return Ok(names);
    }

    let names = Arc::new(load().await?);
    cache.set(user_id, names.clone());
    trace!(count = names.len(), "Cache populated");
    Ok(names)
}
