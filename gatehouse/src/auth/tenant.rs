//! Organization (tenant) resolution for non-superusers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    auth::{authorization::superuser_bypass, caches::AuthCaches},
    db::{handlers::AuthRepository, models::organizations::Organization, models::users::User},
    errors::{Error, Result},
    types::UserId,
};

/// How a regular user without an organization is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantPolicy {
    /// A missing organization is a valid, tenant-less state
    Optional,
    /// A missing organization rejects the request with `NoOrganization`
    Required,
}

#[derive(Clone)]
pub struct TenantResolver {
    caches: Arc<AuthCaches>,
    repo: Arc<dyn AuthRepository>,
    policy: TenantPolicy,
    cache_organizations: bool,
}

impl TenantResolver {
    pub fn new(caches: Arc<AuthCaches>, repo: Arc<dyn AuthRepository>, policy: TenantPolicy, cache_organizations: bool) -> Self {
        Self {
            caches,
            repo,
            policy,
            cache_organizations,
        }
    }

    pub fn policy(&self) -> TenantPolicy {
        self.policy
    }

    /// The organization `user` belongs to.
    ///
    /// Superusers are not tenant-scoped and resolve to `None` without a lookup. For everybody
    /// else, "no organization" is `Ok(None)` under [`TenantPolicy::Optional`] and
    /// [`Error::NoOrganization`] under [`TenantPolicy::Required`]; a failing lookup is always
    /// [`Error::TenantResolution`].
    #[instrument(skip_all, fields(user_id = %user.id), err)]
    pub async fn resolve_organization(&self, user: &User) -> Result<Option<Organization>> {
        if superuser_bypass(user) {
            return Ok(None);
        }

        let organization = self.lookup(user.id).await?;
        match (&organization, self.policy) {
            (None, TenantPolicy::Required) => Err(Error::NoOrganization),
            (None, TenantPolicy::Optional) => {
                debug!("User has no organization");
                Ok(None)
            }
            (Some(_), _) => Ok(organization),
        }
    }

    /// Organization of `user_id` without applying the tenant policy or the superuser exemption.
    pub async fn lookup(&self, user_id: UserId) -> Result<Option<Organization>> {
        if self.cache_organizations
            && let Some(cached) = self.caches.organizations.get(&user_id)
        {
            return Ok(cached);
        }

        let organization = self
            .repo
            .load_organization_by_user_id(user_id)
            .await
            .map_err(Error::TenantResolution)?;

        if self.cache_organizations {
            self.caches.organizations.set(user_id, organization.clone());
        }
        Ok(organization)
    }
}
