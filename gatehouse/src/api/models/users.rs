//! API response models for the authenticated caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    auth::current_user::AuthContext,
    db::models::{organizations::Organization, users::User},
    types::{OrganizationId, UserId},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationResponse {
    pub id: OrganizationId,
    pub organization_name: String,
    pub email: Option<String>,
}

impl From<&Organization> for OrganizationResponse {
    fn from(organization: &Organization) -> Self {
        Self {
            id: organization.id,
            organization_name: organization.organization_name.clone(),
            email: organization.email.clone(),
        }
    }
}

/// The request identity bundle as returned by `GET /admin/api/v1/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub organization: Option<OrganizationResponse>,
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
    pub is_organization_admin: bool,
}

impl From<&AuthContext> for MeResponse {
    fn from(context: &AuthContext) -> Self {
        Self {
            user: UserResponse::from(&context.user),
            organization: context.organization.as_ref().map(OrganizationResponse::from),
            groups: context.groups.to_vec(),
            permissions: context.permissions.to_vec(),
            is_organization_admin: context.is_organization_admin(),
        }
    }
}
