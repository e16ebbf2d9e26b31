//! Database models for organizations (tenants).

use crate::types::OrganizationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Organization {
    pub id: OrganizationId,
    pub organization_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}
