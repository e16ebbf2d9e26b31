//! API request models for membership mutations.

use serde::{Deserialize, Serialize};

/// Replaces a user's group memberships.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupsUpdate {
    pub groups: Vec<String>,
}

/// Replaces the permissions held by a user or granted by a group.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PermissionsUpdate {
    pub permissions: Vec<String>,
}
