//! API request/response models for authentication.

use serde::{Deserialize, Serialize};

use crate::types::OrganizationId;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// TOTP code, only consulted for superusers when two-factor login is enabled
    #[serde(default)]
    pub twofakey: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoginResponse {
    pub token: String,
    pub email: String,
    pub is_superuser: bool,
    pub is_organization_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Public dashboard information shown before login.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginInfo {
    /// Whether superusers must supply a TOTP code
    pub tfa: bool,
}
