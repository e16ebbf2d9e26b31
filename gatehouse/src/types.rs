//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: User account identifier
//! - [`GroupId`]: Group identifier
//! - [`PermissionId`]: Permission identifier
//! - [`OrganizationId`]: Organization (tenant) identifier
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging
//! - [`abbrev_token`]: Abbreviate session tokens the same way, so they never reach logs in full

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type GroupId = Uuid;
pub type PermissionId = Uuid;
pub type OrganizationId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Abbreviate a session token for log fields.
pub fn abbrev_token(token: &str) -> String {
    token.chars().take(8).collect()
}

/// Name of the group whose members administer their own organization.
pub const ORGANIZATION_ADMIN_GROUP: &str = "organizationadmin";

/// Permission required by the membership management routes.
pub const MANAGE_USERS_PERMISSION: &str = "can_manage_users";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviations() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
        assert_eq!(abbrev_token("abcdefghijklmnop"), "abcdefgh");
        assert_eq!(abbrev_token("abc"), "abc");
    }
}
