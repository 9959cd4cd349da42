//! Common type definitions and permission system types.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: the OIDC subject id of a user record
//! - [`ObjectId`]: stored object identifier
//! - [`VersionId`]: object version identifier
//! - [`TagId`]: tag row identifier
//!
//! [`Permission`] is the closed set of actions the permission gate can be
//! asked about. Persisted permission rows store the upper-case code returned
//! by [`Permission::code`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type ObjectId = Uuid;
pub type VersionId = Uuid;
pub type TagId = Uuid;

/// Acting user recorded on writes performed outside a bearer session.
pub const SYSTEM_USER: UserId = Uuid::nil();

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Actions a caller can hold on a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Create,
    Read,
    Update,
    Delete,
    Manage,
}

impl Permission {
    /// Code stored in the `object_permissions.permission` column.
    pub fn code(&self) -> &'static str {
        match self {
            Permission::Create => "CREATE",
            Permission::Read => "READ",
            Permission::Update => "UPDATE",
            Permission::Delete => "DELETE",
            Permission::Manage => "MANAGE",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&uuid), "550e8400");
    }

    #[test]
    fn test_permission_codes_round_trip() {
        for permission in [
            Permission::Create,
            Permission::Read,
            Permission::Update,
            Permission::Delete,
            Permission::Manage,
        ] {
            let json = serde_json::to_string(&permission).unwrap();
            assert_eq!(json, format!("\"{}\"", permission.code()));
            let parsed: Permission = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, permission);
        }
    }
}
