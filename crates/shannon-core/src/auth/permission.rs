//! Ordered permission levels and the admin/operator/trusted user lists.

use serde::{Deserialize, Serialize};

/// Totally ordered permission level. Comparisons use the derived numeric
/// order, matching the spec's `PUBLIC < TRUSTED < OPERATOR < ADMIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Public = 0,
    Trusted = 1,
    Operator = 2,
    Admin = 3,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionLevel::Public => "public",
            PermissionLevel::Trusted => "trusted",
            PermissionLevel::Operator => "operator",
            PermissionLevel::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(PermissionLevel::Public),
            "trusted" => Ok(PermissionLevel::Trusted),
            "operator" => Ok(PermissionLevel::Operator),
            "admin" => Ok(PermissionLevel::Admin),
            other => Err(format!("unknown permission level: {other}")),
        }
    }
}

/// Configured admin/operator/trusted user lists, checked in that order.
///
/// Entries may be `"platform:user_id"` (exact) or a bare `user_id` (matches
/// on any platform). First match wins; unlisted users default to `Public`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLists {
    #[serde(default)]
    pub admin_users: Vec<String>,
    #[serde(default)]
    pub operator_users: Vec<String>,
    #[serde(default)]
    pub trusted_users: Vec<String>,
}

impl UserLists {
    /// Resolve the configured (non-sudo) permission level for a user.
    pub fn effective_permission(&self, platform: &str, user_id: &str) -> PermissionLevel {
        let scoped = format!("{platform}:{user_id}");
        let matches = |list: &[String]| list.iter().any(|entry| entry == &scoped || entry == user_id);

        if matches(&self.admin_users) {
            PermissionLevel::Admin
        } else if matches(&self.operator_users) {
            PermissionLevel::Operator
        } else if matches(&self.trusted_users) {
            PermissionLevel::Trusted
        } else {
            PermissionLevel::Public
        }
    }
}
