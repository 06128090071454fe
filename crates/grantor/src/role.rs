//! Translation of source-system role labels into GitHub permissions.
//!
//! The mapping table and the treatment of unknown labels are configuration.
//! [`RoleMapper::map_role`] is total: any label maps to something, falling
//! back to the configured default permission. Whether an unknown label is
//! acceptable at all is a separate question answered by
//! [`RoleMapper::check`] according to [`UnknownRolePolicy`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

/// Permission used for labels missing from the table.
pub const DEFAULT_PERMISSION: &str = "pull";

/// Built-in label table: source label → GitHub permission.
///
/// GitHub's own permission names map to themselves so reclaim exports,
/// which already use them, pass the unknown-role check.
pub const DEFAULT_ROLE_TABLE: &[(&str, &str)] = &[
    ("Admin", "admin"),
    ("Member", "member"),
    ("Owner", "owner"),
    ("Read", "pull"),
    ("Write", "push"),
    ("Contributor", "pull"),
    ("pull", "pull"),
    ("triage", "triage"),
    ("push", "push"),
    ("maintain", "maintain"),
];

/// What to do with a role label that is not in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownRolePolicy {
    /// Fail the record with a validation error.
    #[default]
    Reject,
    /// Grant the default permission.
    Default,
}

impl std::str::FromStr for UnknownRolePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "default" => Ok(Self::Default),
            other => Err(format!(
                "unknown role policy '{other}' (expected 'reject' or 'default')"
            )),
        }
    }
}

/// Role sent with an organization invitation.
///
/// Organizations only distinguish owners from members, so every repository
/// style permission collapses into one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgRole {
    Admin,
    DirectMember,
}

impl OrgRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrgRole::Admin => "admin",
            OrgRole::DirectMember => "direct_member",
        }
    }

    /// Collapse a mapped permission to an org role.
    #[must_use]
    pub fn from_permission(permission: &str) -> Self {
        if permission.eq_ignore_ascii_case("admin") || permission.eq_ignore_ascii_case("owner") {
            OrgRole::Admin
        } else {
            OrgRole::DirectMember
        }
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label that [`RoleMapper::check`] refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedRole {
    pub label: String,
    pub known: Vec<String>,
}

impl std::fmt::Display for UnrecognizedRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unrecognized role '{}'; expected one of: {}",
            self.label,
            self.known.join(", ")
        )
    }
}

#[derive(Debug)]
struct RoleTable {
    /// Lowercased label → (label as configured, permission).
    entries: BTreeMap<String, (String, String)>,
    default_permission: String,
    unknown: UnknownRolePolicy,
}

/// Maps source role labels to GitHub permissions. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoleMapper {
    table: Arc<RoleTable>,
}

impl Default for RoleMapper {
    fn default() -> Self {
        Self::new(
            DEFAULT_ROLE_TABLE.iter().copied(),
            DEFAULT_PERMISSION,
            UnknownRolePolicy::default(),
        )
    }
}

impl RoleMapper {
    /// Build a mapper from `(label, permission)` pairs.
    ///
    /// Labels match case-insensitively after trimming; a later duplicate
    /// label replaces an earlier one.
    pub fn new<I, L, P>(table: I, default_permission: &str, unknown: UnknownRolePolicy) -> Self
    where
        I: IntoIterator<Item = (L, P)>,
        L: AsRef<str>,
        P: AsRef<str>,
    {
        let entries = table
            .into_iter()
            .map(|(label, permission)| {
                let label = label.as_ref().trim().to_string();
                (
                    label.to_ascii_lowercase(),
                    (label, permission.as_ref().trim().to_ascii_lowercase()),
                )
            })
            .collect();

        Self {
            table: Arc::new(RoleTable {
                entries,
                default_permission: default_permission.trim().to_ascii_lowercase(),
                unknown,
            }),
        }
    }

    pub fn unknown_policy(&self) -> UnknownRolePolicy {
        self.table.unknown
    }

    pub fn default_permission(&self) -> &str {
        &self.table.default_permission
    }

    /// Labels in the table, as configured.
    pub fn labels(&self) -> Vec<String> {
        self.table
            .entries
            .values()
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn is_recognized(&self, label: &str) -> bool {
        self.table
            .entries
            .contains_key(&label.trim().to_ascii_lowercase())
    }

    /// Map a label to a permission. Never fails.
    pub fn map_role(&self, label: &str) -> &str {
        self.table
            .entries
            .get(&label.trim().to_ascii_lowercase())
            .map(|(_, permission)| permission.as_str())
            .unwrap_or(&self.table.default_permission)
    }

    /// Apply the unknown-role policy to a label.
    pub fn check(&self, label: &str) -> Result<(), UnrecognizedRole> {
        if self.is_recognized(label) || self.table.unknown == UnknownRolePolicy::Default {
            return Ok(());
        }
        Err(UnrecognizedRole {
            label: label.trim().to_string(),
            known: self.labels(),
        })
    }
}
