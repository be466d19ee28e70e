use std::{collections::BTreeSet, fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::UserConfig;

/// Coarse permission held by a caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Read-only queries.
    Read,
    /// Configuration changes.
    Write,
    /// Host command execution.
    Execute,
    /// Everything.
    Admin,
}

impl Permission {
    /// Lowercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "execute" => Ok(Self::Execute),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown permission: {other}")),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated caller, used for attribution and permission checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Identity string.
    pub id: String,
    /// Granted permissions.
    pub permissions: BTreeSet<Permission>,
}

impl CallerIdentity {
    /// Creates an identity.
    #[must_use]
    pub fn new(id: impl Into<String>, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            id: id.into(),
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Whether the caller holds `permission`; admin implies every permission.
    #[must_use]
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }
}

/// Source of caller identities.
pub trait UserDirectory: Send + Sync {
    /// Verifies credentials, returning the identity on success.
    fn authenticate(&self, id: &str, secret: &str) -> Option<CallerIdentity>;
}

#[derive(Debug, Clone)]
struct UserEntry {
    secret: String,
    permissions: BTreeSet<Permission>,
}

/// Directory built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: IndexMap<String, UserEntry>,
}

impl StaticUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the directory from `[[users]]` entries.
    #[must_use]
    pub fn from_config(users: &[UserConfig]) -> Self {
        users.iter().fold(Self::new(), |dir, user| {
            dir.with_user(&user.id, &user.secret, user.permissions.iter().copied())
        })
    }

    /// Adds or replaces a user.
    #[must_use]
    pub fn with_user(
        mut self,
        id: impl Into<String>,
        secret: impl Into<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        self.users.insert(
            id.into(),
            UserEntry {
                secret: secret.into(),
                permissions: permissions.into_iter().collect(),
            },
        );
        self
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no user is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for StaticUserDirectory {
    fn authenticate(&self, id: &str, secret: &str) -> Option<CallerIdentity> {
        let entry = self.users.get(id)?;
        secrets_match(entry.secret.as_bytes(), secret.as_bytes()).then(|| CallerIdentity {
            id: id.to_string(),
            permissions: entry.permissions.clone(),
        })
    }
}

// no early exit on the first differing byte
fn secrets_match(expected: &[u8], given: &[u8]) -> bool {
    expected.len() == given.len()
        && expected
            .iter()
            .zip(given)
            .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
