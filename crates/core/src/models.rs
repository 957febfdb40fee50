//! Domain model types shared by the resolver, the database layer, and the
//! web API.

use serde::{Deserialize, Serialize};

use crate::auth::roles::Role;

// ---------------------------------------------------------------------------
// Resolved identity
// ---------------------------------------------------------------------------

/// Which store vouched for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    Directory,
    Local,
}

impl IdentitySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a successful authentication.
///
/// Fields missing from the backing record are empty strings rather than
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub source: IdentitySource,
    /// Entry DN, for directory identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn: Option<String>,
    /// Group DNs observed on the directory entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

// ---------------------------------------------------------------------------
// Local accounts
// ---------------------------------------------------------------------------

/// A row from the `local_accounts` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAccount {
    pub username: String,
    /// bcrypt hash; never serialized.
    pub password_hash: String,
    pub role: Role,
    pub full_name: String,
    pub email: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl LocalAccount {
    /// Identity handed out after a successful local password check.
    pub fn to_identity(&self) -> ResolvedIdentity {
        ResolvedIdentity {
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: self.role,
            source: IdentitySource::Local,
            dn: None,
            groups: Vec::new(),
        }
    }
}

/// Fields needed to create a local account.
#[derive(Debug, Clone)]
pub struct NewLocalAccount<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub role: Role,
    pub full_name: &'a str,
    pub email: &'a str,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// A row from the `auth_audit` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub action: String,
    pub username: String,
    pub source: Option<String>,
    pub success: bool,
    pub error_kind: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}
