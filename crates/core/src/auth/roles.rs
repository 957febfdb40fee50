//! Group membership to role translation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{NoMatchPolicy, RoleMappingConfig};

/// Internal privilege level assigned to an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superuser,
    Admin,
    User,
    None,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::Admin => "admin",
            Self::User => "user",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "superuser" => Ok(Self::Superuser),
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown role '{other}' (expected superuser, admin, user or none)"
            )),
        }
    }
}

/// Result of evaluating a membership list against the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleDecision {
    /// A rule matched, or mapping is disabled and the default role applies.
    Assigned(Role),
    /// No rule matched and the policy rejects the login.
    Denied,
}

/// Ordered first-match evaluator built from [`RoleMappingConfig`].
#[derive(Debug, Clone)]
pub struct RoleMapper {
    enabled: bool,
    no_match: NoMatchPolicy,
    /// (normalized group DN, role), in configuration order.
    rules: Vec<(String, Role)>,
}

impl RoleMapper {
    pub fn from_config(config: &RoleMappingConfig) -> Self {
        Self {
            enabled: config.enabled,
            no_match: config.no_match,
            rules: config
                .rules
                .iter()
                .map(|rule| (normalize_dn(&rule.group), rule.role))
                .collect(),
        }
    }

    /// Pick the role for an entry belonging to `groups`.
    ///
    /// The first rule (in configuration order) whose group appears in
    /// `groups` wins; the order of `groups` itself is irrelevant.
    pub fn decide<S: AsRef<str>>(&self, groups: &[S]) -> RoleDecision {
        if !self.enabled {
            return RoleDecision::Assigned(Role::User);
        }

        let memberships: Vec<String> = groups.iter().map(|g| normalize_dn(g.as_ref())).collect();

        for (group, role) in &self.rules {
            if memberships.iter().any(|m| m == group) {
                debug!(group = %group, role = %role, "role rule matched");
                return RoleDecision::Assigned(*role);
            }
        }

        match self.no_match {
            NoMatchPolicy::None => RoleDecision::Assigned(Role::None),
            NoMatchPolicy::Deny => RoleDecision::Denied,
        }
    }
}

/// Canonical form used to compare group DNs: RDNs trimmed, lowercased, and
/// re-joined with bare commas. Escaped commas (`\,`) stay inside their RDN.
pub fn normalize_dn(dn: &str) -> String {
    let mut rdns = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in dn.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            ',' => rdns.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    rdns.push(current);

    rdns.iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((attr, value)) => format!(
                "{}={}",
                attr.trim().to_lowercase(),
                value.trim().to_lowercase()
            ),
            None => rdn.trim().to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(",")
}
