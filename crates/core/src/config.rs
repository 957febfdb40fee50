//! TOML-based configuration system for dirauth.
//!
//! All sensitive values (the directory service-account password) are stored
//! as `_env` fields that reference environment variable names. The actual
//! secrets are resolved at startup via [`AppConfig::resolve_env_vars`]. The
//! directory section rejects unknown keys, so a literal `bind_password`
//! committed to a config file fails to load instead of being silently used.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::filter::{self, GROUP_DN_PLACEHOLDER, USERNAME_PLACEHOLDER};
use crate::auth::roles::Role;
use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener, logging and storage settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory (LDAP) authentication settings.
    pub directory: DirectoryConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default `127.0.0.1:3000`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for persistent data (local account database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_listen() -> String {
    "127.0.0.1:3000".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/dirauth")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl ServerConfig {
    /// Path of the SQLite database holding local accounts and the audit log.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("dirauth.db")
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Directory service connection, search and role-mapping settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Attempt directory authentication at all.
    #[serde(default)]
    pub enabled: bool,

    /// Server URL, `ldap://host:389` or `ldaps://host:636`.
    #[serde(default = "default_directory_url")]
    pub url: String,

    /// Upgrade a plain `ldap://` connection with STARTTLS.
    #[serde(default)]
    pub start_tls: bool,

    /// Skip certificate verification. Test environments only.
    #[serde(default)]
    pub skip_tls_verify: bool,

    /// Service account DN used to search for users.
    #[serde(default)]
    pub bind_dn: String,

    /// Environment variable holding the service account password.
    #[serde(default)]
    pub bind_password_env: Option<String>,

    /// Base DN for the user search.
    #[serde(default)]
    pub search_base: String,

    /// User search filter; `{{username}}` is replaced by the escaped login name.
    #[serde(default = "default_search_filter")]
    pub search_filter: String,

    /// Directory attribute names mapped onto identity fields.
    #[serde(default)]
    pub attributes: AttributeMap,

    /// Timeouts and reconnect behaviour.
    #[serde(default)]
    pub options: ConnectionOptions,

    /// Group membership to role translation.
    #[serde(default)]
    pub role_mapping: RoleMappingConfig,

    /// Fall back to local accounts when the directory is unreachable or the
    /// user is not found there.
    #[serde(default)]
    pub allow_local_auth: bool,

    /// Resolved service account password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_directory_url() -> String {
    "ldap://localhost:389".into()
}
fn default_search_filter() -> String {
    format!("(uid={USERNAME_PLACEHOLDER})")
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_directory_url(),
            start_tls: false,
            skip_tls_verify: false,
            bind_dn: String::new(),
            bind_password_env: None,
            search_base: String::new(),
            search_filter: default_search_filter(),
            attributes: AttributeMap::default(),
            options: ConnectionOptions::default(),
            role_mapping: RoleMappingConfig::default(),
            allow_local_auth: false,
            bind_password: None,
        }
    }
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("start_tls", &self.start_tls)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password_env", &self.bind_password_env)
            .field("search_base", &self.search_base)
            .field("search_filter", &self.search_filter)
            .field("attributes", &self.attributes)
            .field("options", &self.options)
            .field("role_mapping", &self.role_mapping)
            .field("allow_local_auth", &self.allow_local_auth)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Names of the directory attributes read from a user entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeMap {
    /// Login name attribute (`uid`, or `sAMAccountName` for Active Directory).
    #[serde(default = "default_username_attr")]
    pub username: String,

    /// Display name attribute.
    #[serde(default = "default_full_name_attr")]
    pub full_name: String,

    /// Email attribute.
    #[serde(default = "default_email_attr")]
    pub email: String,

    /// Multi-valued attribute listing the DNs of the entry's groups.
    #[serde(default = "default_groups_attr")]
    pub groups: String,
}

fn default_username_attr() -> String {
    "uid".into()
}
fn default_full_name_attr() -> String {
    "cn".into()
}
fn default_email_attr() -> String {
    "mail".into()
}
fn default_groups_attr() -> String {
    "memberOf".into()
}

impl Default for AttributeMap {
    fn default() -> Self {
        Self {
            username: default_username_attr(),
            full_name: default_full_name_attr(),
            email: default_email_attr(),
            groups: default_groups_attr(),
        }
    }
}

impl AttributeMap {
    /// Attribute list requested in the user search.
    pub fn requested(&self) -> Vec<String> {
        vec![
            self.username.clone(),
            self.full_name.clone(),
            self.email.clone(),
            self.groups.clone(),
        ]
    }
}

/// Connection deadlines and reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionOptions {
    /// Deadline for every bind and search, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Deadline for establishing the connection, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Retry a failed transport connect within the same call.
    #[serde(default = "default_true")]
    pub reconnect: bool,
}

fn default_timeout_ms() -> u64 {
    5_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_true() -> bool {
    true
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect: true,
        }
    }
}

impl ConnectionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// What happens when an authenticated directory user matches no role rule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoMatchPolicy {
    /// Reject the login with `AccessDenied`.
    #[default]
    Deny,
    /// Accept the login with role `none`.
    None,
}

/// A single ordered group → role rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RoleRule {
    /// Group DN, e.g. `cn=app_admins,ou=groups,dc=example,dc=com`.
    pub group: String,
    /// Role granted to members of `group`.
    pub role: Role,
}

/// Role-mapping configuration. Rules are evaluated in order and the first
/// match wins, so list the highest privilege first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleMappingConfig {
    /// When disabled every directory user receives role `user`.
    #[serde(default)]
    pub enabled: bool,

    /// Behaviour when no rule matches.
    #[serde(default)]
    pub no_match: NoMatchPolicy,

    /// Optional base DN for an explicit group search, for directories that
    /// do not maintain a `memberOf` attribute.
    #[serde(default)]
    pub group_search_base: Option<String>,

    /// Group search filter; supports `{{dn}}` and `{{username}}`.
    #[serde(default = "default_group_search_filter")]
    pub group_search_filter: String,

    /// Ordered rules, highest privilege first.
    #[serde(default)]
    pub rules: Vec<RoleRule>,
}

fn default_group_search_filter() -> String {
    format!("(|(member={GROUP_DN_PLACEHOLDER})(uniqueMember={GROUP_DN_PLACEHOLDER}))")
}

impl Default for RoleMappingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            no_match: NoMatchPolicy::default(),
            group_search_base: None,
            group_search_filter: default_group_search_filter(),
            rules: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse an [`AppConfig`] from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables and populate the
    /// corresponding resolved fields.
    ///
    /// A missing variable only logs a warning here; [`validate`](Self::validate)
    /// decides whether the value is required.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.directory.bind_password_env {
            self.directory.bind_password =
                resolve_optional_env(env_name, "directory.bind_password_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.is_empty() {
            return Err(invalid("server.listen", "listen address must not be empty"));
        }
        self.directory.validate()
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

impl DirectoryConfig {
    /// Validate the directory section. A disabled directory only needs a
    /// well-formed role table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_role_mapping()?;

        if !self.enabled {
            return Ok(());
        }

        if !(self.url.starts_with("ldap://") || self.url.starts_with("ldaps://")) {
            return Err(invalid(
                "directory.url",
                "URL must start with ldap:// or ldaps://",
            ));
        }
        if self.start_tls && self.url.starts_with("ldaps://") {
            return Err(invalid(
                "directory.start_tls",
                "STARTTLS cannot be combined with an ldaps:// URL",
            ));
        }
        if self.search_base.is_empty() {
            return Err(invalid(
                "directory.search_base",
                "search base must not be empty",
            ));
        }
        filter::validate_template(&self.search_filter, USERNAME_PLACEHOLDER)
            .map_err(|detail| invalid("directory.search_filter", &detail))?;

        if self.bind_dn.is_empty() {
            return Err(invalid(
                "directory.bind_dn",
                "a service account DN is required when the directory is enabled",
            ));
        }
        match (&self.bind_password_env, &self.bind_password) {
            (None, _) => {
                return Err(invalid(
                    "directory.bind_password_env",
                    "name the environment variable holding the service account password",
                ));
            }
            (Some(var), None) => {
                return Err(ConfigError::EnvVarMissing {
                    var: var.clone(),
                    field: "directory.bind_password_env".into(),
                });
            }
            (Some(_), Some(_)) => {}
        }

        if self.options.timeout_ms == 0 {
            return Err(invalid("directory.options.timeout_ms", "timeout must be > 0"));
        }
        if self.options.connect_timeout_ms == 0 {
            return Err(invalid(
                "directory.options.connect_timeout_ms",
                "connect timeout must be > 0",
            ));
        }

        Ok(())
    }

    fn validate_role_mapping(&self) -> Result<(), ConfigError> {
        let mapping = &self.role_mapping;
        if !mapping.enabled {
            return Ok(());
        }
        if mapping.rules.is_empty() {
            return Err(invalid(
                "directory.role_mapping.rules",
                "role mapping is enabled but no rules are configured",
            ));
        }
        for (idx, rule) in mapping.rules.iter().enumerate() {
            if rule.group.trim().is_empty() {
                return Err(invalid(
                    &format!("directory.role_mapping.rules[{idx}].group"),
                    "group DN must not be empty",
                ));
            }
            if rule.role == Role::None {
                return Err(invalid(
                    &format!("directory.role_mapping.rules[{idx}].role"),
                    "a rule cannot grant role 'none'",
                ));
            }
        }
        if let Some(base) = &mapping.group_search_base {
            if base.trim().is_empty() {
                return Err(invalid(
                    "directory.role_mapping.group_search_base",
                    "group search base must not be empty when set",
                ));
            }
            filter::validate_template(&mapping.group_search_filter, GROUP_DN_PLACEHOLDER)
                .or_else(|_| {
                    filter::validate_template(&mapping.group_search_filter, USERNAME_PLACEHOLDER)
                })
                .map_err(|detail| invalid("directory.role_mapping.group_search_filter", &detail))?;
        }
        Ok(())
    }
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
