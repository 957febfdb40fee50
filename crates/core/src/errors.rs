//! Error types for the dirauth core library.
//!
//! Each subsystem has its own error type derived with `thiserror`.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Authentication errors
// ---------------------------------------------------------------------------

/// Terminal outcome of a failed [`AuthResolver`](crate::auth::AuthResolver)
/// call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Directory authentication is switched off and local fallback is not
    /// permitted.
    #[error("directory authentication is disabled")]
    DirectoryDisabled,

    /// The directory could not be reached, or an operation timed out.
    #[error("directory connection failed: {0}")]
    ConnectionError(String),

    /// The service account could not bind. Always a deployment problem.
    #[error("service account bind failed for '{bind_dn}': {detail}")]
    ServiceBindError {
        bind_dn: String,
        detail: String,
    },

    /// The user search returned no entry.
    #[error("user '{0}' not found in directory")]
    UserNotFound(String),

    /// The user search returned more than one entry.
    #[error("directory search for '{username}' matched {count} entries")]
    AmbiguousUser {
        username: String,
        count: usize,
    },

    /// Wrong password, unknown local user, or disabled local account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The user authenticated but no role rule matched and the no-match
    /// policy is `deny`.
    #[error("access denied for '{0}': no role mapping matched")]
    AccessDenied(String),

    /// Local fallback was requested but no usable local store exists.
    #[error("local authentication unavailable: {0}")]
    LocalAuthUnavailable(String),
}

impl AuthError {
    /// Short stable identifier, used in logs and the audit table.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DirectoryDisabled => "directory_disabled",
            Self::ConnectionError(_) => "connection_error",
            Self::ServiceBindError { .. } => "service_bind_error",
            Self::UserNotFound(_) => "user_not_found",
            Self::AmbiguousUser { .. } => "ambiguous_user",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccessDenied(_) => "access_denied",
            Self::LocalAuthUnavailable(_) => "local_auth_unavailable",
        }
    }

    /// Errors that point at operator misconfiguration rather than at the
    /// end user.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, Self::ServiceBindError { .. } | Self::AmbiguousUser { .. })
    }

    /// Directory-stage failures after which local fallback may be attempted.
    pub fn permits_fallback(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_) | Self::ServiceBindError { .. } | Self::UserNotFound(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Directory transport errors
// ---------------------------------------------------------------------------

/// Low-level failures reported by a directory session.
///
/// The resolver translates these into [`AuthError`] depending on the stage
/// at which they occurred.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// TCP/TLS connection could not be established.
    #[error("failed to connect to directory: {0}")]
    Connect(String),

    /// An operation did not complete within its deadline.
    #[error("directory {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The server answered with a non-success result code.
    #[error("directory rejected the request (rc={rc}): {message}")]
    Rejected {
        rc: u32,
        message: String,
    },

    /// Any other protocol-level failure.
    #[error("directory operation failed: {0}")]
    Operation(String),
}

impl DirectoryError {
    /// Whether the server could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout { .. })
    }
}

impl From<ldap3::LdapError> for DirectoryError {
    fn from(err: ldap3::LdapError) -> Self {
        match err {
            ldap3::LdapError::LdapResult { result } => Self::Rejected {
                rc: result.rc,
                message: result.text,
            },
            ldap3::LdapError::Io { source } => Self::Connect(source.to_string()),
            // The connection driver went away under an operation.
            e @ (ldap3::LdapError::EndOfStream
            | ldap3::LdapError::OpSend { .. }
            | ldap3::LdapError::ResultRecv { .. }) => Self::Connect(e.to_string()),
            other => Self::Operation(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing {
        var: String,
        field: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// A record with the same key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        entity: String,
        id: String,
    },

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    HashError(#[from] bcrypt::BcryptError),

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = AuthError::AmbiguousUser {
            username: "jdoe".into(),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "directory search for 'jdoe' matched 2 entries"
        );

        let err = DirectoryError::Timeout {
            operation: "search",
            after: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("search timed out"));

        let err = ConfigError::EnvVarMissing {
            var: "DIRAUTH_BIND_PASSWORD".into(),
            field: "directory.bind_password_env".into(),
        };
        assert!(err.to_string().contains("DIRAUTH_BIND_PASSWORD"));
    }

    #[test]
    fn test_misconfiguration_is_distinct_from_user_error() {
        assert!(AuthError::ServiceBindError {
            bind_dn: "cn=svc".into(),
            detail: "rc=49".into(),
        }
        .is_misconfiguration());
        assert!(AuthError::AmbiguousUser {
            username: "a".into(),
            count: 3,
        }
        .is_misconfiguration());
        assert!(!AuthError::InvalidCredentials.is_misconfiguration());
        assert!(!AuthError::UserNotFound("a".into()).is_misconfiguration());
    }

    #[test]
    fn test_fallback_eligibility() {
        assert!(AuthError::ConnectionError("refused".into()).permits_fallback());
        assert!(AuthError::UserNotFound("a".into()).permits_fallback());
        assert!(!AuthError::InvalidCredentials.permits_fallback());
        assert!(!AuthError::AccessDenied("a".into()).permits_fallback());
        assert!(!AuthError::AmbiguousUser {
            username: "a".into(),
            count: 2,
        }
        .permits_fallback());
    }

    #[test]
    fn test_dropped_connection_is_transport() {
        let err = DirectoryError::from(ldap3::LdapError::EndOfStream);
        assert!(matches!(err, DirectoryError::Connect(_)));
        assert!(err.is_transport());

        let rejected = DirectoryError::Rejected {
            rc: 49,
            message: "invalid credentials".into(),
        };
        assert!(!rejected.is_transport());
        assert!(!DirectoryError::Operation("bad filter".into()).is_transport());
    }
}
