//! The authentication resolver.
//!
//! [`AuthResolver::authenticate`] runs one bind-and-search round against the
//! directory and, when the directory stage fails in a way that permits it,
//! delegates once to the local account store.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::directory::{DirectoryConnector, DirectoryEntry, DirectorySession};
use super::filter::build_user_filter;
use super::groups::collect_groups;
use super::local::LocalAuthenticator;
use super::roles::{Role, RoleDecision, RoleMapper};
use crate::config::DirectoryConfig;
use crate::errors::{AuthError, DirectoryError};
use crate::models::{IdentitySource, ResolvedIdentity};

/// A directory-stage failure, tagged with whether the user entry had already
/// been located when it happened.
#[derive(Debug)]
struct StageError {
    error: AuthError,
    user_found: bool,
}

impl StageError {
    fn terminal(error: AuthError) -> Self {
        Self {
            error,
            user_found: true,
        }
    }
}

impl From<AuthError> for StageError {
    fn from(error: AuthError) -> Self {
        Self {
            error,
            user_found: false,
        }
    }
}

/// Resolves a username/password pair to a [`ResolvedIdentity`].
///
/// Holds only immutable configuration and shared collaborators, so one
/// instance can serve concurrent calls behind an `Arc`.
pub struct AuthResolver {
    config: DirectoryConfig,
    roles: RoleMapper,
    directory: Arc<dyn DirectoryConnector>,
    local: Option<Arc<dyn LocalAuthenticator>>,
}

impl AuthResolver {
    pub fn new(
        config: DirectoryConfig,
        directory: Arc<dyn DirectoryConnector>,
        local: Option<Arc<dyn LocalAuthenticator>>,
    ) -> Self {
        let roles = RoleMapper::from_config(&config.role_mapping);
        Self {
            config,
            roles,
            directory,
            local,
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn has_local_store(&self) -> bool {
        self.local.is_some()
    }

    /// Authenticate `username` with `password`.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ResolvedIdentity, AuthError> {
        if username.is_empty() || password.is_empty() {
            debug!("rejecting empty username or password");
            return Err(AuthError::InvalidCredentials);
        }

        if !self.config.enabled {
            if self.config.allow_local_auth {
                debug!(username, "directory disabled, using local accounts");
                return self.authenticate_local(username, password).await;
            }
            return Err(AuthError::DirectoryDisabled);
        }

        let failure = match self.authenticate_directory(username, password).await {
            Ok(identity) => {
                info!(
                    username = %identity.username,
                    role = %identity.role,
                    source = %identity.source,
                    "directory authentication succeeded"
                );
                return Ok(identity);
            }
            Err(e) => e,
        };
        let err = failure.error;

        if err.is_misconfiguration() {
            error!(
                username,
                kind = err.kind(),
                error = %err,
                misconfiguration = true,
                "directory authentication failed"
            );
        } else {
            warn!(username, kind = err.kind(), error = %err, "directory authentication failed");
        }

        if !failure.user_found && err.permits_fallback() && self.config.allow_local_auth {
            info!(username, cause = err.kind(), "falling back to local authentication");
            return self.authenticate_local(username, password).await;
        }

        Err(err)
    }

    async fn authenticate_local(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ResolvedIdentity, AuthError> {
        let Some(local) = &self.local else {
            warn!(username, "local authentication requested but no account store is configured");
            return Err(AuthError::LocalAuthUnavailable(
                "no local account store configured".into(),
            ));
        };

        match local.verify_local(username, password).await {
            Ok(identity) => {
                info!(username, role = %identity.role, "local authentication succeeded");
                Ok(identity)
            }
            Err(AuthError::LocalAuthUnavailable(detail)) => {
                error!(username, error = %detail, "local account store unavailable");
                Err(AuthError::LocalAuthUnavailable(detail))
            }
            Err(e) => {
                debug!(username, error = %e, "local authentication failed");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// The directory stage. The session is released on every path out.
    async fn authenticate_directory(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ResolvedIdentity, StageError> {
        let mut session = self
            .directory
            .connect()
            .await
            .map_err(|e| AuthError::ConnectionError(e.to_string()))?;

        let result = self.run_session(session.as_mut(), username, password).await;
        session.close().await;
        result
    }

    async fn run_session(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
        password: &str,
    ) -> Result<ResolvedIdentity, StageError> {
        let bind_password = self.config.bind_password.as_deref().unwrap_or_default();
        session
            .bind(&self.config.bind_dn, bind_password)
            .await
            .map_err(|e| self.service_bind_error(e))?;
        debug!(bind_dn = %self.config.bind_dn, "service account bound");

        let filter = build_user_filter(&self.config.search_filter, username);
        let mut entries = session
            .search(&self.config.search_base, &filter, &self.config.attributes.requested())
            .await
            .map_err(|e| AuthError::ConnectionError(format!("user search failed: {e}")))?;

        let entry = match entries.len() {
            0 => return Err(AuthError::UserNotFound(username.to_string()).into()),
            1 => entries.remove(0),
            count => {
                return Err(AuthError::AmbiguousUser {
                    username: username.to_string(),
                    count,
                }
                .into())
            }
        };
        debug!(dn = %entry.dn, "user entry found");

        // From here on the user exists in the directory, so no failure may
        // hand the login over to a local account.
        let groups = collect_groups(session, &self.config, &entry, username)
            .await
            .map_err(|e| {
                StageError::terminal(AuthError::ConnectionError(format!("group search failed: {e}")))
            })?;

        session.bind(&entry.dn, password).await.map_err(|e| {
            StageError::terminal(match e {
                DirectoryError::Rejected { .. } => AuthError::InvalidCredentials,
                other => AuthError::ConnectionError(format!("user bind failed: {other}")),
            })
        })?;

        let role = match self.roles.decide(groups.as_slice()) {
            RoleDecision::Assigned(role) => role,
            RoleDecision::Denied => {
                info!(username, groups = groups.len(), "no role mapping matched, denying");
                return Err(StageError::terminal(AuthError::AccessDenied(username.to_string())));
            }
        };

        Ok(self.build_identity(entry, groups, username, role))
    }

    fn service_bind_error(&self, e: DirectoryError) -> AuthError {
        if e.is_transport() {
            return AuthError::ConnectionError(e.to_string());
        }
        AuthError::ServiceBindError {
            bind_dn: self.config.bind_dn.clone(),
            detail: e.to_string(),
        }
    }

    fn build_identity(
        &self,
        entry: DirectoryEntry,
        groups: Vec<String>,
        username: &str,
        role: Role,
    ) -> ResolvedIdentity {
        let attrs = &self.config.attributes;
        let text = |name: &str| entry.first(name).unwrap_or_default().to_string();

        let resolved_name = match entry.first(&attrs.username) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => username.to_string(),
        };

        ResolvedIdentity {
            username: resolved_name,
            full_name: text(&attrs.full_name),
            email: text(&attrs.email),
            role,
            source: IdentitySource::Directory,
            dn: Some(entry.dn),
            groups,
        }
    }
}
