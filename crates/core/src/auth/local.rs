//! Local account fallback store.
//!
//! Accounts live in the `local_accounts` table with bcrypt password hashes.
//! Verification runs on tokio's blocking pool so a slow hash never stalls
//! the reactor.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::auth::roles::Role;
use crate::db::Database;
use crate::errors::{AuthError, DatabaseError};
use crate::models::{LocalAccount, NewLocalAccount, ResolvedIdentity};

/// The local-account collaborator consulted on fallback.
#[async_trait]
pub trait LocalAuthenticator: Send + Sync {
    /// Check `password` for `username` against the local store.
    async fn verify_local(&self, username: &str, password: &str)
        -> Result<ResolvedIdentity, AuthError>;
}

/// Hash `password` with bcrypt at the given cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String, DatabaseError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// SQLite-backed local accounts.
#[derive(Clone)]
pub struct LocalAccountStore {
    db: Arc<Database>,
    cost: u32,
    /// Hash checked when the account is missing, so that case costs the same
    /// bcrypt work as a wrong password.
    dummy_hash: Arc<OnceLock<String>>,
}

impl LocalAccountStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            cost: bcrypt::DEFAULT_COST,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Override the bcrypt cost used for new hashes.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self.dummy_hash = Arc::new(OnceLock::new());
        self
    }

    /// Spend one bcrypt verification on a throwaway hash.
    fn verify_dummy(&self, password: &str) {
        let hash = match self.dummy_hash.get() {
            Some(hash) => hash,
            None => match hash_password("dirauth-unknown-account", self.cost) {
                Ok(hash) => self.dummy_hash.get_or_init(|| hash),
                Err(e) => {
                    warn!(error = %e, "could not build placeholder hash");
                    return;
                }
            },
        };
        let _ = bcrypt::verify(password, hash);
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Create an enabled account.
    pub fn create(&self, account: NewLocalAccount<'_>) -> Result<(), DatabaseError> {
        let hash = hash_password(account.password, self.cost)?;
        self.db.insert_local_account(
            account.username,
            &hash,
            account.role,
            account.full_name,
            account.email,
        )
    }

    pub fn set_password(&self, username: &str, password: &str) -> Result<(), DatabaseError> {
        let hash = hash_password(password, self.cost)?;
        self.db.update_local_password(username, &hash)
    }

    pub fn set_role(&self, username: &str, role: Role) -> Result<(), DatabaseError> {
        self.db.update_local_role(username, role)
    }

    pub fn set_enabled(&self, username: &str, enabled: bool) -> Result<(), DatabaseError> {
        self.db.set_local_account_enabled(username, enabled)
    }

    pub fn remove(&self, username: &str) -> Result<(), DatabaseError> {
        self.db.delete_local_account(username)
    }

    pub fn list(&self) -> Result<Vec<LocalAccount>, DatabaseError> {
        self.db.list_local_accounts()
    }

    /// Blocking verification; see [`LocalAuthenticator::verify_local`].
    pub fn verify_blocking(&self, username: &str, password: &str) -> Result<ResolvedIdentity, AuthError> {
        let account = self.db.get_local_account(username).map_err(|e| {
            error!(error = %e, "local account lookup failed");
            AuthError::LocalAuthUnavailable(e.to_string())
        })?;

        let Some(account) = account else {
            debug!(username, "no local account");
            self.verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };

        if !account.enabled {
            debug!(username, "local account is disabled");
            let _ = bcrypt::verify(password, &account.password_hash);
            return Err(AuthError::InvalidCredentials);
        }

        match bcrypt::verify(password, &account.password_hash) {
            Ok(true) => Ok(account.to_identity()),
            Ok(false) => Err(AuthError::InvalidCredentials),
            Err(e) => {
                warn!(username, error = %e, "stored password hash is unreadable");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

#[async_trait]
impl LocalAuthenticator for LocalAccountStore {
    async fn verify_local(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ResolvedIdentity, AuthError> {
        let store = self.clone();
        let username = username.to_string();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || store.verify_blocking(&username, &password))
            .await
            .map_err(|e| AuthError::LocalAuthUnavailable(format!("verification task failed: {e}")))?
    }
}
