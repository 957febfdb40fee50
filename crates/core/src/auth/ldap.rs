//! LDAP implementation of the directory traits, built on `ldap3`.
//!
//! Every connection is opened per call and torn down by
//! [`DirectorySession::close`]. Connect, bind, and search are each bounded
//! by a deadline taken from [`ConnectionOptions`].

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::directory::{DirectoryConnector, DirectoryEntry, DirectorySession};
use crate::config::{ConnectionOptions, DirectoryConfig};
use crate::errors::DirectoryError;

/// Transport connect attempts made when `reconnect` is enabled.
const RECONNECT_ATTEMPTS: u32 = 3;

/// Pause between transport connect attempts.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// Connector for a real LDAP / Active Directory server.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    url: String,
    start_tls: bool,
    skip_tls_verify: bool,
    options: ConnectionOptions,
}

impl LdapDirectory {
    /// Build a connector from the directory section. No connection is made
    /// until [`connect`](DirectoryConnector::connect) is called.
    pub fn new(config: &DirectoryConfig) -> Self {
        info!(
            url = %config.url,
            start_tls = config.start_tls,
            timeout_ms = config.options.timeout_ms,
            connect_timeout_ms = config.options.connect_timeout_ms,
            "created LDAP directory connector"
        );
        if config.skip_tls_verify {
            warn!("TLS certificate verification is disabled for the directory connection");
        }
        Self {
            url: config.url.clone(),
            start_tls: config.start_tls,
            skip_tls_verify: config.skip_tls_verify,
            options: config.options.clone(),
        }
    }

    fn settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.options.connect_timeout())
            .set_starttls(self.start_tls)
            .set_no_tls_verify(self.skip_tls_verify)
    }

    async fn connect_once(&self) -> Result<Ldap, DirectoryError> {
        let deadline = self.options.connect_timeout();
        let attempt = LdapConnAsync::with_settings(self.settings(), &self.url);

        let (conn, ldap) = match timeout(deadline, attempt).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(DirectoryError::Connect(e.to_string())),
            Err(_) => {
                return Err(DirectoryError::Timeout {
                    operation: "connect",
                    after: deadline,
                })
            }
        };

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver exited with error");
            }
        });

        Ok(ldap)
    }
}

#[async_trait]
impl DirectoryConnector for LdapDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let attempts = if self.options.reconnect {
            RECONNECT_ATTEMPTS
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            debug!(url = %self.url, attempt, "connecting to LDAP server");
            match self.connect_once().await {
                Ok(ldap) => {
                    return Ok(Box::new(LdapSession {
                        ldap,
                        op_timeout: self.options.timeout(),
                        closed: false,
                    }))
                }
                // Only refused/reset connects are retried; a timeout has
                // already spent the whole connect budget.
                Err(DirectoryError::Connect(detail)) if attempt < attempts => {
                    warn!(url = %self.url, attempt, error = %detail, "LDAP connect failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A single open LDAP connection.
pub struct LdapSession {
    ldap: Ldap,
    op_timeout: Duration,
    closed: bool,
}

fn timed_out(operation: &'static str, after: Duration) -> DirectoryError {
    DirectoryError::Timeout { operation, after }
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        let deadline = self.op_timeout;
        let result = timeout(deadline, self.ldap.simple_bind(dn, password))
            .await
            .map_err(|_| timed_out("bind", deadline))??;

        if result.rc != 0 {
            return Err(DirectoryError::Rejected {
                rc: result.rc,
                message: result.text,
            });
        }
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let deadline = self.op_timeout;
        let attrs: Vec<&str> = attrs.iter().map(String::as_str).collect();
        let search = self.ldap.search(base, Scope::Subtree, filter, attrs);

        let (entries, _res) = timeout(deadline, search)
            .await
            .map_err(|_| timed_out("search", deadline))??
            .success()?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attrs: entry.attrs,
            })
            .collect())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match timeout(self.op_timeout, self.ldap.unbind()).await {
            Ok(Ok(())) => debug!("LDAP connection released"),
            Ok(Err(e)) => debug!(error = %e, "LDAP unbind failed; connection dropped"),
            Err(_) => debug!("LDAP unbind timed out; connection dropped"),
        }
    }
}
