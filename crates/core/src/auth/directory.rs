//! Directory service abstraction.
//!
//! [`AuthResolver`](super::AuthResolver) talks to the directory only through
//! these traits, so the bind/search flow can be exercised against an
//! in-memory fixture. [`LdapDirectory`](super::ldap::LdapDirectory) is the
//! production implementation.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::DirectoryError;

/// A single search result entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    /// All values of `name`. Attribute names compare case-insensitively, as
    /// servers are free to return them in any case.
    pub fn values(&self, name: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }
}

/// Opens request-scoped directory sessions.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Establish a new connection. Implementations must bound this by the
    /// configured connect timeout.
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// One open connection to the directory.
///
/// Callers must invoke [`close`](Self::close) on every exit path.
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind as `dn`. A wrong password is reported as
    /// [`DirectoryError::Rejected`].
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Subtree search under `base`.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Release the connection. Never fails from the caller's perspective.
    async fn close(&mut self);
}
