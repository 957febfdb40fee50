//! dirauth core library.
//!
//! This crate provides the directory-backed authentication resolver and the
//! pieces it is built from: configuration, the LDAP client, group-to-role
//! mapping, and SQLite persistence for local accounts and the audit log.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;

// Re-exports for convenience.
pub use auth::{AuthResolver, LdapDirectory, LocalAccountStore, Role};
pub use config::AppConfig;
pub use db::Database;
pub use errors::AuthError;
pub use models::{IdentitySource, ResolvedIdentity};
