//! Authentication: directory bind-and-search, role mapping, and the local
//! account fallback, tied together by [`AuthResolver`].

pub mod directory;
pub mod filter;
pub mod groups;
pub mod ldap;
pub mod local;
pub mod resolver;
pub mod roles;

pub use directory::{DirectoryConnector, DirectoryEntry, DirectorySession};
pub use groups::collect_groups;
pub use ldap::LdapDirectory;
pub use local::{LocalAccountStore, LocalAuthenticator};
pub use resolver::AuthResolver;
pub use roles::Role;
