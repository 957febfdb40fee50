//! Group membership lookup for a located user entry.

use tracing::debug;

use super::directory::{DirectoryEntry, DirectorySession};
use super::filter::build_group_filter;
use crate::config::DirectoryConfig;
use crate::errors::DirectoryError;

/// Group DNs for `entry`: the values of its membership attribute, plus the
/// results of the explicit group search when role mapping is enabled and a
/// group search base is configured.
///
/// Call this while the session is still bound as the service account. End
/// users usually lack read access to group entries.
pub async fn collect_groups(
    session: &mut dyn DirectorySession,
    config: &DirectoryConfig,
    entry: &DirectoryEntry,
    username: &str,
) -> Result<Vec<String>, DirectoryError> {
    let mut groups = entry.values(&config.attributes.groups).to_vec();

    let mapping = &config.role_mapping;
    if !mapping.enabled {
        return Ok(groups);
    }
    let Some(base) = mapping.group_search_base.as_deref() else {
        return Ok(groups);
    };

    let filter = build_group_filter(&mapping.group_search_filter, &entry.dn, username);
    debug!(base, filter = %filter, "searching for groups");
    let found = session.search(base, &filter, &["cn".to_string()]).await?;
    debug!(count = found.len(), "group search completed");

    for group in found {
        if !groups.iter().any(|g| g.eq_ignore_ascii_case(&group.dn)) {
            groups.push(group.dn);
        }
    }
    Ok(groups)
}
