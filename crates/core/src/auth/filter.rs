//! Search filter construction.
//!
//! User-supplied values are always escaped (RFC 4515) before they are
//! substituted into a configured template, so a login name such as
//! `*)(uid=*` cannot widen the search.

use ldap3::ldap_escape;

/// Placeholder replaced by the login name in user and group filters.
pub const USERNAME_PLACEHOLDER: &str = "{{username}}";

/// Placeholder replaced by the user entry DN in group filters.
pub const GROUP_DN_PLACEHOLDER: &str = "{{dn}}";

/// Build the user search filter from `template`.
///
/// ```
/// use dirauth_core::auth::filter::build_user_filter;
/// assert_eq!(build_user_filter("(uid={{username}})", "jdoe"), "(uid=jdoe)");
/// ```
pub fn build_user_filter(template: &str, username: &str) -> String {
    template.replace(USERNAME_PLACEHOLDER, &ldap_escape(username))
}

/// Build the group search filter for a resolved user entry.
pub fn build_group_filter(template: &str, user_dn: &str, username: &str) -> String {
    template
        .replace(GROUP_DN_PLACEHOLDER, &ldap_escape(user_dn))
        .replace(USERNAME_PLACEHOLDER, &ldap_escape(username))
}

/// Check that a filter template is parenthesised and references
/// `placeholder`.
pub fn validate_template(template: &str, placeholder: &str) -> Result<(), String> {
    let trimmed = template.trim();
    if !(trimmed.starts_with('(') && trimmed.ends_with(')')) {
        return Err(format!("filter '{template}' must be enclosed in parentheses"));
    }
    if !trimmed.contains(placeholder) {
        return Err(format!("filter '{template}' must contain {placeholder}"));
    }
    let depth = trimmed.chars().try_fold(0i32, |depth, c| {
        let next = match c {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        };
        (next >= 0).then_some(next)
    });
    if depth != Some(0) {
        return Err(format!("filter '{template}' has unbalanced parentheses"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_username_substitution() {
        let filter = build_user_filter("(uid={{username}})", "jdoe");
        assert_eq!(filter, "(uid=jdoe)");
        assert!(!filter.contains("{{"));
    }

    #[test]
    fn test_every_placeholder_is_replaced() {
        let filter = build_user_filter("(|(uid={{username}})(mail={{username}}))", "jdoe");
        assert_eq!(filter, "(|(uid=jdoe)(mail=jdoe))");
    }

    #[test]
    fn test_injection_is_escaped() {
        let filter = build_user_filter("(uid={{username}})", "*)(uid=*");
        assert_eq!(filter, "(uid=\\2a\\29\\28uid=\\2a)");

        let filter = build_user_filter("(sAMAccountName={{username}})", "a\\b\0");
        assert_eq!(filter, "(sAMAccountName=a\\5cb\\00)");
    }

    #[test]
    fn test_group_filter_escapes_dn() {
        let filter = build_group_filter(
            "(|(member={{dn}})(memberUid={{username}}))",
            "cn=Doe\\, John (IT),ou=people,dc=example,dc=com",
            "jdoe",
        );
        assert_eq!(
            filter,
            "(|(member=cn=Doe\\5c, John \\28IT\\29,ou=people,dc=example,dc=com)(memberUid=jdoe))"
        );
    }

    #[test]
    fn test_validate_template() {
        assert!(validate_template("(uid={{username}})", USERNAME_PLACEHOLDER).is_ok());
        assert!(validate_template("uid={{username}}", USERNAME_PLACEHOLDER).is_err());
        assert!(validate_template("(uid=jdoe)", USERNAME_PLACEHOLDER).is_err());
        assert!(validate_template("(uid={{username}}))(", USERNAME_PLACEHOLDER).is_err());
        assert!(
            validate_template("(&(objectClass=person)(uid={{username}}))", USERNAME_PLACEHOLDER)
                .is_ok()
        );
    }
}
