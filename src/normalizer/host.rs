//! Host validation and derivation between paired mail slots.

use regex::Regex;

use crate::{ProvisionError, Result};

/// Rewrites the sibling's service prefix, `imap.example.com` -> `smtp.example.com`.
///
/// Also handles dash-joined prefixes such as `imap-mail.outlook.com`. Returns
/// `None` when the sibling host does not start with the expected prefix.
pub fn derive_host(
    sibling_host: &str,
    from_prefix: &str,
    to_prefix: &str,
) -> Option<String> {
    let pattern = format!(r"(?i)^{}([.\-])", regex::escape(from_prefix));
    let re = Regex::new(&pattern).ok()?;
    if !re.is_match(sibling_host) {
        return None;
    }
    Some(re.replace(sibling_host, format!("{}${{1}}", to_prefix).as_str()).into_owned())
}

/// Checks that a host is a bare hostname, not a url or a host:port pair.
pub fn validate_host(
    slot_key: &str,
    field: &str,
    host: &str,
) -> Result<()> {
    if host.contains("://") {
        return Err(ProvisionError::validation(slot_key, field, "expected a hostname, not a url"));
    }
    if host.chars().any(|c| c.is_whitespace() || c == '/' || c == ':') {
        return Err(ProvisionError::validation(slot_key, field, format!("'{}' is not a valid hostname", host)));
    }
    Ok(())
}
