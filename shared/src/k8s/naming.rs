//! Bit-exact name construction and parsing. Every derived object's identity
//! hinges on these functions producing the same string every time they are
//! given the same inputs.

use regex::Regex;
use std::sync::OnceLock;

static GROUP_NAME_RE: OnceLock<Regex> = OnceLock::new();
static ROLE_ID_RE: OnceLock<Regex> = OnceLock::new();
static DNS_1035_RE: OnceLock<Regex> = OnceLock::new();

fn group_name_re() -> &'static Regex {
    GROUP_NAME_RE.get_or_init(|| Regex::new(r"^(?P<parent>.*)-(?P<ordinal>[0-9]+)$").unwrap())
}

fn role_id_re() -> &'static Regex {
    ROLE_ID_RE.get_or_init(|| Regex::new(r"^(?P<role>.*)-(?P<idx>[0-9]+)$").unwrap())
}

fn dns_1035_re() -> &'static Regex {
    DNS_1035_RE.get_or_init(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").unwrap())
}

/// `MS.name + "-" + ordinal`
pub fn group_name(ms_name: &str, ordinal: u32) -> String {
    format!("{ms_name}-{ordinal}")
}

/// `role.name + "-" + roleIndex`
pub fn role_id(role_name: &str, role_index: i32) -> String {
    format!("{role_name}-{role_index}")
}

/// `groupName + "-" + roleID + "-0"`
pub fn entry_pod_name(group_name: &str, role_id: &str) -> String {
    format!("{group_name}-{role_id}-0")
}

/// `groupName + "-" + roleID + "-" + workerIndex`, `workerIndex >= 1`.
pub fn worker_pod_name(group_name: &str, role_id: &str, worker_index: i32) -> String {
    format!("{group_name}-{role_id}-{worker_index}")
}

/// The headless service for a role instance shares its entry pod's name.
pub fn headless_service_name(entry_pod_name: &str) -> String {
    entry_pod_name.to_string()
}

/// Splits `<parent>-<ordinal>` into its parts. Returns `None` for names that
/// don't end in a numeric ordinal (unparsable — caller should condemn).
pub fn parse_group_name(name: &str) -> Option<(String, u32)> {
    let caps = group_name_re().captures(name)?;
    let parent = caps.name("parent")?.as_str().to_string();
    let ordinal: u32 = caps.name("ordinal")?.as_str().parse().ok()?;
    Some((parent, ordinal))
}

/// Splits `<roleName>-<idx>` into its parts.
pub fn parse_role_id(id: &str) -> Option<(String, i32)> {
    let caps = role_id_re().captures(id)?;
    let role = caps.name("role")?.as_str().to_string();
    let idx: i32 = caps.name("idx")?.as_str().parse().ok()?;
    Some((role, idx))
}

/// DNS-1035 label: `[a-z]([-a-z0-9]*[a-z0-9])?`, at most 63 characters.
pub fn is_dns_1035_label(name: &str) -> bool {
    !name.is_empty() && name.len() <= 63 && dns_1035_re().is_match(name)
}

/// Validates every name a role instance would produce before it is created.
pub fn validate_projected_names(entry_pod: &str, headless_service: &str, workers: &[String]) -> Result<(), String> {
    for n in std::iter::once(entry_pod)
        .chain(std::iter::once(headless_service))
        .chain(workers.iter().map(String::as_str))
    {
        if !is_dns_1035_label(n) {
            return Err(format!("name {n:?} is not a valid DNS-1035 label"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_names_per_contract() {
        let g = group_name("test-mi", 0);
        assert_eq!(g, "test-mi-0");
        let rid = role_id("prefill", 1);
        assert_eq!(rid, "prefill-1");
        assert_eq!(entry_pod_name(&g, &rid), "test-mi-0-prefill-1-0");
        assert_eq!(worker_pod_name(&g, &rid, 2), "test-mi-0-prefill-1-2");
    }

    #[test]
    fn parses_ordinals_and_rejects_garbage() {
        assert_eq!(parse_group_name("test-mi-3"), Some(("test-mi".to_string(), 3)));
        assert_eq!(parse_group_name("test-mi"), None);
        assert_eq!(parse_group_name("test-mi-abc"), None);
        assert_eq!(parse_role_id("prefill-0"), Some(("prefill".to_string(), 0)));
    }

    #[test]
    fn validates_dns_1035() {
        assert!(is_dns_1035_label("test-mi-0-prefill-0-0"));
        assert!(!is_dns_1035_label("Test-MI"));
        assert!(!is_dns_1035_label(""));
        assert!(!is_dns_1035_label(&"a".repeat(64)));
    }
}
