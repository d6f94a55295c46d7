//! Per-principal override file.
//!
//! Whitespace-separated columns per line:
//! `principal [template|null] [keybox-id|null] [perm,perm,...|null]`.
//! The principal column supports trailing-wildcard rules like the rule
//! file. Lines that set no field at all are dropped.

use std::collections::HashSet;

use mimic_core::trie::RuleTrie;

use super::config_lines;

/// Per-principal spoofing override.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOverride {
    /// Template id (stored lowercased).
    pub template: Option<String>,
    /// Key material override for this principal.
    pub keybox_id: Option<String>,
    /// Extra capability grants for this principal.
    pub permissions: HashSet<String>,
}

pub fn parse_app_overrides(content: &str) -> RuleTrie<AppOverride> {
    let mut trie = RuleTrie::new();
    for line in config_lines(content) {
        let mut parts = line.split_whitespace();
        let Some(principal) = parts.next() else {
            continue;
        };

        let mut entry = AppOverride::default();
        if let Some(t) = parts.next().filter(|v| *v != "null") {
            entry.template = Some(t.to_lowercase());
        }
        if let Some(k) = parts.next().filter(|v| *v != "null") {
            entry.keybox_id = Some(k.to_string());
        }
        if let Some(perms) = parts.next().filter(|v| *v != "null") {
            entry.permissions = perms
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        if entry.template.is_some() || entry.keybox_id.is_some() || !entry.permissions.is_empty() {
            trie.add(principal, entry);
        }
    }
    trie
}
