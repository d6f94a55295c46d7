//! Global property files: `KEY=VALUE` per line.
//!
//! Two layers share the format: the global override file (which also honors
//! a `TEMPLATE` pseudo-key and extracts `ATTESTATION_ID_*` entries) and the
//! DRM-specific override file.

use std::collections::HashMap;
use std::sync::Arc;

use super::config_lines;

/// Global override layer plus the attestation-id byte map derived from it.
#[derive(Debug, Default, Clone)]
pub struct GlobalProps {
    pub vars: HashMap<String, String>,
    pub attestation_ids: HashMap<String, Vec<u8>>,
}

/// Parse the global override file.
///
/// A key literally named `TEMPLATE` merges the named template's full
/// property set in at that point; later lines can still override individual
/// keys. `template_lookup` resolves a template id to its property map.
pub fn parse_global_props(
    content: &str,
    template_lookup: impl Fn(&str) -> Option<Arc<HashMap<String, String>>>,
) -> GlobalProps {
    let mut props = GlobalProps::default();
    for line in config_lines(content) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key == "TEMPLATE" {
            match template_lookup(value) {
                Some(map) => props
                    .vars
                    .extend(map.iter().map(|(k, v)| (k.clone(), v.clone()))),
                None => tracing::warn!(template = value, "TEMPLATE refers to unknown template"),
            }
            continue;
        }

        props.vars.insert(key.to_string(), value.to_string());
        if let Some(tag) = key.strip_prefix("ATTESTATION_ID_") {
            props
                .attestation_ids
                .insert(tag.to_string(), value.as_bytes().to_vec());
        }
    }
    props
}

/// Parse the DRM override file (plain `KEY=VALUE`, highest-priority global
/// layer).
pub fn parse_drm_overrides(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in config_lines(content) {
        if let Some((key, value)) = line.split_once('=') {
            vars.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    vars
}
