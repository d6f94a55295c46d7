//! INI-style template overlay file.
//!
//! `[id]` sections of `KEY=VALUE` lines. A section naming an existing
//! template extends its property map; an unknown section creates a new
//! map-only template visible to property resolution (but not to the
//! registry's listing).

use std::collections::HashMap;

/// Apply the overlay on top of the base template maps (keyed by lowercased
/// id), in place.
pub fn apply_template_overlay(
    content: &str,
    base: &mut HashMap<String, HashMap<String, String>>,
) {
    let mut current: Option<(String, HashMap<String, String>)> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(id) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if let Some((id, props)) = current.take() {
                base.insert(id, props);
            }
            let id = id.to_lowercase();
            let props = base.get(&id).cloned().unwrap_or_default();
            current = Some((id, props));
        } else if let Some((_, props)) = current.as_mut() {
            if let Some((key, value)) = line.split_once('=') {
                props.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    if let Some((id, props)) = current {
        base.insert(id, props);
    }
}
