//! Line-oriented configuration-file parsers.
//!
//! Each parser takes raw file content and produces a fresh immutable value;
//! the service layer publishes the result as a snapshot. Blank lines and
//! `#` comments are ignored everywhere; a malformed line is skipped, never
//! fatal to the rest of the file.

mod app_config;
mod props;
mod rules;
mod security_patch;
mod template_overlay;

pub use app_config::{parse_app_overrides, AppOverride};
pub use props::{parse_drm_overrides, parse_global_props, GlobalProps};
pub use rules::{parse_rules, RuleSets};
pub use security_patch::{parse_patch_overrides, PatchOverrides, PatchValue};
pub use template_overlay::apply_template_overlay;

/// Lines that carry configuration: non-blank, not comments.
fn config_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}
