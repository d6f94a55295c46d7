//! Security-patch override file.
//!
//! `principal=value` lines plus an optional bare default line. Values with
//! no `today`/`YYYY`/`MM`/`DD` macro are pre-parsed to their numeric level
//! at load time; macro values stay raw and are expanded per request against
//! the clock.

use std::collections::HashMap;

use mimic_core::patch::convert_patch_level;

use super::config_lines;

/// A patch override: pre-computed level or a raw template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchValue {
    Level(i32),
    Raw(String),
}

/// Per-principal overrides plus the file-wide default.
#[derive(Debug, Default, Clone)]
pub struct PatchOverrides {
    pub per_principal: HashMap<String, PatchValue>,
    pub default: Option<PatchValue>,
}

fn to_value(raw: &str) -> PatchValue {
    let dynamic = raw.to_lowercase().contains("today")
        || raw.contains("YYYY")
        || raw.contains("MM")
        || raw.contains("DD");
    if dynamic {
        PatchValue::Raw(raw.to_string())
    } else {
        PatchValue::Level(convert_patch_level(raw, false))
    }
}

pub fn parse_patch_overrides(content: &str) -> PatchOverrides {
    let mut overrides = PatchOverrides::default();
    for line in config_lines(content) {
        match line.split_once('=') {
            Some((key, value)) => {
                overrides
                    .per_principal
                    .insert(key.trim().to_string(), to_value(value.trim()));
            }
            None => {
                overrides.default = Some(to_value(line));
            }
        }
    }
    overrides
}
