//! Named identity templates.
//!
//! A template is an immutable bundle of device-identity properties. Built-in
//! templates load first; user templates from `templates.json` overlay them
//! (the user file wins on id collision). Identifiers are compared
//! case-insensitively everywhere, even though the on-disk id preserves its
//! original case.

mod builtin;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

pub use builtin::builtin_templates;

/// One identity profile: the property set presented to treated callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceTemplate {
    /// Unique id, e.g. "pixel8pro".
    pub id: String,
    pub manufacturer: String,
    pub model: String,
    pub fingerprint: String,
    pub brand: String,
    pub product: String,
    pub device: String,
    pub release: String,
    #[serde(rename = "buildId")]
    pub build_id: String,
    pub incremental: String,
    #[serde(rename = "type", default = "default_build_type")]
    pub build_type: String,
    #[serde(default = "default_tags")]
    pub tags: String,
    #[serde(rename = "securityPatch")]
    pub security_patch: String,
}

fn default_build_type() -> String {
    "user".into()
}
fn default_tags() -> String {
    "release-keys".into()
}

impl DeviceTemplate {
    /// Field-name keyed property map consumed by the resolver's
    /// suffix-mapping layer.
    pub fn property_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("MANUFACTURER".into(), self.manufacturer.clone()),
            ("MODEL".into(), self.model.clone()),
            ("FINGERPRINT".into(), self.fingerprint.clone()),
            ("BRAND".into(), self.brand.clone()),
            ("PRODUCT".into(), self.product.clone()),
            ("DEVICE".into(), self.device.clone()),
            ("RELEASE".into(), self.release.clone()),
            ("ID".into(), self.build_id.clone()),
            ("INCREMENTAL".into(), self.incremental.clone()),
            ("TYPE".into(), self.build_type.clone()),
            ("TAGS".into(), self.tags.clone()),
            ("SECURITY_PATCH".into(), self.security_patch.clone()),
        ])
    }
}

/// Registry of built-in plus user-supplied templates.
pub struct TemplateRegistry {
    // Keyed by lowercased id.
    templates: RwLock<HashMap<String, DeviceTemplate>>,
    // Sorted listing memo, invalidated by any mutation.
    sorted: Mutex<Option<Arc<Vec<DeviceTemplate>>>>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(HashMap::new()),
            sorted: Mutex::new(None),
        }
    }

    /// Load built-ins, then overlay `templates.json` from `config_dir`.
    ///
    /// A missing file seeds the built-ins back to disk for user editing.
    /// A malformed file or entry is logged and skipped; it never aborts the
    /// load of the remaining entries.
    pub fn initialize(&self, config_dir: &Path) {
        let mut map = HashMap::new();
        for t in builtin_templates() {
            map.insert(t.id.to_lowercase(), t);
        }

        let file = config_dir.join(TEMPLATES_FILE);
        if file.exists() {
            match fs::read_to_string(&file) {
                Ok(json) => {
                    let loaded = parse_template_json(&json);
                    tracing::info!(count = loaded.len(), "loaded user templates");
                    for t in loaded {
                        map.insert(t.id.to_lowercase(), t);
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to read templates.json"),
            }
        }

        *self.templates.write() = map;
        *self.sorted.lock() = None;

        if !file.exists() {
            self.save(config_dir);
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, id: &str) -> Option<DeviceTemplate> {
        self.templates.read().get(&id.to_lowercase()).cloned()
    }

    /// All templates sorted by display model name. Memoized until the next
    /// mutation.
    pub fn list(&self) -> Arc<Vec<DeviceTemplate>> {
        let mut memo = self.sorted.lock();
        if let Some(cached) = memo.as_ref() {
            return Arc::clone(cached);
        }
        let mut all: Vec<DeviceTemplate> = self.templates.read().values().cloned().collect();
        all.sort_by(|a, b| a.model.cmp(&b.model));
        let arc = Arc::new(all);
        *memo = Some(Arc::clone(&arc));
        arc
    }

    /// Add or replace a template at runtime, invalidating the listing memo.
    pub fn add(&self, template: DeviceTemplate) {
        self.templates
            .write()
            .insert(template.id.to_lowercase(), template);
        *self.sorted.lock() = None;
    }

    /// Persist the current set to `templates.json`. Best effort; failures
    /// are logged.
    pub fn save(&self, config_dir: &Path) {
        let all = self.list();
        match serde_json::to_string_pretty(all.as_ref()) {
            Ok(json) => {
                if let Err(e) = fs::write(config_dir.join(TEMPLATES_FILE), json) {
                    tracing::error!(error = %e, "failed to save templates.json");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize templates"),
        }
    }
}

pub const TEMPLATES_FILE: &str = "templates.json";

/// Parse a JSON array of templates, skipping malformed entries.
pub fn parse_template_json(json: &str) -> Vec<DeviceTemplate> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "templates.json is not a JSON array");
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<DeviceTemplate>(value) {
            Ok(t) => out.push(t),
            Err(e) => tracing::error!(error = %e, "skipping malformed template entry"),
        }
    }
    out
}
