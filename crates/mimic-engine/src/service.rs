//! Engine wiring and reload orchestration.
//!
//! `SpoofService` owns the resolver, template registry, and revocation
//! checker, and maps the files in the config directory onto the resolver's
//! published snapshots. Construction is plain dependency injection (clock,
//! principal source, feed fetcher, keybox parser) so tests can run several
//! isolated instances.
//!
//! Reload discipline: file-change events drain through a single consumer
//! task, so reloads are serialized relative to each other; a reload failure
//! leaves the previously published snapshot in place and is logged, never
//! surfaced to resolution callers.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mimic_core::{CallerId, Result};

use crate::files::{
    apply_template_overlay, parse_app_overrides, parse_drm_overrides, parse_global_props,
    parse_patch_overrides, parse_rules, RuleSets,
};
use crate::obs::EngineMetrics;
use crate::principals::{Clock, PrincipalCache, PrincipalSource};
use crate::resolver::PolicyResolver;
use crate::revocation::{FeedFetcher, KeyboxParser, RevocationChecker};
use crate::settings::EngineSettings;
use crate::templates::{TemplateRegistry, TEMPLATES_FILE};
use crate::watch::{ChangeCallback, PathWatcher};

pub const RULES_FILE: &str = "target.txt";
pub const APP_CONFIG_FILE: &str = "app_config";
pub const GLOBAL_PROPS_FILE: &str = "spoof_build_vars";
pub const DRM_FIX_FILE: &str = "drm_fix";
pub const SECURITY_PATCH_FILE: &str = "security_patch.txt";
pub const GLOBAL_MODE_FILE: &str = "global_mode";
pub const BROKEN_MODE_FILE: &str = "tee_broken_mode";
pub const CUSTOM_TEMPLATES_FILE: &str = "custom_templates";

/// The assembled engine.
pub struct SpoofService {
    config_dir: PathBuf,
    resolver: PolicyResolver,
    registry: TemplateRegistry,
    revocation: Arc<RevocationChecker>,
    metrics: Arc<EngineMetrics>,
}

impl SpoofService {
    pub fn new(
        settings: &EngineSettings,
        clock: Arc<dyn Clock>,
        source: Arc<dyn PrincipalSource>,
        fetcher: Arc<dyn FeedFetcher>,
        parser: Arc<dyn KeyboxParser>,
    ) -> Self {
        let metrics = Arc::new(EngineMetrics::default());
        let principals = Arc::new(PrincipalCache::new(
            source,
            Arc::clone(&clock),
            settings.principals.ttl_ms,
            settings.principals.capacity,
            Arc::clone(&metrics),
        ));
        let resolver = PolicyResolver::new(
            clock,
            principals,
            Arc::clone(&metrics),
            settings.patches.memo_ttl_ms,
        );
        let revocation = Arc::new(RevocationChecker::new(fetcher, parser, Arc::clone(&metrics)));

        Self {
            config_dir: settings.config_dir.clone(),
            resolver,
            registry: TemplateRegistry::new(),
            revocation,
            metrics,
        }
    }

    /// Load every configuration surface from the config directory.
    pub fn initialize(&self) {
        if let Err(e) = fs::create_dir_all(&self.config_dir) {
            tracing::error!(path = %self.config_dir.display(), error = %e, "failed to create config dir");
        }

        self.reload_global_mode();
        self.reload_broken_mode();
        self.reload_drm_overrides();
        self.reload_templates();
        self.reload_global_props();
        self.reload_security_patch();
        self.reload_app_overrides();
        self.reload_rules();

        if !self.resolver.global_mode() && !self.config_dir.join(RULES_FILE).exists() {
            tracing::error!(
                path = %self.config_dir.join(RULES_FILE).display(),
                "rule file not found, no caller will be treated"
            );
        }
    }

    /// Wire the watcher into a dedicated reload task and start watching the
    /// config directory.
    pub fn start(self: &Arc<Self>, watcher: &dyn PathWatcher) -> Result<()> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PathBuf>();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            // Single consumer: reloads serialize here, readers never wait.
            while let Some(path) = rx.recv().await {
                this.apply_change(&path);
            }
        });

        let callback: ChangeCallback = Arc::new(move |path: PathBuf| {
            let _ = tx.send(path);
        });
        watcher.watch(&self.config_dir, callback)
    }

    /// Dispatch one file's reload. The reload-task entry point; also usable
    /// directly by tests and by hosts with their own notification source.
    pub fn apply_change(&self, path: &Path) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        match name {
            RULES_FILE => self.reload_rules(),
            APP_CONFIG_FILE => self.reload_app_overrides(),
            GLOBAL_PROPS_FILE => self.reload_global_props(),
            DRM_FIX_FILE => self.reload_drm_overrides(),
            SECURITY_PATCH_FILE => self.reload_security_patch(),
            CUSTOM_TEMPLATES_FILE | TEMPLATES_FILE => {
                self.reload_templates();
            }
            GLOBAL_MODE_FILE => {
                self.reload_global_mode();
                self.reload_rules();
            }
            BROKEN_MODE_FILE => {
                self.reload_broken_mode();
                self.reload_rules();
            }
            _ => {}
        }
    }

    // ---- per-file reloads ------------------------------------------------

    pub fn reload_rules(&self) {
        if self.resolver.global_mode() {
            self.resolver.install_rules(RuleSets::default());
            tracing::info!("global mode enabled, rule sets cleared");
            self.metrics.reloads.inc(&[("file", RULES_FILE)]);
            return;
        }

        let content = self.read_file(RULES_FILE).unwrap_or_default();
        let sets = parse_rules(&content, self.resolver.broken_mode_configured());
        tracing::info!(
            treatment = sets.treatment.len(),
            generation = sets.generation.len(),
            "updated rule sets"
        );
        self.resolver.install_rules(sets);
        self.metrics.reloads.inc(&[("file", RULES_FILE)]);
    }

    pub fn reload_app_overrides(&self) {
        let content = self.read_file(APP_CONFIG_FILE).unwrap_or_default();
        let overrides = parse_app_overrides(&content);
        tracing::info!(count = overrides.len(), "updated app overrides");
        self.resolver.install_app_overrides(overrides);
        self.metrics.reloads.inc(&[("file", APP_CONFIG_FILE)]);
    }

    /// Rebuild the merged template maps: registry (built-ins + user file)
    /// overlaid with the INI-style custom template file.
    pub fn reload_templates(&self) {
        self.registry.initialize(&self.config_dir);

        let mut maps: HashMap<String, HashMap<String, String>> = HashMap::new();
        for t in self.registry.list().iter() {
            maps.insert(t.id.to_lowercase(), t.property_map());
        }
        if let Some(content) = self.read_file(CUSTOM_TEMPLATES_FILE) {
            apply_template_overlay(&content, &mut maps);
        }

        tracing::info!(count = maps.len(), "updated templates");
        self.resolver.install_templates(maps);
        self.metrics.reloads.inc(&[("file", TEMPLATES_FILE)]);
    }

    pub fn reload_global_props(&self) {
        let content = self.read_file(GLOBAL_PROPS_FILE).unwrap_or_default();
        let props = parse_global_props(&content, |id| self.resolver.template_map(id));
        tracing::info!(
            vars = props.vars.len(),
            attestation_ids = props.attestation_ids.len(),
            "updated global props"
        );
        self.resolver.install_global_props(props);
        self.metrics.reloads.inc(&[("file", GLOBAL_PROPS_FILE)]);
    }

    pub fn reload_drm_overrides(&self) {
        let content = self.read_file(DRM_FIX_FILE).unwrap_or_default();
        let vars = parse_drm_overrides(&content);
        tracing::info!(count = vars.len(), "updated drm overrides");
        self.resolver.install_drm_overrides(vars);
        self.metrics.reloads.inc(&[("file", DRM_FIX_FILE)]);
    }

    pub fn reload_security_patch(&self) {
        let content = self.read_file(SECURITY_PATCH_FILE).unwrap_or_default();
        let overrides = parse_patch_overrides(&content);
        tracing::info!(
            per_principal = overrides.per_principal.len(),
            has_default = overrides.default.is_some(),
            "updated security patch overrides"
        );
        self.resolver.install_patches(overrides);
        self.metrics.reloads.inc(&[("file", SECURITY_PATCH_FILE)]);
    }

    pub fn reload_global_mode(&self) {
        let enabled = self.config_dir.join(GLOBAL_MODE_FILE).exists();
        self.resolver.set_global_mode(enabled);
        tracing::info!(enabled, "global mode");
    }

    pub fn reload_broken_mode(&self) {
        let enabled = self.config_dir.join(BROKEN_MODE_FILE).exists();
        self.resolver.set_broken_mode(enabled);
        tracing::info!(enabled, "broken mode");
    }

    // ---- hot-path delegates ---------------------------------------------

    pub fn resolve(&self, key: &str, caller: CallerId) -> Option<String> {
        self.resolver.resolve(key, caller)
    }

    pub fn resolve_global(&self, key: &str) -> Option<String> {
        self.resolver.resolve_global(key)
    }

    pub fn needs_spoof(&self, caller: CallerId) -> bool {
        self.resolver.needs_spoof(caller)
    }

    pub fn needs_generation(&self, caller: CallerId) -> bool {
        self.resolver.needs_generation(caller)
    }

    pub fn patch_level(&self, caller: CallerId) -> i32 {
        self.resolver.patch_level(caller)
    }

    // ---- accessors -------------------------------------------------------

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn revocation(&self) -> &Arc<RevocationChecker> {
        &self.revocation
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Return every surface to its pristine state (testing seam).
    pub fn reset(&self) {
        self.resolver.reset();
    }

    fn read_file(&self, name: &str) -> Option<String> {
        let path = self.config_dir.join(name);
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to read config file");
                self.metrics.reload_failures.inc(&[("file", name)]);
                None
            }
        }
    }
}
