//! Policy resolution core.
//!
//! Owns every published configuration surface (rule sets, per-principal
//! overrides, template maps, global property layers, patch overrides) and
//! answers the per-request questions: which property value does this caller
//! see, does it get treated at all, and which patch level does it observe.
//!
//! Publication discipline: each surface is an immutable snapshot behind a
//! single `RwLock<Arc<..>>` pointer swap. Derived per-caller decision
//! caches are bundled inside the snapshot they were computed against, so a
//! reload implicitly starts from empty caches and readers can never mix old
//! rules with new memos.

mod suffix;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Datelike;
use dashmap::DashMap;
use parking_lot::RwLock;

use mimic_core::patch::{convert_patch_level, FALLBACK_PATCH_LEVEL};
use mimic_core::trie::RuleTrie;
use mimic_core::CallerId;

use crate::files::{AppOverride, GlobalProps, PatchOverrides, PatchValue, RuleSets};
use crate::obs::EngineMetrics;
use crate::principals::{Clock, PrincipalCache};

pub use suffix::{template_field_for, SuffixMap};

/// Baseline spoofed properties: the lowest-precedence layer, always
/// present.
const DEFAULT_PROPERTIES: &[(&str, &str)] = &[
    ("ro.boot.verifiedbootstate", "green"),
    ("ro.boot.flash.locked", "1"),
    ("ro.boot.veritymode", "enforcing"),
    ("ro.boot.vbmeta.device_state", "locked"),
    ("ro.boot.warranty_bit", "0"),
    ("ro.secure", "1"),
    ("ro.debuggable", "0"),
    ("ro.oem_unlock_supported", "0"),
];

fn default_property(key: &str) -> Option<&'static str> {
    DEFAULT_PROPERTIES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Rule tries plus the decision caches valid for their lifetime.
struct RuleSnapshot {
    sets: RuleSets,
    treatment_cache: DashMap<CallerId, bool>,
    generation_cache: DashMap<CallerId, bool>,
}

impl RuleSnapshot {
    fn new(sets: RuleSets) -> Self {
        Self {
            sets,
            treatment_cache: DashMap::new(),
            generation_cache: DashMap::new(),
        }
    }
}

struct AppOverrideSnapshot {
    rules: RuleTrie<AppOverride>,
    cache: DashMap<CallerId, Option<Arc<AppOverride>>>,
}

struct PatchSnapshot {
    overrides: PatchOverrides,
    cache: DashMap<CallerId, Option<PatchValue>>,
}

type TemplateMaps = HashMap<String, Arc<HashMap<String, String>>>;

/// The concurrently-accessed resolution engine.
pub struct PolicyResolver {
    clock: Arc<dyn Clock>,
    principals: Arc<PrincipalCache>,
    suffix: SuffixMap,
    metrics: Arc<EngineMetrics>,

    rules: RwLock<Arc<RuleSnapshot>>,
    app_overrides: RwLock<Arc<AppOverrideSnapshot>>,
    templates: RwLock<Arc<TemplateMaps>>,
    global_props: RwLock<Arc<GlobalProps>>,
    drm_overrides: RwLock<Arc<HashMap<String, String>>>,
    patches: RwLock<Arc<PatchSnapshot>>,

    // Memo for time-relative patch templates, keyed by the raw string.
    dynamic_patch: DashMap<String, (i64, i32)>,
    patch_memo_ttl_ms: i64,

    global_mode: AtomicBool,
    broken_mode: AtomicBool,
    auto_broken: AtomicBool,
}

impl PolicyResolver {
    pub fn new(
        clock: Arc<dyn Clock>,
        principals: Arc<PrincipalCache>,
        metrics: Arc<EngineMetrics>,
        patch_memo_ttl_ms: u64,
    ) -> Self {
        Self {
            clock,
            principals,
            suffix: SuffixMap::new(),
            metrics,
            rules: RwLock::new(Arc::new(RuleSnapshot::new(RuleSets::default()))),
            app_overrides: RwLock::new(Arc::new(AppOverrideSnapshot {
                rules: RuleTrie::new(),
                cache: DashMap::new(),
            })),
            templates: RwLock::new(Arc::new(TemplateMaps::new())),
            global_props: RwLock::new(Arc::new(GlobalProps::default())),
            drm_overrides: RwLock::new(Arc::new(HashMap::new())),
            patches: RwLock::new(Arc::new(PatchSnapshot {
                overrides: PatchOverrides::default(),
                cache: DashMap::new(),
            })),
            dynamic_patch: DashMap::new(),
            patch_memo_ttl_ms: patch_memo_ttl_ms as i64,
            global_mode: AtomicBool::new(false),
            broken_mode: AtomicBool::new(false),
            auto_broken: AtomicBool::new(false),
        }
    }

    // ---- snapshot publication -------------------------------------------

    pub fn install_rules(&self, sets: RuleSets) {
        *self.rules.write() = Arc::new(RuleSnapshot::new(sets));
    }

    pub fn install_app_overrides(&self, rules: RuleTrie<AppOverride>) {
        *self.app_overrides.write() = Arc::new(AppOverrideSnapshot {
            rules,
            cache: DashMap::new(),
        });
    }

    pub fn install_templates(&self, maps: HashMap<String, HashMap<String, String>>) {
        let maps: TemplateMaps = maps.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
        *self.templates.write() = Arc::new(maps);
    }

    pub fn install_global_props(&self, props: GlobalProps) {
        *self.global_props.write() = Arc::new(props);
    }

    pub fn install_drm_overrides(&self, vars: HashMap<String, String>) {
        *self.drm_overrides.write() = Arc::new(vars);
    }

    /// Publish new patch overrides; the dynamic memo is invalidated
    /// wholesale so `today`-style templates re-expand.
    pub fn install_patches(&self, overrides: PatchOverrides) {
        *self.patches.write() = Arc::new(PatchSnapshot {
            overrides,
            cache: DashMap::new(),
        });
        self.dynamic_patch.clear();
    }

    pub fn set_global_mode(&self, enabled: bool) {
        self.global_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn set_broken_mode(&self, enabled: bool) {
        self.broken_mode.store(enabled, Ordering::Relaxed);
    }

    /// Platform-detected variant of broken mode (does not affect rule-file
    /// routing, only the decision combinators).
    pub fn set_auto_broken(&self, enabled: bool) {
        self.auto_broken.store(enabled, Ordering::Relaxed);
    }

    pub fn global_mode(&self) -> bool {
        self.global_mode.load(Ordering::Relaxed)
    }

    pub fn broken_mode(&self) -> bool {
        self.broken_mode.load(Ordering::Relaxed) || self.auto_broken.load(Ordering::Relaxed)
    }

    /// File-routing flavor of broken mode: only the explicit marker file
    /// changes how the rule file is parsed.
    pub fn broken_mode_configured(&self) -> bool {
        self.broken_mode.load(Ordering::Relaxed)
    }

    // ---- property resolution --------------------------------------------

    /// Resolve a property for a caller. Precedence, highest first:
    /// template verbatim key, template suffix-mapped key, DRM override,
    /// global override (verbatim then suffix-mapped), built-in default.
    pub fn resolve(&self, key: &str, caller: CallerId) -> Option<String> {
        let template = self.caller_template(caller);

        if let Some(t) = &template {
            if let Some(v) = t.get(key) {
                return Some(v.clone());
            }
            if let Some(field) = self.suffix.lookup(key) {
                if let Some(v) = t.get(field) {
                    return Some(v.clone());
                }
                if field == "DISPLAY" {
                    if let Some(v) = t.get("ID") {
                        return Some(v.clone());
                    }
                }
            }
        }

        self.resolve_global(key)
    }

    /// Caller-less overload: skips the template layers.
    pub fn resolve_global(&self, key: &str) -> Option<String> {
        let drm = Arc::clone(&self.drm_overrides.read());
        if let Some(v) = drm.get(key) {
            return Some(v.clone());
        }

        let props = Arc::clone(&self.global_props.read());
        if let Some(v) = props.vars.get(key) {
            return Some(v.clone());
        }
        if let Some(field) = self.suffix.lookup(key) {
            if let Some(v) = props.vars.get(field) {
                return Some(v.clone());
            }
            if field == "DISPLAY" {
                if let Some(v) = props.vars.get("ID") {
                    return Some(v.clone());
                }
            }
        }

        default_property(key).map(str::to_string)
    }

    /// Attestation-id bytes: explicit `ATTESTATION_ID_*` override first,
    /// else the property-resolution result as UTF-8.
    pub fn attestation_id(&self, tag: &str, caller: CallerId) -> Option<Vec<u8>> {
        let props = Arc::clone(&self.global_props.read());
        if let Some(bytes) = props.attestation_ids.get(tag) {
            return Some(bytes.clone());
        }
        self.resolve(tag, caller).map(String::into_bytes)
    }

    /// The per-caller override record, memoized against the current
    /// override snapshot. Negative results are only memoized when the
    /// caller resolved to at least one principal.
    pub fn app_override(&self, caller: CallerId) -> Option<Arc<AppOverride>> {
        let snap = Arc::clone(&self.app_overrides.read());
        if let Some(cached) = snap.cache.get(&caller) {
            return cached.value().clone();
        }

        let principals = self.principals.get(caller);
        let found = principals
            .iter()
            .find_map(|p| snap.rules.get(p))
            .cloned()
            .map(Arc::new);
        if !principals.is_empty() {
            snap.cache.insert(caller, found.clone());
        }
        found
    }

    /// Property map of a published template, case-insensitive id.
    pub fn template_map(&self, id: &str) -> Option<Arc<HashMap<String, String>>> {
        self.templates.read().get(&id.to_lowercase()).cloned()
    }

    /// Identifiers of every template currently visible to resolution.
    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn caller_template(&self, caller: CallerId) -> Option<Arc<HashMap<String, String>>> {
        let id = self.app_override(caller)?.template.clone()?;
        let templates = Arc::clone(&self.templates.read());
        templates.get(&id).cloned()
    }

    // ---- treatment / generation decisions -------------------------------

    /// Whether the caller receives spoofed identity values.
    pub fn needs_spoof(&self, caller: CallerId) -> bool {
        if self.broken_mode() {
            return false;
        }
        if self.global_mode() {
            return true;
        }

        let snap = Arc::clone(&self.rules.read());
        if let Some(cached) = snap.treatment_cache.get(&caller) {
            return *cached;
        }
        let result = self.check_rules(&snap.sets.treatment, caller);
        snap.treatment_cache.insert(caller, result);
        self.metrics.decisions.inc(&[("kind", "treatment")]);
        result
    }

    /// Whether the caller receives synthetic key material.
    pub fn needs_generation(&self, caller: CallerId) -> bool {
        if self.broken_mode() && self.global_mode() {
            return true;
        }
        if self.global_mode() {
            return false;
        }

        let snap = Arc::clone(&self.rules.read());

        let generation = match snap.generation_cache.get(&caller) {
            Some(cached) => *cached,
            None => {
                let r = self.check_rules(&snap.sets.generation, caller);
                snap.generation_cache.insert(caller, r);
                self.metrics.decisions.inc(&[("kind", "generation")]);
                r
            }
        };

        if self.broken_mode() {
            if generation {
                return true;
            }
            // In broken mode a treatment match also warrants generation.
            match snap.treatment_cache.get(&caller) {
                Some(cached) => *cached,
                None => {
                    let r = self.check_rules(&snap.sets.treatment, caller);
                    snap.treatment_cache.insert(caller, r);
                    r
                }
            }
        } else {
            generation
        }
    }

    fn check_rules(&self, rules: &RuleTrie<()>, caller: CallerId) -> bool {
        if rules.is_empty() {
            return false;
        }
        let principals = self.principals.get(caller);
        principals.iter().any(|p| rules.matches(p))
    }

    // ---- patch level ----------------------------------------------------

    /// Numeric patch level for a caller.
    ///
    /// Scans every principal of the caller for an override (one caller id
    /// can host several unrelated principals), falls back to the file-wide
    /// default, then to the static fallback constant.
    pub fn patch_level(&self, caller: CallerId) -> i32 {
        let snap = Arc::clone(&self.patches.read());

        let value = match snap.cache.get(&caller).map(|c| c.value().clone()) {
            Some(v) => v,
            None => {
                let (found, cacheable) = if snap.overrides.per_principal.is_empty() {
                    (snap.overrides.default.clone(), true)
                } else {
                    let principals = self.principals.get(caller);
                    let hit = principals
                        .iter()
                        .find_map(|p| snap.overrides.per_principal.get(p))
                        .cloned();
                    (
                        hit.or_else(|| snap.overrides.default.clone()),
                        !principals.is_empty(),
                    )
                };
                if cacheable {
                    snap.cache.insert(caller, found.clone());
                }
                found
            }
        };

        match value {
            None => FALLBACK_PATCH_LEVEL,
            Some(PatchValue::Level(level)) => level,
            Some(PatchValue::Raw(raw)) => self.dynamic_level(&raw),
        }
    }

    fn dynamic_level(&self, raw: &str) -> i32 {
        let now = self.clock.now_millis();
        if let Some(hit) = self.dynamic_patch.get(raw) {
            let (at, level) = *hit;
            if now - at < self.patch_memo_ttl_ms {
                return level;
            }
        }

        let expanded = expand_patch_macros(raw, now);
        let level = convert_patch_level(&expanded, false);
        self.dynamic_patch.insert(raw.to_string(), (now, level));
        level
    }

    // ---- lifecycle ------------------------------------------------------

    /// Return every surface to its pristine state (testing seam).
    pub fn reset(&self) {
        self.install_rules(RuleSets::default());
        self.install_app_overrides(RuleTrie::new());
        self.install_templates(HashMap::new());
        self.install_global_props(GlobalProps::default());
        self.install_drm_overrides(HashMap::new());
        self.install_patches(PatchOverrides::default());
        self.suffix.clear();
        self.principals.clear();
        self.global_mode.store(false, Ordering::Relaxed);
        self.broken_mode.store(false, Ordering::Relaxed);
        self.auto_broken.store(false, Ordering::Relaxed);
    }
}

/// Expand `today` / `YYYY` / `MM` / `DD` against the clock; anything else
/// passes through untouched.
fn expand_patch_macros(raw: &str, now_ms: i64) -> String {
    let Some(date) = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(now_ms)
        .map(|dt| dt.with_timezone(&chrono::Local).date_naive())
    else {
        return raw.to_string();
    };

    if raw.eq_ignore_ascii_case("today") {
        return date.format("%Y-%m-%d").to_string();
    }
    if raw.contains("YYYY") || raw.contains("MM") || raw.contains("DD") {
        return raw
            .replace("YYYY", &format!("{:04}", date.year()))
            .replace("MM", &format!("{:02}", date.month()))
            .replace("DD", &format!("{:02}", date.day()));
    }
    raw.to_string()
}
