#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use mimic_core::{CallerId, Result};
use mimic_engine::files::{
    parse_app_overrides, parse_drm_overrides, parse_global_props, parse_patch_overrides,
    parse_rules,
};
use mimic_engine::obs::EngineMetrics;
use mimic_engine::principals::{Clock, PrincipalCache, PrincipalSource};
use mimic_engine::resolver::PolicyResolver;
use mimic_engine::templates::builtin_templates;

struct StubClock(AtomicI64);

impl StubClock {
    fn at(ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(ms)))
    }
    fn set(&self, ms: i64) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl Clock for StubClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct MapSource(HashMap<CallerId, Vec<String>>);

impl PrincipalSource for MapSource {
    fn principals_of(&self, caller: CallerId) -> Result<Vec<String>> {
        Ok(self.0.get(&caller).cloned().unwrap_or_default())
    }
}

const GAME: CallerId = 1001;
const BANK: CallerId = 1002;
const SHARED: CallerId = 1003;
const UNKNOWN: CallerId = 9999;

fn resolver_with(clock: Arc<StubClock>) -> PolicyResolver {
    resolver_with_memo_ttl(clock, 3_600_000)
}

fn resolver_with_memo_ttl(clock: Arc<StubClock>, memo_ttl_ms: u64) -> PolicyResolver {
    let source = Arc::new(MapSource(HashMap::from([
        (GAME, vec!["com.game.example".to_string()]),
        (BANK, vec!["com.bank.app".to_string()]),
        (
            SHARED,
            vec!["com.vendor.alpha".to_string(), "com.vendor.beta".to_string()],
        ),
    ])));
    let metrics = Arc::new(EngineMetrics::default());
    let cache_clock: Arc<dyn Clock> = clock.clone();
    let principals = Arc::new(PrincipalCache::new(
        source,
        cache_clock,
        60_000,
        200,
        Arc::clone(&metrics),
    ));
    PolicyResolver::new(clock, principals, metrics, memo_ttl_ms)
}

fn install_builtin_templates(resolver: &PolicyResolver) {
    let maps = builtin_templates()
        .into_iter()
        .map(|t| (t.id.to_lowercase(), t.property_map()))
        .collect();
    resolver.install_templates(maps);
}

#[test]
fn suffix_mapping_resolves_template_fingerprint() {
    let resolver = resolver_with(StubClock::at(0));
    install_builtin_templates(&resolver);
    resolver.install_app_overrides(parse_app_overrides("com.game.example pixel8pro"));

    // The literal key differs from the template field name; the suffix
    // table bridges them.
    assert_eq!(
        resolver.resolve("ro.build.fingerprint", GAME).as_deref(),
        Some("google/husky/husky:14/AP1A.240405.002/11480754:user/release-keys")
    );
    assert_eq!(
        resolver.resolve("ro.product.model", GAME).as_deref(),
        Some("Pixel 8 Pro")
    );
    // display.id falls through to the build id.
    assert_eq!(
        resolver.resolve("ro.build.display.id", GAME).as_deref(),
        Some("AP1A.240405.002")
    );
}

#[test]
fn template_verbatim_key_beats_suffix_mapping() {
    let resolver = resolver_with(StubClock::at(0));
    let mut map = builtin_templates()[0].property_map();
    map.insert("ro.product.model".into(), "Verbatim Model".into());
    resolver.install_templates(HashMap::from([("pixel8pro".to_string(), map)]));
    resolver.install_app_overrides(parse_app_overrides("com.game.example pixel8pro"));

    assert_eq!(
        resolver.resolve("ro.product.model", GAME).as_deref(),
        Some("Verbatim Model")
    );
}

#[test]
fn precedence_below_templates_is_drm_then_global_then_default() {
    let resolver = resolver_with(StubClock::at(0));

    resolver.install_global_props(parse_global_props("ro.x=global\nro.secure=0", |_| None));
    assert_eq!(resolver.resolve("ro.x", UNKNOWN).as_deref(), Some("global"));
    assert_eq!(resolver.resolve("ro.secure", UNKNOWN).as_deref(), Some("0"));

    resolver.install_drm_overrides(parse_drm_overrides("ro.x=drm"));
    assert_eq!(resolver.resolve("ro.x", UNKNOWN).as_deref(), Some("drm"));

    // Built-in defaults remain underneath everything.
    assert_eq!(
        resolver.resolve("ro.boot.verifiedbootstate", UNKNOWN).as_deref(),
        Some("green")
    );
    assert_eq!(resolver.resolve("ro.nonexistent", UNKNOWN), None);
}

#[test]
fn global_layer_applies_suffix_mapping_too() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.install_global_props(parse_global_props("MODEL=Pixel 8\nID=AP1A", |_| None));

    assert_eq!(
        resolver.resolve_global("ro.product.model").as_deref(),
        Some("Pixel 8")
    );
    assert_eq!(
        resolver.resolve_global("ro.build.display.id").as_deref(),
        Some("AP1A")
    );
}

#[test]
fn caller_less_overload_skips_template_layers() {
    let resolver = resolver_with(StubClock::at(0));
    install_builtin_templates(&resolver);
    resolver.install_app_overrides(parse_app_overrides("com.game.example pixel8pro"));

    assert!(resolver.resolve("ro.build.fingerprint", GAME).is_some());
    assert_eq!(resolver.resolve_global("ro.build.fingerprint"), None);
}

#[test]
fn template_merge_in_global_props() {
    let resolver = resolver_with(StubClock::at(0));
    install_builtin_templates(&resolver);

    let props = parse_global_props("TEMPLATE=pixel8\nMODEL=Overridden", |id| {
        resolver.template_map(id)
    });
    resolver.install_global_props(props);

    // Merged template fields resolve globally; later lines override.
    assert_eq!(
        resolver.resolve_global("ro.product.model").as_deref(),
        Some("Overridden")
    );
    assert_eq!(
        resolver.resolve_global("ro.build.fingerprint").as_deref(),
        Some("google/shiba/shiba:14/AP1A.240405.002/11480754:user/release-keys")
    );
}

#[test]
fn attestation_id_prefers_explicit_override() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.install_global_props(parse_global_props(
        "ATTESTATION_ID_SERIAL=ABC123\nMODEL=Pixel 8",
        |_| None,
    ));

    assert_eq!(
        resolver.attestation_id("SERIAL", UNKNOWN).as_deref(),
        Some(b"ABC123".as_slice())
    );
    // No explicit id: falls back to property resolution.
    assert_eq!(
        resolver.attestation_id("ro.product.model", UNKNOWN).as_deref(),
        Some(b"Pixel 8".as_slice())
    );
    assert_eq!(resolver.attestation_id("ro.none", UNKNOWN), None);
}

#[test]
fn treatment_rules_match_principals() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.install_rules(parse_rules("com.game.example\ncom.vendor.*", false));

    assert!(resolver.needs_spoof(GAME));
    assert!(resolver.needs_spoof(SHARED));
    assert!(!resolver.needs_spoof(BANK));
    assert!(!resolver.needs_spoof(UNKNOWN));
    assert!(!resolver.needs_generation(GAME));
}

#[test]
fn generation_marker_routes_to_generation_set() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.install_rules(parse_rules("com.game.example\ncom.bank.app!", false));

    assert!(resolver.needs_generation(BANK));
    assert!(!resolver.needs_spoof(BANK));
    assert!(!resolver.needs_generation(GAME));
}

#[test]
fn global_mode_overrides_rules() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.set_global_mode(true);

    assert!(resolver.needs_spoof(UNKNOWN));
    assert!(!resolver.needs_generation(UNKNOWN));
}

#[test]
fn broken_mode_decision_table() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.install_rules(parse_rules("com.game.example", false));

    // Broken alone: treatment off, generation covers treatment matches.
    resolver.set_broken_mode(true);
    assert!(!resolver.needs_spoof(GAME));
    assert!(resolver.needs_generation(GAME));
    assert!(!resolver.needs_generation(BANK));

    // Broken + global: everything generates, nothing spoofs.
    resolver.set_global_mode(true);
    assert!(resolver.needs_generation(UNKNOWN));
    assert!(!resolver.needs_spoof(UNKNOWN));
}

#[test]
fn fresh_rule_snapshot_resets_decisions() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.install_rules(parse_rules("com.game.example", false));
    assert!(resolver.needs_spoof(GAME));

    resolver.install_rules(parse_rules("", false));
    assert!(!resolver.needs_spoof(GAME));
}

#[test]
fn patch_override_found_on_any_principal() {
    let resolver = resolver_with(StubClock::at(0));
    // Only the second principal of the shared caller has an override; the
    // scan must not stop at the first principal.
    resolver.install_patches(parse_patch_overrides(
        "com.vendor.beta=2023-01-01\n2024-01-01",
    ));

    assert_eq!(resolver.patch_level(SHARED), 202301);
    assert_eq!(resolver.patch_level(GAME), 202401);
}

#[test]
fn patch_level_fallback_without_default() {
    let resolver = resolver_with(StubClock::at(0));
    resolver.install_patches(parse_patch_overrides("com.game.example=2022-06-01"));

    assert_eq!(resolver.patch_level(GAME), 202206);
    assert_eq!(resolver.patch_level(BANK), 202404);
}

#[test]
fn dynamic_patch_memoizes_by_raw_string() {
    // 2023-06-15 12:00 UTC: mid-month, safe in every local timezone. The
    // memo TTL is stretched so the clock jump below stays inside it.
    let clock = StubClock::at(1_686_830_400_000);
    let resolver = resolver_with_memo_ttl(Arc::clone(&clock), u64::MAX / 4);
    resolver.install_patches(parse_patch_overrides("YYYY-MM"));

    assert_eq!(resolver.patch_level(GAME), 202306);

    // Clock moves to 2024-02-10 12:00 UTC; the memo (keyed by the raw
    // template string) still answers.
    clock.set(1_707_566_400_000);
    assert_eq!(resolver.patch_level(GAME), 202306);

    // Republishing the patch file invalidates the memo wholesale.
    resolver.install_patches(parse_patch_overrides("YYYY-MM"));
    assert_eq!(resolver.patch_level(GAME), 202402);
}

#[test]
fn dynamic_patch_memo_expires_by_ttl() {
    let clock = StubClock::at(1_686_830_400_000); // 2023-06-15 12:00 UTC
    let resolver = resolver_with_memo_ttl(Arc::clone(&clock), 3_600_000);
    resolver.install_patches(parse_patch_overrides("YYYY-MM"));

    assert_eq!(resolver.patch_level(GAME), 202306);

    // Far beyond the memo TTL: the template re-expands at the new date.
    clock.set(1_707_566_400_000); // 2024-02-10 12:00 UTC
    assert_eq!(resolver.patch_level(GAME), 202402);
}

#[test]
fn today_expands_against_clock() {
    let clock = StubClock::at(1_686_830_400_000); // 2023-06-15 12:00 UTC
    let resolver = resolver_with(Arc::clone(&clock));
    resolver.install_patches(parse_patch_overrides("today"));

    assert_eq!(resolver.patch_level(GAME), 202306);
}
