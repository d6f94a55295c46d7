//! Smart property-suffix mapping.
//!
//! Requested property names vary by namespace (`ro.build.fingerprint`,
//! `ro.vendor.build.fingerprint`, ...) but all map onto a small set of
//! template fields by suffix. The match order matters: `version.codename`
//! must be tested before the bare `name` suffix, and `product` before
//! `name`.

use dashmap::DashMap;

/// Map a requested property name to its template field, if any.
pub fn template_field_for(key: &str) -> Option<&'static str> {
    Some(match key {
        // Codename (must be before the 'name' check)
        k if k.ends_with("version.codename") => "CODENAME",
        k if k.ends_with("fingerprint") => "FINGERPRINT",
        k if k.ends_with("security_patch") => "SECURITY_PATCH",
        k if k.ends_with("model") => "MODEL",
        k if k.ends_with("brand") => "BRAND",
        k if k.ends_with("manufacturer") => "MANUFACTURER",
        k if k.ends_with("device") => "DEVICE",
        k if k.ends_with("product") || k.ends_with("name") => "PRODUCT",
        k if k.ends_with("build.id") => "ID",
        k if k.ends_with("display.id") => "DISPLAY",
        k if k.ends_with("version.release") || k.ends_with("version.release_or_codename") => {
            "RELEASE"
        }
        k if k.ends_with("version.incremental") => "INCREMENTAL",
        k if k.ends_with("build.type") => "TYPE",
        k if k.ends_with("build.tags") => "TAGS",
        k if k.ends_with("bootloader") => "BOOTLOADER",
        k if k.ends_with("board") || k.ends_with("platform") => "BOARD",
        k if k.ends_with("hardware") => "HARDWARE",
        k if k.ends_with("host") => "HOST",
        k if k.ends_with("user") => "USER",
        k if k.ends_with("date.utc") => "TIMESTAMP",
        k if k.ends_with("version.sdk") => "SDK_INT",
        k if k.ends_with("preview_sdk") => "PREVIEW_SDK",
        _ => return None,
    })
}

/// Memoized suffix lookups; property access is high frequency and the
/// suffix scan is ~20 string comparisons.
#[derive(Default)]
pub struct SuffixMap {
    cache: DashMap<String, Option<&'static str>>,
}

impl SuffixMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &str) -> Option<&'static str> {
        if let Some(cached) = self.cache.get(key) {
            return *cached;
        }
        let computed = template_field_for(key);
        self.cache.insert(key.to_string(), computed);
        computed
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
