//! Caller-to-principal resolution cache.
//!
//! One caller identifier may map to several principal names. The upstream
//! lookup is expensive (an IPC round-trip at the interception boundary), so
//! results are cached in a bounded access-order LRU with a TTL. Two rules
//! are load-bearing here:
//!
//! - a burst of concurrent misses for the same caller performs exactly one
//!   upstream call, and every caller in the burst observes its result;
//! - a failed or empty upstream result is never stored, so the next call
//!   retries unconditionally.

use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use mimic_core::{CallerId, Result};

use crate::obs::EngineMetrics;

/// Injectable millisecond clock. Wall-clock in production, stubbed in
/// tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Default wall-clock source.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// The upstream caller-to-principals lookup, supplied by the platform
/// integration.
pub trait PrincipalSource: Send + Sync {
    fn principals_of(&self, caller: CallerId) -> Result<Vec<String>>;
}

struct CacheEntry {
    principals: Arc<Vec<String>>,
    fetched_at: i64,
}

/// Bounded, TTL'd, single-flight cache over a [`PrincipalSource`].
pub struct PrincipalCache {
    entries: Mutex<LruCache<CallerId, CacheEntry>>,
    in_flight: DashMap<CallerId, Arc<Mutex<()>>>,
    ttl_ms: i64,
    source: Arc<dyn PrincipalSource>,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
}

impl PrincipalCache {
    pub fn new(
        source: Arc<dyn PrincipalSource>,
        clock: Arc<dyn Clock>,
        ttl_ms: u64,
        capacity: usize,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: DashMap::new(),
            ttl_ms: ttl_ms as i64,
            source,
            clock,
            metrics,
        }
    }

    /// Resolve the caller's principals, consulting the cache first.
    ///
    /// Returns an empty list when the upstream lookup fails or yields
    /// nothing; that outcome is not cached.
    pub fn get(&self, caller: CallerId) -> Arc<Vec<String>> {
        if let Some(hit) = self.lookup_fresh(caller) {
            self.metrics.principal_cache_hits.inc(&[]);
            return hit;
        }

        // Coalesce concurrent misses: one guard per caller id. The first
        // thread through performs the lookup; the rest block here and then
        // find the entry it stored.
        let flight = { Arc::clone(self.in_flight.entry(caller).or_default().value()) };
        let _guard = flight.lock();

        if let Some(hit) = self.lookup_fresh(caller) {
            self.metrics.principal_cache_hits.inc(&[]);
            return hit;
        }

        self.metrics.principal_cache_misses.inc(&[]);
        self.metrics.principal_lookups.inc(&[]);

        let result = match self.source.principals_of(caller) {
            Ok(principals) if !principals.is_empty() => {
                let principals = Arc::new(principals);
                let entry = CacheEntry {
                    principals: Arc::clone(&principals),
                    fetched_at: self.clock.now_millis(),
                };
                self.entries.lock().put(caller, entry);
                principals
            }
            Ok(_) => Arc::new(Vec::new()),
            Err(e) => {
                tracing::warn!(caller, error = %e, "principal lookup failed");
                Arc::new(Vec::new())
            }
        };

        self.in_flight.remove(&caller);
        result
    }

    /// Drop every cached entry (testing seam / reset path).
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn lookup_fresh(&self, caller: CallerId) -> Option<Arc<Vec<String>>> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();
        // `get` promotes recency, giving access-order eviction.
        match entries.get(&caller) {
            Some(e) if now - e.fetched_at < self.ttl_ms => Some(Arc::clone(&e.principals)),
            _ => None,
        }
    }
}
