#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mimic_core::{CallerId, MimicError, Result};
use mimic_engine::obs::EngineMetrics;
use mimic_engine::principals::{Clock, PrincipalCache, PrincipalSource};

struct StubClock(AtomicI64);

impl StubClock {
    fn at(ms: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(ms)))
    }
    fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for StubClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Upstream stub that counts calls per caller and can simulate latency,
/// failures, and empty results.
struct CountingSource {
    calls: Mutex<HashMap<CallerId, usize>>,
    latency: Duration,
    response: Box<dyn Fn(CallerId) -> Result<Vec<String>> + Send + Sync>,
}

impl CountingSource {
    fn new(
        latency: Duration,
        response: impl Fn(CallerId) -> Result<Vec<String>> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(HashMap::new()),
            latency,
            response: Box::new(response),
        })
    }

    fn calls_for(&self, caller: CallerId) -> usize {
        *self.calls.lock().get(&caller).unwrap_or(&0)
    }
}

impl PrincipalSource for CountingSource {
    fn principals_of(&self, caller: CallerId) -> Result<Vec<String>> {
        *self.calls.lock().entry(caller).or_insert(0) += 1;
        std::thread::sleep(self.latency);
        (self.response)(caller)
    }
}

fn cache_with(
    source: Arc<CountingSource>,
    clock: Arc<StubClock>,
    capacity: usize,
) -> PrincipalCache {
    PrincipalCache::new(
        source,
        clock,
        60_000,
        capacity,
        Arc::new(EngineMetrics::default()),
    )
}

#[test]
fn burst_of_misses_makes_exactly_one_upstream_call() {
    let source = CountingSource::new(Duration::from_millis(150), |_| {
        Ok(vec!["com.example.app".to_string()])
    });
    let clock = StubClock::at(0);
    let cache = Arc::new(cache_with(Arc::clone(&source), clock, 200));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(std::thread::spawn(move || cache.get(42)));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(source.calls_for(42), 1);
    for r in results {
        assert_eq!(*r, vec!["com.example.app".to_string()]);
    }
}

#[test]
fn empty_result_is_never_cached() {
    let source = CountingSource::new(Duration::ZERO, |_| Ok(Vec::new()));
    let clock = StubClock::at(0);
    let cache = cache_with(Arc::clone(&source), clock, 200);

    assert!(cache.get(7).is_empty());
    assert!(cache.get(7).is_empty());
    assert_eq!(source.calls_for(7), 2);
}

#[test]
fn failed_result_is_never_cached() {
    let source = CountingSource::new(Duration::ZERO, |_| {
        Err(MimicError::Internal("lookup unavailable".into()))
    });
    let clock = StubClock::at(0);
    let cache = cache_with(Arc::clone(&source), clock, 200);

    assert!(cache.get(7).is_empty());
    assert!(cache.get(7).is_empty());
    assert_eq!(source.calls_for(7), 2);
}

#[test]
fn fresh_entry_hits_without_upstream_call() {
    let source = CountingSource::new(Duration::ZERO, |_| Ok(vec!["com.a".to_string()]));
    let clock = StubClock::at(1_000);
    let cache = cache_with(Arc::clone(&source), Arc::clone(&clock), 200);

    cache.get(1);
    clock.advance(59_999);
    cache.get(1);
    assert_eq!(source.calls_for(1), 1);
}

#[test]
fn expired_entry_is_refreshed() {
    let source = CountingSource::new(Duration::ZERO, |_| Ok(vec!["com.a".to_string()]));
    let clock = StubClock::at(1_000);
    let cache = cache_with(Arc::clone(&source), Arc::clone(&clock), 200);

    cache.get(1);
    clock.advance(60_000);
    cache.get(1);
    assert_eq!(source.calls_for(1), 2);
}

#[test]
fn lru_evicts_least_recently_used() {
    let source = CountingSource::new(Duration::ZERO, |caller| Ok(vec![format!("app.{caller}")]));
    let clock = StubClock::at(0);
    let cache = cache_with(Arc::clone(&source), clock, 2);

    cache.get(1);
    cache.get(2);
    // Touch 1 so 2 becomes the eviction candidate.
    cache.get(1);
    cache.get(3);

    cache.get(1);
    assert_eq!(source.calls_for(1), 1);
    cache.get(2);
    assert_eq!(source.calls_for(2), 2);
}

#[test]
fn clear_drops_all_entries() {
    let source = CountingSource::new(Duration::ZERO, |_| Ok(vec!["com.a".to_string()]));
    let clock = StubClock::at(0);
    let cache = cache_with(Arc::clone(&source), clock, 200);

    cache.get(1);
    cache.clear();
    cache.get(1);
    assert_eq!(source.calls_for(1), 2);
}
