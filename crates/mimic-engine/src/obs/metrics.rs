//! Minimal metrics registry for the engine.
//!
//! No external metrics dependency; counters with dynamic labels are backed
//! by `DashMap` and atomics. Labels are flattened into sorted key vectors
//! to keep deterministic ordering. The host scrapes via [`EngineMetrics::render`].

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();

        let counter = self.map.entry(key).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Sum across all label sets.
    pub fn total(&self) -> u64 {
        self.map.iter().map(|r| r.value().load(Ordering::Relaxed)).sum()
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for r in self.map.iter() {
            let key = r.key();
            let val = r.value().load(Ordering::Relaxed);
            let label_str = key
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(out, "{}{{{}}} {}", name, label_str, val);
        }
    }
}

#[derive(Default)]
pub struct EngineMetrics {
    pub principal_cache_hits: CounterVec,
    pub principal_cache_misses: CounterVec,
    pub principal_lookups: CounterVec,
    pub decisions: CounterVec,
    pub reloads: CounterVec,
    pub reload_failures: CounterVec,
    pub feed_fetches: CounterVec,
}

impl EngineMetrics {
    /// Render all registered metrics.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.principal_cache_hits
            .render("mimic_principal_cache_hits_total", &mut out);
        self.principal_cache_misses
            .render("mimic_principal_cache_misses_total", &mut out);
        self.principal_lookups
            .render("mimic_principal_lookups_total", &mut out);
        self.decisions.render("mimic_decisions_total", &mut out);
        self.reloads.render("mimic_reloads_total", &mut out);
        self.reload_failures
            .render("mimic_reload_failures_total", &mut out);
        self.feed_fetches.render("mimic_feed_fetches_total", &mut out);
        out
    }
}
