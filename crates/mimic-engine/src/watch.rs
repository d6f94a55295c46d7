//! File-change notification seam.
//!
//! The engine reacts to a callback invocation and stays agnostic to the
//! underlying notification mechanism. [`NotifyWatcher`] uses OS file-system
//! events; [`PollWatcher`] falls back to mtime polling for filesystems
//! without event support.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use mimic_core::{MimicError, Result};

/// Invoked with the changed path. Must be fast and non-blocking; heavy
/// reload work belongs on the reload task.
pub type ChangeCallback = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Injectable "watch this path" capability.
pub trait PathWatcher: Send + Sync {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<()>;
}

/// OS event-based watcher with per-path debouncing.
pub struct NotifyWatcher {
    debounce: Duration,
    // Keep the underlying watchers alive for the engine's lifetime.
    watchers: Mutex<Vec<notify::RecommendedWatcher>>,
}

impl NotifyWatcher {
    pub fn from_settings(settings: &crate::settings::WatchSection) -> Self {
        Self::new(Duration::from_millis(settings.debounce_ms))
    }

    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            watchers: Mutex::new(Vec::new()),
        }
    }
}

impl PathWatcher for NotifyWatcher {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<()> {
        let debounce = self.debounce;
        let last_seen: Mutex<HashMap<PathBuf, Instant>> = Mutex::new(HashMap::new());

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| {
                let Ok(event) = res else { return };
                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
                    _ => return,
                }
                let Some(changed) = event.paths.first().cloned() else {
                    return;
                };

                let now = Instant::now();
                {
                    let mut seen = last_seen.lock();
                    if let Some(prev) = seen.get(&changed) {
                        if now.duration_since(*prev) < debounce {
                            return;
                        }
                    }
                    seen.insert(changed.clone(), now);
                }

                on_change(changed);
            },
        )
        .map_err(|e| MimicError::Io(format!("create watcher failed: {e}")))?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| MimicError::Io(format!("watch {} failed: {e}", path.display())))?;

        self.watchers.lock().push(watcher);
        Ok(())
    }
}

/// Polling fallback: compares mtimes on a fixed interval.
///
/// Requires a running tokio runtime at `watch` time.
pub struct PollWatcher {
    interval: Duration,
}

impl PollWatcher {
    pub fn from_settings(settings: &crate::settings::WatchSection) -> Self {
        Self::new(Duration::from_millis(settings.poll_interval_ms))
    }

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl PathWatcher for PollWatcher {
    fn watch(&self, path: &Path, on_change: ChangeCallback) -> Result<()> {
        let path = path.to_path_buf();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut seen = snapshot_mtimes(&path);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = snapshot_mtimes(&path);

                for (p, mtime) in &current {
                    match seen.get(p) {
                        Some(prev) if prev == mtime => {}
                        _ => on_change(p.clone()),
                    }
                }
                for p in seen.keys() {
                    if !current.contains_key(p) {
                        on_change(p.clone());
                    }
                }

                seen = current;
            }
        });

        Ok(())
    }
}

fn snapshot_mtimes(path: &Path) -> HashMap<PathBuf, SystemTime> {
    let mut out = HashMap::new();
    if path.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                let p = entry.path();
                if !p.is_file() {
                    continue;
                }
                if let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) {
                    out.insert(p, mtime);
                }
            }
        }
    } else if let Ok(mtime) = fs::metadata(path).and_then(|m| m.modified()) {
        out.insert(path.to_path_buf(), mtime);
    }
    out
}
