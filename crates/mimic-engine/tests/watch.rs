#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::timeout;

use mimic_core::{CallerId, Result};
use mimic_engine::principals::{Clock, PrincipalSource};
use mimic_engine::revocation::{FeedFetcher, Keybox, KeyboxParser, RevocationSet};
use mimic_engine::service::{SpoofService, RULES_FILE};
use mimic_engine::settings::EngineSettings;
use mimic_engine::watch::{ChangeCallback, NotifyWatcher, PathWatcher, PollWatcher};

#[tokio::test(flavor = "multi_thread")]
async fn poll_watcher_reports_new_and_changed_files() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), "one").unwrap();

    let watcher = PollWatcher::new(Duration::from_millis(50));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<PathBuf>();
    let callback: ChangeCallback = Arc::new(move |p| {
        let _ = tx.send(p);
    });
    watcher.watch(dir.path(), callback).unwrap();

    // Let the initial snapshot settle before mutating.
    tokio::time::sleep(Duration::from_millis(150)).await;
    fs::write(dir.path().join("b.txt"), "new file").unwrap();

    let changed = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("poll watcher must report the new file")
        .unwrap();
    assert_eq!(changed.file_name().and_then(|n| n.to_str()), Some("b.txt"));
}

#[test]
fn notify_watcher_accepts_paths() {
    let dir = TempDir::new().unwrap();
    let watcher = NotifyWatcher::new(Duration::from_millis(100));
    let callback: ChangeCallback = Arc::new(|_| {});
    watcher.watch(dir.path(), callback).unwrap();

    assert!(watcher
        .watch(std::path::Path::new("/definitely/not/here"), Arc::new(|_| {}))
        .is_err());
}

// ---- end-to-end reload over the watcher seam ----------------------------

struct StubClock(AtomicI64);

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

struct NullFetcher;

#[async_trait]
impl FeedFetcher for NullFetcher {
    async fn fetch(&self) -> Option<RevocationSet> {
        None
    }
}

struct NullParser;

impl KeyboxParser for NullParser {
    fn parse(&self, _content: &str) -> Result<Vec<Keybox>> {
        Ok(Vec::new())
    }
}

const GAME: CallerId = 1001;

#[tokio::test(flavor = "multi_thread")]
async fn service_reloads_via_poll_watcher() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join(RULES_FILE);
    fs::write(&rules, "nobody.at.all\n").unwrap();

    let settings = EngineSettings {
        config_dir: dir.path().to_path_buf(),
        ..EngineSettings::default()
    };
    let source = Arc::new(MapSource(HashMap::from([(
        GAME,
        vec!["com.game.example".to_string()],
    )])));
    let service = Arc::new(SpoofService::new(
        &settings,
        Arc::new(StubClock(AtomicI64::new(0))),
        source,
        Arc::new(NullFetcher),
        Arc::new(NullParser),
    ));
    service.initialize();
    assert!(!service.needs_spoof(GAME));

    let watcher = PollWatcher::new(Duration::from_millis(50));
    service.start(&watcher).unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    fs::write(&rules, "com.game.example\n").unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if service.needs_spoof(GAME) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "rule change never propagated through the watcher"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
