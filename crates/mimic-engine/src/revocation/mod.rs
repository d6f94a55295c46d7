//! Revocation feed parsing and key-material verification.
//!
//! The external feed is a JSON document `{"entries": {"<key>": ...}}` whose
//! key encoding is ambiguous: a key may be a decimal certificate serial or
//! a hexadecimal key-identifier digest. The parser deliberately admits both
//! readings of an ambiguous key (dual inclusion): a false positive against
//! an unrelated certificate is accepted in exchange for never silently
//! missing a banned key identifier. Do not "fix" this toward a single
//! canonical interpretation.
//!
//! Feed unavailability is a distinct outcome (`None` / `Error` status) and
//! must never be treated as "nothing revoked".

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use md5::Md5;
use num_bigint::BigInt;
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use mimic_core::{MimicError, Result};

use crate::obs::EngineMetrics;

/// Normalized set of lowercase hexadecimal identifiers considered banned.
///
/// Rebuilt from scratch on every successful fetch; never merged with a
/// previous set.
pub type RevocationSet = HashSet<String>;

/// Digest lengths recognized as "looks like a hash, keep the literal":
/// MD5, SHA-1, SHA-256.
const HASH_LENGTHS: [usize; 3] = [32, 40, 64];

/// Legacy single keybox at the top of the config dir.
pub const LEGACY_KEYBOX_FILE: &str = "keybox.xml";
/// Directory of additional keybox files, walked recursively.
pub const KEYBOX_DIR: &str = "keyboxes";

// ---- certificate model (parsing itself is an external collaborator) -----

/// The two attributes of a chain element the revocation check needs.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Certificate serial number (arbitrary precision).
    pub serial: BigInt,
    /// DER-encoded public key.
    pub public_key: Vec<u8>,
}

/// One parsed credential: an alias plus its certificate chain.
#[derive(Debug, Clone)]
pub struct Keybox {
    pub alias: String,
    pub certificates: Vec<CertificateInfo>,
}

/// Chain extraction seam; the certificate subsystem lives outside this
/// engine.
pub trait KeyboxParser: Send + Sync {
    fn parse(&self, content: &str) -> Result<Vec<Keybox>>;
}

// ---- feed fetch ----------------------------------------------------------

/// Feed transport seam. `None` means "verification unavailable", not
/// "nothing revoked".
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self) -> Option<RevocationSet>;
}

/// Default HTTP fetcher with bounded timeouts.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedFetcher {
    pub fn from_settings(settings: &crate::settings::RevocationSection) -> Result<Self> {
        Self::new(
            settings.feed_url.clone(),
            Duration::from_millis(settings.timeout_ms),
        )
    }

    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| MimicError::Internal(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self) -> Option<RevocationSet> {
        let resp = match self
            .client
            .get(&self.url)
            .header("Cache-Control", "no-cache")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "revocation feed fetch failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            tracing::error!(status = %resp.status(), "revocation feed returned non-success");
            return None;
        }

        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "revocation feed body read failed");
                return None;
            }
        };

        match parse_feed(&body) {
            Ok(set) => Some(set),
            Err(e) => {
                tracing::error!(error = %e, "revocation feed parse failed");
                None
            }
        }
    }
}

// ---- feed parsing --------------------------------------------------------

/// Parse the feed document into a revocation set.
///
/// Per entry key: a syntactic decimal serial contributes its lowercase hex
/// form (plus zero-padded variants at the recognized digest widths, since
/// the conversion strips leading zeros a digest would carry); a
/// digest-length hex literal is kept verbatim regardless of the decimal
/// reading; a leading-zero key is never decimal and is re-emitted as
/// unpadded hex instead. Keys matching nothing are logged and skipped.
pub fn parse_feed(body: &str) -> Result<RevocationSet> {
    let doc: serde_json::Value =
        serde_json::from_str(body).map_err(|e| MimicError::Feed(format!("invalid json: {e}")))?;
    let entries = doc
        .get("entries")
        .and_then(|v| v.as_object())
        .ok_or_else(|| MimicError::Feed("missing 'entries' object".into()))?;

    let mut set = RevocationSet::new();
    for key in entries.keys() {
        collect_entry(key, &mut set);
    }
    Ok(set)
}

fn collect_entry(key: &str, set: &mut RevocationSet) {
    let mut added = false;

    if is_plain_decimal(key) {
        if let Ok(n) = key.parse::<BigInt>() {
            let hex = n.to_str_radix(16);
            if !hex.starts_with('-') {
                for width in HASH_LENGTHS {
                    if hex.len() < width {
                        set.insert(format!("{hex:0>width$}"));
                    }
                }
            }
            set.insert(hex);
            added = true;
        }
    }

    // Dual inclusion: a digest-length hex literal stays in verbatim even
    // when the decimal reading above already applied.
    if HASH_LENGTHS.contains(&key.len()) && is_hex(key) {
        set.insert(key.to_ascii_lowercase());
    }

    if !added && is_hex(key) {
        if let Some(n) = BigInt::parse_bytes(key.as_bytes(), 16) {
            set.insert(n.to_str_radix(16));
            added = true;
        }
    }

    if !added {
        tracing::warn!(key, "unparseable revocation feed key");
    }
}

/// Decimal per the feed's convention: optional sign, digits only, no
/// leading zero unless the value is exactly zero.
fn is_plain_decimal(key: &str) -> bool {
    let digits = key.strip_prefix('-').unwrap_or(key);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    digits == "0" || !digits.starts_with('0')
}

fn is_hex(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---- certificate checks --------------------------------------------------

fn digest_hex<D: Digest>(data: &[u8]) -> String {
    hex::encode(D::digest(data))
}

/// A certificate is revoked when its serial (unpadded lowercase hex) or any
/// recognized digest of its public key (full-width lowercase hex) is in the
/// set. Absence of both is "not revoked", not "unknown".
pub fn is_revoked(cert: &CertificateInfo, revoked: &RevocationSet) -> bool {
    if revoked.contains(&cert.serial.to_str_radix(16)) {
        return true;
    }
    let key = cert.public_key.as_slice();
    revoked.contains(&digest_hex::<Sha1>(key))
        || revoked.contains(&digest_hex::<Sha256>(key))
        || revoked.contains(&digest_hex::<Md5>(key))
}

// ---- directory verification ---------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboxStatus {
    /// Parses and no chain element is revoked.
    Valid,
    /// Some chain element matches the revocation set.
    Revoked,
    /// Fails to parse or contains no credentials.
    Invalid,
    /// Feed unavailable or the file could not be processed.
    Error,
}

#[derive(Debug, Clone)]
pub struct KeyboxCheck {
    pub filename: String,
    pub status: KeyboxStatus,
    pub details: String,
}

/// Check every candidate credential file under `config_dir` against the
/// revocation set: the legacy top-level file plus every `.xml` under the
/// keybox directory, recursively. One file's failure never suppresses the
/// results for the others.
pub fn verify(
    config_dir: &Path,
    parser: &dyn KeyboxParser,
    revoked: Option<&RevocationSet>,
) -> Vec<KeyboxCheck> {
    let Some(revoked) = revoked else {
        return vec![KeyboxCheck {
            filename: "global".into(),
            status: KeyboxStatus::Error,
            details: "revocation feed unavailable".into(),
        }];
    };

    if !config_dir.is_dir() {
        return vec![KeyboxCheck {
            filename: "global".into(),
            status: KeyboxStatus::Error,
            details: "config directory not found".into(),
        }];
    }

    let mut results = Vec::new();

    let legacy = config_dir.join(LEGACY_KEYBOX_FILE);
    if legacy.exists() {
        results.push(check_file(&legacy, parser, revoked));
    }

    let keybox_dir = config_dir.join(KEYBOX_DIR);
    if keybox_dir.is_dir() {
        let mut files = Vec::new();
        collect_xml_files(&keybox_dir, &mut files);
        for file in files {
            results.push(check_file(&file, parser, revoked));
        }
    }

    results
}

fn collect_xml_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_xml_files(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("xml") {
            out.push(path);
        }
    }
}

fn check_file(path: &Path, parser: &dyn KeyboxParser, revoked: &RevocationSet) -> KeyboxCheck {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return KeyboxCheck {
                filename,
                status: KeyboxStatus::Error,
                details: format!("read failed: {e}"),
            }
        }
    };

    let keyboxes = match parser.parse(&content) {
        Ok(k) => k,
        Err(e) => {
            return KeyboxCheck {
                filename,
                status: KeyboxStatus::Error,
                details: format!("parse failed: {e}"),
            }
        }
    };

    if keyboxes.is_empty() {
        return KeyboxCheck {
            filename,
            status: KeyboxStatus::Invalid,
            details: "no credentials found".into(),
        };
    }

    for kb in &keyboxes {
        for cert in &kb.certificates {
            if is_revoked(cert, revoked) {
                return KeyboxCheck {
                    filename,
                    status: KeyboxStatus::Revoked,
                    details: format!(
                        "certificate with serial {} is revoked",
                        cert.serial.to_str_radix(16)
                    ),
                };
            }
        }
    }

    KeyboxCheck {
        filename,
        status: KeyboxStatus::Valid,
        details: format!("active ({} keys)", keyboxes.len()),
    }
}

// ---- checker -------------------------------------------------------------

/// Periodic feed consumer plus directory verification entry point.
///
/// Holds the latest successfully fetched set; a failed refresh keeps the
/// stale set in place (stale-but-available beats mixing old and new
/// policy).
pub struct RevocationChecker {
    fetcher: Arc<dyn FeedFetcher>,
    parser: Arc<dyn KeyboxParser>,
    current: RwLock<Option<Arc<RevocationSet>>>,
    metrics: Arc<EngineMetrics>,
}

impl RevocationChecker {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        parser: Arc<dyn KeyboxParser>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            current: RwLock::new(None),
            metrics,
        }
    }

    /// Fetch and publish a fresh set. Returns whether the fetch succeeded.
    pub async fn refresh(&self) -> bool {
        match self.fetcher.fetch().await {
            Some(set) => {
                self.metrics.feed_fetches.inc(&[("outcome", "ok")]);
                *self.current.write() = Some(Arc::new(set));
                true
            }
            None => {
                self.metrics.feed_fetches.inc(&[("outcome", "error")]);
                false
            }
        }
    }

    /// Latest successfully fetched set, if any.
    pub fn current(&self) -> Option<Arc<RevocationSet>> {
        self.current.read().clone()
    }

    /// Verify every credential file under `config_dir` against a fresh
    /// fetch.
    pub async fn verify_directory(&self, config_dir: &Path) -> Vec<KeyboxCheck> {
        let set = self.fetcher.fetch().await;
        self.metrics.feed_fetches.inc(&[(
            "outcome",
            if set.is_some() { "ok" } else { "error" },
        )]);
        verify(config_dir, self.parser.as_ref(), set.as_ref())
    }

    /// Refresh on a fixed schedule until the handle is dropped or aborted.
    pub fn spawn_periodic(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                this.refresh().await;
            }
        })
    }
}
