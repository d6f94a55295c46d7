use std::path::PathBuf;

use serde::Deserialize;

use mimic_core::{MimicError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    pub version: u32,

    /// Directory holding the rule, override, template, and patch files.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    #[serde(default)]
    pub principals: PrincipalSection,

    #[serde(default)]
    pub patches: PatchSection,

    #[serde(default)]
    pub revocation: RevocationSection,

    #[serde(default)]
    pub watch: WatchSection,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MimicError::Config(format!(
                "unsupported settings version: {}",
                self.version
            )));
        }
        self.principals.validate()?;
        self.patches.validate()?;
        self.revocation.validate()?;
        self.watch.validate()?;
        Ok(())
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            version: 1,
            config_dir: default_config_dir(),
            principals: PrincipalSection::default(),
            patches: PatchSection::default(),
            revocation: RevocationSection::default(),
            watch: WatchSection::default(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/data/adb/mimic")
}

/// Caller-to-principal cache tuning.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalSection {
    #[serde(default = "default_principal_ttl_ms")]
    pub ttl_ms: u64,

    #[serde(default = "default_principal_capacity")]
    pub capacity: usize,
}

impl PrincipalSection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=3_600_000).contains(&self.ttl_ms) {
            return Err(MimicError::Config(
                "principals.ttl_ms must be between 1000 and 3600000".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(MimicError::Config("principals.capacity must be >= 1".into()));
        }
        Ok(())
    }
}

impl Default for PrincipalSection {
    fn default() -> Self {
        Self {
            ttl_ms: default_principal_ttl_ms(),
            capacity: default_principal_capacity(),
        }
    }
}

fn default_principal_ttl_ms() -> u64 {
    60_000
}
fn default_principal_capacity() -> usize {
    200
}

/// Dynamic patch-level memoization tuning.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchSection {
    #[serde(default = "default_patch_memo_ttl_ms")]
    pub memo_ttl_ms: u64,
}

impl PatchSection {
    pub fn validate(&self) -> Result<()> {
        if self.memo_ttl_ms < 1000 {
            return Err(MimicError::Config(
                "patches.memo_ttl_ms must be >= 1000".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PatchSection {
    fn default() -> Self {
        Self {
            memo_ttl_ms: default_patch_memo_ttl_ms(),
        }
    }
}

fn default_patch_memo_ttl_ms() -> u64 {
    3_600_000
}

/// Revocation feed endpoint and timeouts.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevocationSection {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    #[serde(default = "default_feed_timeout_ms")]
    pub timeout_ms: u64,
}

impl RevocationSection {
    pub fn validate(&self) -> Result<()> {
        if self.feed_url.is_empty() {
            return Err(MimicError::Config("revocation.feed_url must not be empty".into()));
        }
        if !(1000..=120_000).contains(&self.timeout_ms) {
            return Err(MimicError::Config(
                "revocation.timeout_ms must be between 1000 and 120000".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RevocationSection {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            timeout_ms: default_feed_timeout_ms(),
        }
    }
}

fn default_feed_url() -> String {
    "https://android.googleapis.com/attestation/status".into()
}
fn default_feed_timeout_ms() -> u64 {
    10_000
}

/// File-change watcher tuning.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatchSection {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms < 100 {
            return Err(MimicError::Config(
                "watch.poll_interval_ms must be >= 100".into(),
            ));
        }
        Ok(())
    }
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    5_000
}
