//! Engine settings loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use mimic_core::{MimicError, Result};

pub use schema::{EngineSettings, PatchSection, PrincipalSection, RevocationSection, WatchSection};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<EngineSettings> {
    let s = fs::read_to_string(path.as_ref())
        .map_err(|e| MimicError::Io(format!("read settings failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<EngineSettings> {
    let settings: EngineSettings =
        serde_yaml::from_str(s).map_err(|e| MimicError::Config(format!("invalid yaml: {e}")))?;
    settings.validate()?;
    Ok(settings)
}
