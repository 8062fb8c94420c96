use std::path::{Path, PathBuf};

use anyhow::Result;
use marksync_core::SyncConfig;

const CONFIG_FILE: &str = "config.json";

/// Default config location: `<config dir>/marksync/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("marksync").join(CONFIG_FILE))
}

/// Effective config: the explicit file if given, else the default location
/// if it exists, else built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<SyncConfig> {
    if let Some(path) = explicit {
        return SyncConfig::load(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => SyncConfig::load(&path),
        _ => Ok(SyncConfig::default()),
    }
}
