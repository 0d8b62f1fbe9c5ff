//! Deck configuration loading and config file resolution
//!
//! The engine itself takes everything it needs through constructor
//! arguments; this module is for hosts (the rig, a control UI) that want a
//! single place to configure their decks. Resolution priority:
//!
//! 1. Command-line argument (highest priority)
//! 2. `WAXWHEEL_CONFIG` environment variable
//! 3. Platform config file (`~/.config/waxwheel/config.toml`, then
//!    `/etc/waxwheel/config.toml` on Linux)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable consulted when no CLI path is given.
pub const CONFIG_ENV_VAR: &str = "WAXWHEEL_CONFIG";

fn default_deck_count() -> usize {
    2
}

/// Host-facing engine configuration.
///
/// Core buffer geometry is compile-time (see [`crate::params`]); this
/// covers the runtime knobs a host wires into the engine at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Path to the importer executable handed to every deck.
    pub importer: PathBuf,

    /// Number of decks the host should create.
    #[serde(default = "default_deck_count")]
    pub decks: usize,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(
            "loaded config from {}: importer={}, decks={}",
            path.display(),
            config.importer.display(),
            config.decks
        );
        Ok(config)
    }

    /// Check field ranges without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.importer.as_os_str().is_empty() {
            return Err(Error::Config("importer path is empty".to_string()));
        }
        if self.decks == 0 || self.decks > 8 {
            return Err(Error::Config(format!(
                "deck count {} outside supported range 1..=8",
                self.decks
            )));
        }
        Ok(())
    }
}

/// Resolve the configuration file path.
///
/// Follows the CLI / environment / platform-default priority order. Returns
/// an error only when no candidate exists on disk.
pub fn resolve_config_path(cli_arg: Option<&str>) -> Result<PathBuf> {
    // Priority 1: command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: platform config locations
    if let Some(path) = dirs::config_dir().map(|d| d.join("waxwheel").join("config.toml")) {
        if path.exists() {
            return Ok(path);
        }
    }
    let system_config = PathBuf::from("/etc/waxwheel/config.toml");
    if system_config.exists() {
        return Ok(system_config);
    }

    Err(Error::Config("no config file found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "importer = \"/usr/libexec/waxwheel-import\"\ndecks = 3\n");

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.importer, PathBuf::from("/usr/libexec/waxwheel-import"));
        assert_eq!(config.decks, 3);
    }

    #[test]
    fn deck_count_defaults_to_two() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "importer = \"/usr/bin/import\"\n");

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.decks, 2);
    }

    #[test]
    fn rejects_zero_decks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "importer = \"/usr/bin/import\"\ndecks = 0\n");

        assert!(matches!(EngineConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_missing_importer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "decks = 2\n");

        assert!(EngineConfig::load(&path).is_err());
    }

    #[test]
    fn cli_argument_wins() {
        let path = resolve_config_path(Some("/tmp/custom.toml")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/custom.toml"));
    }
}
