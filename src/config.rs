use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Runtime configuration, loaded from `config.toml`. Every field has a
/// default so a missing file or a partial file both work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the tier databases. `~` expands.
    pub data_dir: String,
    /// Byte cap for the Primary tier database; 0 disables the cap and
    /// Secondary never receives overflow.
    pub primary_max_bytes: u64,
    /// Largest result snapshot a search session will hold.
    pub superset_cap: usize,
    /// Seconds a rendered result page stays interactive.
    pub result_dwell_secs: u64,
    /// Seconds an empty-result notice stays up.
    pub empty_dwell_secs: u64,
    /// Seconds between session sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "~/.local/share/mediadex".to_string(),
            primary_max_bytes: 0,
            superset_cap: 300,
            result_dwell_secs: 600,
            empty_dwell_secs: 120,
            sweep_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the platform config dir
    /// (`…/mediadex/config.toml`). A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match directories::ProjectDirs::from("", "", "mediadex") {
                Some(dirs) => dirs.config_dir().join("config.toml"),
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let config: Self =
            toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }
}
