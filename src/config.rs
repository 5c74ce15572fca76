use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::paths::paths;

/// Top-level configuration loaded from `config.toml`.
///
/// Every key is optional; a missing file is the same as an empty one.
///
/// Example TOML:
/// ```toml
/// [upgrade]
/// timeout_secs = 10
/// download_timeout_secs = 300
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upgrade: UpgradeSettings,
}

/// The `[upgrade]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpgradeSettings {
    /// Release metadata endpoint.
    pub api_url: String,
    /// Prefix of release download URLs; `/<tag>/<asset>` is appended.
    pub release_base: String,
    /// Timeout for the metadata request.
    pub timeout_secs: u64,
    /// Timeout for the whole archive download.
    pub download_timeout_secs: u64,
    /// How often the download progress line is refreshed.
    pub progress_interval_ms: u64,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com/repos/Dup4/cf-tool/releases/latest".to_string(),
            release_base: "https://github.com/Dup4/cf-tool/releases/download".to_string(),
            timeout_secs: 30,
            download_timeout_secs: 600,
            progress_interval_ms: 1000,
        }
    }
}

impl UpgradeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

/// Load `config.toml` from the tool home.
pub fn load_config() -> Result<Config> {
    let p = paths()?;
    load_config_from(&p.config)
}

/// Load a config file; a missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    toml::from_str(&txt).with_context(|| format!("failed to parse {}", path.display()))
}
