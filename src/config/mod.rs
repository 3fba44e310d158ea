pub mod schema;

pub use schema::TradedeskConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default tradedesk home directory (~/.tradedesk).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".tradedesk"))
        .unwrap_or_else(|| PathBuf::from(".tradedesk"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<TradedeskConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read tradedesk config file")?;
        let config: TradedeskConfig =
            toml::from_str(&contents).context("Failed to parse tradedesk config (TOML)")?;
        Ok(config)
    } else {
        Ok(TradedeskConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &TradedeskConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}
