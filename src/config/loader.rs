use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::WrapErr;
use tracing::debug;

use crate::config::AppConfig;

const CONFIG_DIR: &str = "cloudcensus";
const CONFIG_FILE: &str = "config.toml";

fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(CONFIG_DIR))
}

fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Load the config from the default location, falling back to defaults.
pub fn load() -> color_eyre::Result<AppConfig> {
    let Some(path) = config_path() else {
        debug!("No config directory found, using defaults");
        return Ok(AppConfig::default());
    };

    if !path.exists() {
        debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_from(&path)
}

/// Load the config from an explicit path. The file must exist.
pub fn load_from(path: &Path) -> color_eyre::Result<AppConfig> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse config file {}", path.display()))?;
    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}
