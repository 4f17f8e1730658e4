use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error, info};

/// A gcloud CLI configuration (`configurations/config_<name>`).
#[derive(Debug, Deserialize)]
pub struct GcloudConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub core: GcloudCoreConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct GcloudCoreConfig {
    pub account: Option<String>,
    pub project: Option<String>,
}

/// The gcloud configuration directory.
///
///  - `$CLOUDSDK_CONFIG` when set
///  - Linux/Mac: `~/.config/gcloud`
///  - Windows: `%APPDATA%\gcloud`
pub fn gcloud_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(dir));
    }

    #[cfg(target_os = "macos")]
    let dir = dirs::home_dir().map(|dir| dir.join(".config").join("gcloud"));

    #[cfg(not(target_os = "macos"))]
    let dir = dirs::config_dir().map(|dir| dir.join("gcloud"));

    dir
}

/// Discover gcloud configurations under `gcloud_dir`.
///
/// Unreadable or malformed files are logged and skipped.
pub fn discover_gcloud_configs(gcloud_dir: &Path) -> Vec<GcloudConfig> {
    let mut configs = Vec::new();
    let config_dir = gcloud_dir.join("configurations");

    debug!(path = %config_dir.display(), "Searching for gcloud configurations");

    if !config_dir.exists() {
        debug!(path = %config_dir.display(), "gcloud configurations directory does not exist");
        return configs;
    }

    let Ok(entries) = fs::read_dir(&config_dir) else {
        error!(path = %config_dir.display(), "Failed to read gcloud configurations directory");
        return configs;
    };

    for entry in entries.flatten() {
        let path = entry.path();

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let Some(config_name) = file_name.strip_prefix("config_") else {
            continue;
        };

        match fs::read_to_string(&path) {
            Ok(content) => match serini::from_str::<GcloudConfig>(&content) {
                Ok(mut config) => {
                    config.name = config_name.to_string();
                    debug!(name = %config.name, "Discovered gcloud config");
                    configs.push(config);
                }
                Err(err) => {
                    error!(path = %path.display(), %err, "Failed to parse gcloud config file");
                }
            },
            Err(err) => {
                error!(path = %path.display(), %err, "Failed to read gcloud config file");
            }
        }
    }

    configs.sort_by(|a, b| a.name.cmp(&b.name));
    info!(count = configs.len(), "GCP configuration discovery complete");
    configs
}

/// The gcloud state visible to this process.
#[derive(Debug)]
pub struct GcloudEnv {
    /// Configuration directory, see [`gcloud_dir`]
    pub dir: Option<PathBuf>,
    /// `CLOUDSDK_ACTIVE_CONFIG_NAME`
    pub active_config: Option<String>,
}

impl GcloudEnv {
    pub fn from_process() -> Self {
        Self {
            dir: gcloud_dir(),
            active_config: std::env::var("CLOUDSDK_ACTIVE_CONFIG_NAME").ok(),
        }
    }

    pub fn configs(&self) -> Vec<GcloudConfig> {
        self.dir
            .as_deref()
            .map(discover_gcloud_configs)
            .unwrap_or_default()
    }

    /// Name of the configuration gcloud would use right now.
    ///
    /// `CLOUDSDK_ACTIVE_CONFIG_NAME` wins over the `active_config` file;
    /// without either gcloud falls back to `default`.
    pub fn active_config_name(&self) -> String {
        let from_file = || {
            self.dir
                .as_deref()
                .and_then(|dir| fs::read_to_string(dir.join("active_config")).ok())
        };
        self.active_config
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(from_file)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "default".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, name: &str, content: &str) {
        let configurations = dir.join("configurations");
        fs::create_dir_all(&configurations).unwrap();
        fs::write(configurations.join(format!("config_{name}")), content).unwrap();
    }

    #[test]
    fn test_discover_configs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "prod",
            "[core]\naccount = ops@example.com\nproject = prod-project\n\n[compute]\nregion = europe-west4\n",
        );
        write_config(dir.path(), "default", "[core]\naccount = me@example.com\n");
        fs::write(dir.path().join("configurations").join("README"), "ignored").unwrap();

        let configs = discover_gcloud_configs(dir.path());

        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].name, "default");
        assert_eq!(configs[0].core.project, None);
        assert_eq!(configs[1].name, "prod");
        assert_eq!(configs[1].core.project.as_deref(), Some("prod-project"));
    }

    #[test]
    fn test_active_config_name_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = GcloudEnv {
            dir: Some(dir.path().to_path_buf()),
            active_config: None,
        };
        assert_eq!(env.active_config_name(), "default");

        fs::write(dir.path().join("active_config"), "prod\n").unwrap();
        assert_eq!(env.active_config_name(), "prod");

        env.active_config = Some("staging".into());
        assert_eq!(env.active_config_name(), "staging");

        env.active_config = Some("  ".into());
        assert_eq!(env.active_config_name(), "prod");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_gcloud_configs(&dir.path().join("nope")).is_empty());
    }
}
