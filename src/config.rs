//! # Configuration Module
//!
//! Data directory layout and the settings the catalog runs with.
//!
//! ## Data Storage
//!
//! The playlist database and the optional `config.json` live in the
//! platform-standard data directory:
//! - Linux: `~/.local/share/muse-catalog/`
//! - macOS: `~/Library/Application Support/muse-catalog/`
//! - Windows: `%APPDATA%\muse-catalog\`
//!
//! ## Precedence
//!
//! Command-line flags override `config.json`, which overrides the defaults.

use crate::repository::StalePolicy;
use anyhow::{Context, Result};
use log::debug;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "muse-catalog";
const STORE_FILE: &str = "playlists.db";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_INDEX_FILE: &str = "media.db";

/// Returns the platform-appropriate data directory, creating it if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The `muse-catalog` subdirectory cannot be created due to permissions
///
/// # Examples
///
/// ```no_run
/// use muse_catalog::config::get_data_dir;
///
/// let dir = get_data_dir()?;
/// println!("Catalog data lives in {}", dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create catalog data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Path of the playlist database inside [`get_data_dir`].
pub fn get_store_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(STORE_FILE))
}

/// Path of the optional `config.json` inside [`get_data_dir`].
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(CONFIG_FILE))
}

/// Settings the catalog runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Media index to read tracks from (`SQLite`, or JSON by extension).
    pub index_path: PathBuf,
    /// Playlist database.
    pub store_path: PathBuf,
    pub stale_policy: StalePolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_default();
        Self {
            index_path: data_dir.join(DEFAULT_INDEX_FILE),
            store_path: data_dir.join(STORE_FILE),
            stale_policy: StalePolicy::default(),
        }
    }
}

impl CatalogConfig {
    /// Loads `config.json` from the data directory, or defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    /// Loads the configuration at `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Configuration {} is not valid JSON", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        config.absolutized()
    }

    /// Applies command-line overrides on top of this configuration.
    pub fn with_overrides(
        mut self,
        index_path: Option<PathBuf>,
        store_path: Option<PathBuf>,
        stale_policy: Option<StalePolicy>,
    ) -> Result<Self> {
        if let Some(path) = index_path {
            self.index_path = path;
        }
        if let Some(path) = store_path {
            self.store_path = path;
        }
        if let Some(policy) = stale_policy {
            self.stale_policy = policy;
        }
        self.absolutized()
    }

    /// Writes this configuration to `path` as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to encode configuration")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write configuration {}", path.display()))
    }

    fn absolutized(mut self) -> Result<Self> {
        self.index_path = absolutize(&self.index_path)?;
        self.store_path = absolutize(&self.store_path)?;
        Ok(self)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .with_context(|| format!("Cannot resolve path {}", path.display()))?
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = CatalogConfig::load_from(&dir.path().join("config.json"))?;
        assert_eq!(config, CatalogConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "stale_policy": "block" }"#)?;

        let config = CatalogConfig::load_from(&path)?;
        assert_eq!(config.stale_policy, StalePolicy::Block);
        assert_eq!(config.store_path.file_name().unwrap(), STORE_FILE);
        Ok(())
    }

    #[test]
    fn test_overrides_win_and_are_absolute() -> Result<()> {
        let config = CatalogConfig::default().with_overrides(
            Some(PathBuf::from("index.json")),
            None,
            Some(StalePolicy::Block),
        )?;
        assert!(config.index_path.is_absolute());
        assert!(config.index_path.ends_with("index.json"));
        assert_eq!(config.stale_policy, StalePolicy::Block);
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        let config = CatalogConfig {
            index_path: dir.path().join("media.db"),
            store_path: dir.path().join("lists.db"),
            stale_policy: StalePolicy::Block,
        };
        config.save_to(&path)?;
        assert_eq!(CatalogConfig::load_from(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(&path, "stale_policy = block")?;
        assert!(CatalogConfig::load_from(&path).is_err());
        Ok(())
    }
}
