//! Client configuration.
//!
//! The only setting is the server base URL, resolved once at startup from the
//! `GRABDOCS_API_URL` environment variable, then the config file at
//! `~/.config/grabdocs/config.json`, then the built-in default.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "grabdocs";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const BASE_URL_ENV: &str = "GRABDOCS_API_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub base_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for rolling log files.
    pub fn log_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join("logs"))
    }

    /// Base URL to talk to. A `.env` file is honoured if present.
    pub fn resolve_base_url(&self) -> String {
        let _ = dotenvy::dotenv();
        pick_base_url(std::env::var(BASE_URL_ENV).ok(), self.base_url.as_deref())
    }
}

fn pick_base_url(env: Option<String>, configured: Option<&str>) -> String {
    let chosen = env
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .or_else(|| configured.map(str::trim).filter(|url| !url.is_empty()))
        .unwrap_or(DEFAULT_BASE_URL);
    chosen.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_base_url_precedence() {
        assert_eq!(pick_base_url(None, None), DEFAULT_BASE_URL);
        assert_eq!(pick_base_url(None, Some("https://docs.example.com/")), "https://docs.example.com");
        assert_eq!(
            pick_base_url(Some("http://10.0.0.2:5000".into()), Some("https://docs.example.com")),
            "http://10.0.0.2:5000"
        );
        assert_eq!(pick_base_url(Some("  ".into()), Some("https://a.test")), "https://a.test");
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config { base_url: Some("https://docs.example.com".into()) };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
