//! Server Configuration
//!
//! Loaded from `config/server.toml` (or the path in `CUSTOMNPC_CONFIG`).
//! Every key is optional and falls back to the defaults below.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "CUSTOMNPC_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    pub data_dir: PathBuf,
    /// Range within which a player can hand items to an NPC
    pub interact_distance: f64,
    pub buff_duration_secs: u64,
    pub portable_helper_secs: u64,
    pub portable_helper_forbidden_regions: Vec<u16>,
    pub autosave_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 2567,
            database_url: "sqlite:customnpc.db?mode=rwc".to_string(),
            data_dir: PathBuf::from("data"),
            interact_distance: 512.0,
            buff_duration_secs: 7200,
            portable_helper_secs: 600,
            portable_helper_forbidden_regions: vec![249, 163],
            autosave_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load from the environment-selected path, falling back to defaults
    pub fn load() -> Result<Self, String> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        info!("Loaded server config from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("server.toml");
        std::fs::write(&path, "port = 9000\nbuff_duration_secs = 60\n").unwrap();

        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.buff_duration_secs, 60);
        assert_eq!(config.interact_distance, 512.0);
        assert_eq!(config.portable_helper_forbidden_regions, vec![249, 163]);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServerConfig::load_from(Path::new("/nonexistent/server.toml")).unwrap();
        assert_eq!(config.autosave_secs, 30);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("server.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = ServerConfig::load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse"));
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = ServerConfig::load_from(Path::new("config/server.toml")).unwrap();
        assert_eq!(config.port, 2567);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }
}
