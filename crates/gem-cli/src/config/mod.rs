//! CLI configuration management.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// CLI configuration, persisted as `config.toml` next to the data
/// directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default output format.
    pub output_format: Option<OutputFormat>,

    /// Explicit data directory override; falls back to the platform
    /// project directory when unset.
    pub data_dir: Option<PathBuf>,

    /// Proxy every scheme through this `host:port` Gemini server.
    pub proxy: Option<String>,

    /// Show helpful tips after commands.
    #[serde(default = "default_true")]
    pub show_tips: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("org", "gem-browser", "gem")
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
    }

    /// Get the config file path.
    pub fn path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// The profile directory holding every persisted store, honoring
    /// an explicit override in the config file.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Load configuration from file, or return defaults if absent.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_override_wins_over_project_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        assert_eq!(config.data_dir().unwrap(), dir.path());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert!(parsed.show_tips);
        assert!(parsed.output_format.is_none());
    }
}
