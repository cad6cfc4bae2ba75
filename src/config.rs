//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Overrides the data directory when set
pub const DATA_DIR_ENV: &str = "MASCOT_DATA_DIR";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Persisted commentary settings
    pub settings_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var("HOME").context("HOME is not set")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("mascot-daemon")
            }
        };
        Ok(Self::in_dir(data_dir))
    }

    /// Lay out every path under `data_dir`
    pub fn in_dir(data_dir: PathBuf) -> Self {
        Self {
            socket_path: data_dir.join("daemon.sock"),
            settings_path: data_dir.join("settings.json"),
            data_dir,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_layout() {
        let config = Config::in_dir(PathBuf::from("/tmp/mascot"));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/mascot/daemon.sock"));
        assert_eq!(config.settings_path, PathBuf::from("/tmp/mascot/settings.json"));
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.ends_with("daemon.sock"));
        assert!(config.settings_path.starts_with(&config.data_dir));
    }
}
