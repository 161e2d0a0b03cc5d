//! Configuration file support for the oxdrive CLI.
//!
//! Configuration is stored at `~/.config/oxdrive/config.toml` (XDG standard)
//! or `~/Library/Application Support/com.oxidized.oxdrive/config.toml` on macOS.
//! Set `OXDRIVE_CONFIG_DIR` to use another directory.
//!
//! # Example configuration
//!
//! ```toml
//! [defaults]
//! verbosity = 1
//! layout = "network"
//!
//! [drives.work]
//! path = "/home/user/work-drive"
//! ```
//!
//! # Usage
//!
//! ```bash
//! oxdrive ls @work /
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "OXDRIVE_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Default settings applied to all commands
    #[serde(default)]
    pub defaults: Defaults,

    /// Named drives (aliases)
    #[serde(default)]
    pub drives: HashMap<String, DriveAlias>,
}

/// Default settings
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Default verbosity level (0-3)
    pub verbosity: Option<u8>,

    /// Layout for `init` when none is given (local, network)
    pub layout: Option<String>,
}

/// A named drive
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriveAlias {
    /// Directory holding the drive's store and session file
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from the default path, or return empty config if not found.
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn get_drive(&self, alias: &str) -> Option<&DriveAlias> {
        self.drives.get(alias)
    }

    /// All configured aliases, sorted.
    pub fn list_drive_aliases(&self) -> Vec<&String> {
        let mut aliases: Vec<_> = self.drives.keys().collect();
        aliases.sort();
        aliases
    }
}

/// Get the path to the configuration file.
pub fn config_path() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }

    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    #[cfg(target_os = "macos")]
    {
        let config_dir = base_dirs
            .home_dir()
            .join("Library/Application Support/com.oxidized.oxdrive");
        Ok(config_dir.join("config.toml"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        let config_dir = base_dirs.config_dir().join("oxdrive");
        Ok(config_dir.join("config.toml"))
    }
}

/// Resolve a drive path, handling @alias syntax.
pub fn resolve_drive_alias(path_or_alias: &str) -> Result<PathBuf> {
    let Some(alias) = path_or_alias.strip_prefix('@') else {
        return Ok(PathBuf::from(path_or_alias));
    };

    let config = Config::load()?;
    let drive = config.get_drive(alias).ok_or_else(|| {
        let location = config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "~/.config/oxdrive/config.toml".to_string());
        let available = config.list_drive_aliases();
        if available.is_empty() {
            anyhow::anyhow!(
                "Unknown drive alias '@{alias}'.\n\
                 No drive aliases are configured.\n\n\
                 Create a config file at {location} with:\n\n\
                 [drives.{alias}]\n\
                 path = \"/path/to/your/drive\""
            )
        } else {
            anyhow::anyhow!(
                "Unknown drive alias '@{alias}'.\n\n\
                 Available aliases: {}",
                available
                    .iter()
                    .map(|a| format!("@{a}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        }
    })?;

    Ok(drive.path.clone())
}
