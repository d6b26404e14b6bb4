//! User defaults for the CLI

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use manager_lib::ManagerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults read from `~/.config/tsm/config.json`; flags win over these
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Manager configuration file
    pub config_path: Option<PathBuf>,
    /// Compose file to work on
    pub compose_file: Option<PathBuf>,
    /// Where `generate` writes the routing document
    pub output_directory: Option<PathBuf>,
    /// Default output format
    pub default_format: Option<OutputFormat>,
}

impl Config {
    /// Load the user defaults; a missing file yields empty defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("tsm").join("config.json"))
    }
}

/// Values from flags, layered over user defaults
#[derive(Debug, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub compose_file: Option<PathBuf>,
    pub format: Option<OutputFormat>,
}

/// Everything a command needs to run
#[derive(Debug, Clone)]
pub struct Settings {
    pub manager: ManagerConfig,
    pub format: OutputFormat,
    pub output_directory: Option<PathBuf>,
}

impl Settings {
    /// Resolve flags, then user defaults, then the manager configuration
    pub fn resolve(defaults: Config, overrides: Overrides) -> Result<Self> {
        let config_path = overrides.config_path.or(defaults.config_path);
        let mut manager = ManagerConfig::load(config_path.as_deref())
            .context("Failed to load manager configuration")?;

        if let Some(compose_file) = overrides.compose_file.or(defaults.compose_file) {
            manager.compose_file = compose_file;
        }

        Ok(Self {
            manager,
            format: overrides
                .format
                .or(defaults.default_format)
                .unwrap_or_default(),
            output_directory: defaults.output_directory,
        })
    }
}
