//! Daemon configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Settings owned by the daemon process itself, read from `SCALER_*`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScalerConfig {
    /// Host name reported in structured log events
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Manager configuration file; `TSM_*` variables apply on top of it
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            host_name: default_host_name(),
            api_port: default_api_port(),
            config_path: None,
        }
    }
}

impl ScalerConfig {
    /// Load from `SCALER_*` environment variables
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("SCALER").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Invalid SCALER_* configuration")
    }
}
