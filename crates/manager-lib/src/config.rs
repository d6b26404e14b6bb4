//! Manager configuration
//!
//! Built once at process start and handed to discovery, the generator and
//! the autoscaler. Values come from an optional config file layered under
//! `TSM_*` environment variables (`__` separates nested keys, e.g.
//! `TSM_PROMETHEUS__URL`).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Placeholder substituted with the service name in metric query templates
pub const SERVICE_PLACEHOLDER: &str = "{service}";

/// Minimum autoscaler check interval
pub const MIN_CHECK_INTERVAL_SECS: u64 = 10;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Compose file to discover services from
    pub compose_file: PathBuf,
    /// Directory the routing document is written to
    pub output_directory: PathBuf,
    pub generator: GeneratorConfig,
    pub prometheus: PrometheusConfig,
    pub autoscaler: AutoscalerConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            compose_file: PathBuf::from("docker-compose.yml"),
            output_directory: PathBuf::from("config/dynamic"),
            generator: GeneratorConfig::default(),
            prometheus: PrometheusConfig::default(),
            autoscaler: AutoscalerConfig::default(),
        }
    }
}

/// Routing document generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Appended to the service name when synthesizing a default host rule
    pub domain_suffix: String,
    /// Host used for backends when no backend host is configured
    pub external_host: Option<String>,
    /// Host used for every synthesized backend address
    pub default_backend_host: Option<String>,
    /// Force swarm or compose addressing; detected from the runtime when unset
    pub swarm_mode: Option<bool>,
    /// Entry point every HTTP router is attached to
    pub entry_point: String,
    /// Attach a certificate resolver to every HTTP router
    pub tls_enabled: bool,
    pub cert_resolver: String,
    pub health_check: HealthCheckConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            domain_suffix: ".ddev".to_string(),
            external_host: None,
            default_backend_host: None,
            swarm_mode: None,
            entry_point: "websecure".to_string(),
            tls_enabled: false,
            cert_resolver: "letsencrypt".to_string(),
            health_check: HealthCheckConfig::default(),
        }
    }
}

/// Timing attached to generated health checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval: String,
    pub timeout: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

/// Metrics backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub url: String,
    /// Per-query timeout in seconds
    pub timeout_secs: u64,
    /// CPU utilisation query, percent; `{service}` is replaced by the service name
    pub cpu_query: String,
    /// Memory utilisation query, percent; `{service}` is replaced by the service name
    pub memory_query: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            timeout_secs: 30,
            cpu_query: r#"rate(container_cpu_usage_seconds_total{name=~".*{service}.*"}[5m]) * 100"#
                .to_string(),
            memory_query: concat!(
                r#"(container_memory_usage_bytes{name=~".*{service}.*"} / "#,
                r#"container_spec_memory_limit_bytes{name=~".*{service}.*"}) * 100"#
            )
            .to_string(),
        }
    }
}

impl PrometheusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Control loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    pub check_interval_secs: u64,
    /// Log intended scale actions without issuing them
    pub dry_run: bool,
    /// Suppress repeated scaling within a service's cooldown windows; off unless set
    pub respect_cooldowns: bool,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            dry_run: false,
            respect_cooldowns: false,
        }
    }
}

impl AutoscalerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl ManagerConfig {
    /// Load from an optional file plus `TSM_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("TSM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ManagerConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autoscaler.check_interval_secs < MIN_CHECK_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "autoscaler.check_interval_secs must be >= {} (got {})",
                MIN_CHECK_INTERVAL_SECS, self.autoscaler.check_interval_secs
            )));
        }

        if self.prometheus.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "prometheus.timeout_secs must be >= 1".to_string(),
            ));
        }

        url::Url::parse(&self.prometheus.url).map_err(|e| {
            ConfigError::Invalid(format!("prometheus.url '{}': {}", self.prometheus.url, e))
        })?;

        for (name, value) in [
            ("generator.health_check.interval", &self.generator.health_check.interval),
            ("generator.health_check.timeout", &self.generator.health_check.timeout),
        ] {
            if !is_duration_literal(value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must look like 30s, 5m or 1h (got '{}')",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

/// `<digits><s|m|h>`
fn is_duration_literal(value: &str) -> bool {
    match value.char_indices().last() {
        Some((idx, unit)) if matches!(unit, 's' | 'm' | 'h') && idx > 0 => {
            value[..idx].chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generator.entry_point, "websecure");
        assert_eq!(config.autoscaler.check_interval(), Duration::from_secs(60));
        assert!(!config.autoscaler.respect_cooldowns);
        assert!(config.prometheus.cpu_query.contains(SERVICE_PLACEHOLDER));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            r#"
compose_file: stack.yml
generator:
  domain_suffix: .local
  swarm_mode: true
autoscaler:
  check_interval_secs: 15
  dry_run: true
  respect_cooldowns: true
"#
        )
        .unwrap();

        let config = ManagerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.compose_file, PathBuf::from("stack.yml"));
        assert_eq!(config.generator.domain_suffix, ".local");
        assert_eq!(config.generator.swarm_mode, Some(true));
        assert_eq!(config.generator.entry_point, "websecure");
        assert_eq!(config.autoscaler.check_interval_secs, 15);
        assert!(config.autoscaler.dry_run);
        assert!(config.autoscaler.respect_cooldowns);
    }

    #[test]
    fn test_validate_rejects_short_interval() {
        let mut config = ManagerConfig::default();
        config.autoscaler.check_interval_secs = 5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_url_and_durations() {
        let mut config = ManagerConfig::default();
        config.prometheus.url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = ManagerConfig::default();
        config.generator.health_check.timeout = "five".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_literal() {
        assert!(is_duration_literal("30s"));
        assert!(is_duration_literal("1h"));
        assert!(!is_duration_literal("s"));
        assert!(!is_duration_literal("10"));
        assert!(!is_duration_literal("1.5m"));
    }
}
