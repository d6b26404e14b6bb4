//! Core data models for discovered services

use crate::labels;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// String-keyed label map, ordered lexically by key
pub type Labels = BTreeMap<String, String>;

/// Transport protocol of a published port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unsupported protocol '{}'", other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// Container port declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub internal: u16,
    pub external: Option<u16>,
    pub protocol: Protocol,
}

impl ServicePort {
    pub fn internal(internal: u16) -> Self {
        Self {
            internal,
            external: None,
            protocol: Protocol::Tcp,
        }
    }
}

impl fmt::Display for ServicePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.external {
            Some(external) => write!(f, "{}:{}/{}", external, self.internal, self.protocol),
            None => write!(f, "{}/{}", self.internal, self.protocol),
        }
    }
}

/// Service priority, used to pick a rate-limit tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!(
                "priority must be one of low, medium, high, critical (got '{}')",
                other
            )),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Raw scaling parameters as read from labels, before defaults and validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingParams {
    pub enabled: Option<bool>,
    pub min_replicas: Option<i64>,
    pub max_replicas: Option<i64>,
    pub target_cpu: Option<f64>,
    pub target_memory: Option<f64>,
    pub scale_up_threshold: Option<f64>,
    pub scale_down_threshold: Option<f64>,
    pub scale_up_cooldown: Option<i64>,
    pub scale_down_cooldown: Option<i64>,
    pub priority: Option<String>,
}

pub const DEFAULT_MIN_REPLICAS: u32 = 1;
pub const DEFAULT_MAX_REPLICAS: u32 = 10;
pub const DEFAULT_TARGET_CPU: f64 = 70.0;
pub const DEFAULT_TARGET_MEMORY: f64 = 80.0;
pub const DEFAULT_SCALE_UP_COOLDOWN_SECS: u64 = 300;
pub const DEFAULT_SCALE_DOWN_COOLDOWN_SECS: u64 = 600;

/// Ratio of `target_cpu` used when `scale_down_threshold` is not given
pub const SCALE_DOWN_RATIO: f64 = 0.4;

/// Validated auto-scaling configuration for one service
///
/// Thresholds are resolved once in [`ScalingConfig::from_params`] and never
/// recomputed from `target_cpu` afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingConfig {
    pub enabled: bool,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_cpu: f64,
    pub target_memory: f64,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub scale_up_cooldown_secs: u64,
    pub scale_down_cooldown_secs: u64,
    pub priority: Option<Priority>,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_replicas: DEFAULT_MIN_REPLICAS,
            max_replicas: DEFAULT_MAX_REPLICAS,
            target_cpu: DEFAULT_TARGET_CPU,
            target_memory: DEFAULT_TARGET_MEMORY,
            scale_up_threshold: DEFAULT_TARGET_CPU,
            scale_down_threshold: DEFAULT_TARGET_CPU * SCALE_DOWN_RATIO,
            scale_up_cooldown_secs: DEFAULT_SCALE_UP_COOLDOWN_SECS,
            scale_down_cooldown_secs: DEFAULT_SCALE_DOWN_COOLDOWN_SECS,
            priority: None,
        }
    }
}

impl ScalingConfig {
    /// Apply defaults and check range invariants
    pub fn from_params(params: ScalingParams) -> Result<Self, String> {
        let min_replicas = params.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS as i64);
        let max_replicas = params.max_replicas.unwrap_or(DEFAULT_MAX_REPLICAS as i64);

        if min_replicas < 1 || min_replicas > u32::MAX as i64 {
            return Err(format!("min_replicas must be >= 1 (got {})", min_replicas));
        }
        if max_replicas < min_replicas || max_replicas > u32::MAX as i64 {
            return Err(format!(
                "max_replicas must be >= min_replicas (got {} < {})",
                max_replicas, min_replicas
            ));
        }

        let target_cpu = percentage("target_cpu", params.target_cpu.unwrap_or(DEFAULT_TARGET_CPU))?;
        let target_memory = percentage(
            "target_memory",
            params.target_memory.unwrap_or(DEFAULT_TARGET_MEMORY),
        )?;
        let scale_up_threshold = percentage(
            "scale_up_threshold",
            params.scale_up_threshold.unwrap_or(target_cpu),
        )?;
        let scale_down_threshold = percentage(
            "scale_down_threshold",
            params
                .scale_down_threshold
                .unwrap_or(target_cpu * SCALE_DOWN_RATIO),
        )?;

        let scale_up_cooldown_secs = cooldown(
            "scale_up_cooldown",
            params
                .scale_up_cooldown
                .unwrap_or(DEFAULT_SCALE_UP_COOLDOWN_SECS as i64),
        )?;
        let scale_down_cooldown_secs = cooldown(
            "scale_down_cooldown",
            params
                .scale_down_cooldown
                .unwrap_or(DEFAULT_SCALE_DOWN_COOLDOWN_SECS as i64),
        )?;

        let priority = params
            .priority
            .as_deref()
            .map(Priority::from_str)
            .transpose()?;

        Ok(Self {
            enabled: params.enabled.unwrap_or(true),
            min_replicas: min_replicas as u32,
            max_replicas: max_replicas as u32,
            target_cpu,
            target_memory,
            scale_up_threshold,
            scale_down_threshold,
            scale_up_cooldown_secs,
            scale_down_cooldown_secs,
            priority,
        })
    }
}

fn percentage(name: &str, value: f64) -> Result<f64, String> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} must be within [0, 100] (got {})", name, value))
    }
}

fn cooldown(name: &str, value: i64) -> Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("{} must be >= 0 (got {})", name, value))
}

/// One declared workload, built from a compose entry and its labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub image: String,
    pub ports: Vec<ServicePort>,
    pub networks: Vec<String>,
    pub labels: Labels,
    pub volumes: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
    pub restart_policy: Option<String>,

    pub routing_enabled: bool,
    pub routing_rule: Option<String>,
    pub routing_service_port: Option<u16>,
    pub routing_middlewares: Vec<String>,

    pub scaling: Option<ScalingConfig>,
}

impl Service {
    /// Bare service with no ports, labels or routing
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            networks: Vec::new(),
            labels: Labels::new(),
            volumes: Vec::new(),
            environment: BTreeMap::new(),
            depends_on: Vec::new(),
            restart_policy: None,
            routing_enabled: false,
            routing_rule: None,
            routing_service_port: None,
            routing_middlewares: Vec::new(),
            scaling: None,
        }
    }

    /// Port traffic should be sent to: the label-declared port, else the first declared port
    pub fn main_port(&self) -> Option<u16> {
        self.routing_service_port
            .or_else(|| self.ports.first().map(|p| p.internal))
    }

    /// Hostnames named by the routing rule
    pub fn domain_names(&self) -> Vec<String> {
        self.routing_rule
            .as_deref()
            .map(labels::extract_domains)
            .unwrap_or_default()
    }

    /// True when the service carries an enabled scaling config
    pub fn is_scalable(&self) -> bool {
        self.scaling.as_ref().map(|s| s.enabled).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_defaults_follow_target_cpu() {
        let config = ScalingConfig::from_params(ScalingParams {
            target_cpu: Some(50.0),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.scale_up_threshold, 50.0);
        assert_eq!(config.scale_down_threshold, 50.0 * 0.4);
        assert_eq!(config.min_replicas, 1);
        assert_eq!(config.max_replicas, 10);
        assert!(config.enabled);
    }

    #[test]
    fn test_scaling_explicit_thresholds_kept() {
        let config = ScalingConfig::from_params(ScalingParams {
            target_cpu: Some(50.0),
            scale_up_threshold: Some(90.0),
            scale_down_threshold: Some(5.0),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(config.scale_up_threshold, 90.0);
        assert_eq!(config.scale_down_threshold, 5.0);
    }

    #[test]
    fn test_scaling_rejects_inverted_bounds() {
        let result = ScalingConfig::from_params(ScalingParams {
            min_replicas: Some(5),
            max_replicas: Some(2),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_scaling_rejects_out_of_range_values() {
        for params in [
            ScalingParams {
                min_replicas: Some(0),
                ..Default::default()
            },
            ScalingParams {
                target_cpu: Some(120.0),
                ..Default::default()
            },
            ScalingParams {
                scale_down_cooldown: Some(-1),
                ..Default::default()
            },
            ScalingParams {
                priority: Some("urgent".to_string()),
                ..Default::default()
            },
        ] {
            assert!(ScalingConfig::from_params(params).is_err());
        }
    }

    #[test]
    fn test_default_scaling_config() {
        let config = ScalingConfig::default();
        assert_eq!(config.scale_up_threshold, DEFAULT_TARGET_CPU);
        assert_eq!(config.scale_down_threshold, 28.0);
        assert_eq!(config.priority, None);
    }

    #[test]
    fn test_main_port_prefers_label_port() {
        let mut service = Service::new("web", "nginx");
        service.ports.push(ServicePort::internal(80));
        assert_eq!(service.main_port(), Some(80));

        service.routing_service_port = Some(3000);
        assert_eq!(service.main_port(), Some(3000));

        let empty = Service::new("worker", "busybox");
        assert_eq!(empty.main_port(), None);
    }

    #[test]
    fn test_domain_names_from_rule() {
        let mut service = Service::new("web", "nginx");
        assert!(service.domain_names().is_empty());

        service.routing_rule = Some("Host(`a.example.com`) || Host(`b.example.com`)".to_string());
        assert_eq!(
            service.domain_names(),
            vec!["a.example.com".to_string(), "b.example.com".to_string()]
        );
    }

    #[test]
    fn test_port_display() {
        let port = ServicePort {
            internal: 80,
            external: Some(8080),
            protocol: Protocol::Tcp,
        };
        assert_eq!(port.to_string(), "8080:80/tcp");
        assert_eq!(ServicePort::internal(53).to_string(), "53/tcp");
    }
}
