//! Label parsing
//!
//! Turns a flat label map into routing and scaling intents. Both passes are
//! total: a missing or malformed label degrades to a default, never an error.
//!
//! Keys are visited in lexical order, so when several labels could supply
//! the same value (two routers, two port labels) the lexically first wins.

use crate::models::{Labels, ScalingConfig, ScalingParams};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Root of every routing label
pub const ROUTING_PREFIX: &str = "routing";
/// Label that opts a service into HTTP routing
pub const ROUTING_ENABLE: &str = "routing.enable";
/// Root of every scaling label
pub const SCALING_PREFIX: &str = "scaling.";
/// Label that opts a service into auto-scaling
pub const SCALING_ENABLED: &str = "scaling.enabled";

pub const RULE: &str = "rule";
pub const MIDDLEWARES: &str = "middlewares";
pub const ENTRYPOINTS: &str = "entrypoints";
pub const SERVER_PORT: &str = "loadbalancer.server.port";
pub const SERVER_ADDRESS: &str = "loadbalancer.server.address";
pub const SERVER_SCHEME: &str = "loadbalancer.server.scheme";
pub const HEALTHCHECK_PATH: &str = "loadbalancer.healthcheck.path";
pub const HEALTHCHECK_HEADERS: &str = "loadbalancer.healthcheck.headers";

/// A structured routing label key: `routing.<protocol>.<kind>.<name>[.<subkey>]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelKey<'a> {
    /// `http` or `tcp`
    pub protocol: &'a str,
    /// `routers` or `services`
    pub kind: &'a str,
    /// Router or service name
    pub name: &'a str,
    /// Everything after the name, if anything
    pub subkey: Option<&'a str>,
}

impl<'a> LabelKey<'a> {
    /// Split a routing label key into its parts
    pub fn parse(key: &'a str) -> Option<Self> {
        let mut parts = key.splitn(5, '.');
        if parts.next()? != ROUTING_PREFIX {
            return None;
        }
        let protocol = parts.next()?;
        let kind = parts.next()?;
        let name = parts.next()?;
        if protocol.is_empty() || kind.is_empty() || name.is_empty() {
            return None;
        }
        let subkey = parts.next().filter(|s| !s.is_empty());

        Some(Self {
            protocol,
            kind,
            name,
            subkey,
        })
    }

    pub fn is(&self, protocol: &str, kind: &str, subkey: &str) -> bool {
        self.protocol == protocol && self.kind == kind && self.subkey == Some(subkey)
    }
}

/// Build a routing label key from its parts
pub fn routing_key(protocol: &str, kind: &str, name: &str, subkey: &str) -> String {
    format!("{}.{}.{}.{}.{}", ROUTING_PREFIX, protocol, kind, name, subkey)
}

/// Iterate `(name, value)` for every label `routing.<protocol>.<kind>.<name>.<subkey>`
pub fn matching<'a>(
    labels: &'a Labels,
    protocol: &'a str,
    kind: &'a str,
    subkey: &'a str,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    labels.iter().filter_map(move |(key, value)| {
        let parsed = LabelKey::parse(key)?;
        parsed
            .is(protocol, kind, subkey)
            .then_some((parsed.name, value.as_str()))
    })
}

/// Routing intent extracted from labels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingLabels {
    pub enabled: bool,
    pub router: Option<String>,
    pub rule: Option<String>,
    pub service_port: Option<u16>,
    pub middlewares: Vec<String>,
}

/// Extract routing intent from labels
pub fn parse_routing(labels: &Labels) -> RoutingLabels {
    let enabled = labels.get(ROUTING_ENABLE).map(String::as_str) == Some("true");

    let router = matching(labels, "http", "routers", RULE).next();
    let (router, rule) = match router {
        Some((name, rule)) => (Some(name.to_string()), Some(rule.to_string())),
        None => (None, None),
    };

    let port_labels: Vec<(&str, &str)> =
        matching(labels, "http", "services", SERVER_PORT).collect();

    let preferred = router.as_deref().and_then(|router| {
        port_labels
            .iter()
            .filter(|(name, _)| *name == router)
            .find_map(|(_, value)| parse_port(value))
    });
    let service_port = preferred.or_else(|| {
        port_labels
            .iter()
            .find_map(|(_, value)| parse_port(value))
    });

    if let Some(port) = service_port {
        debug!(port, "Service port taken from label");
    }

    let middlewares = router
        .as_deref()
        .and_then(|router| labels.get(&routing_key("http", "routers", router, MIDDLEWARES)))
        .map(|value| split_list(value))
        .unwrap_or_default();

    RoutingLabels {
        enabled,
        router,
        rule,
        service_port,
        middlewares,
    }
}

/// Parse a port label value; zero and non-numeric values are rejected
pub fn parse_port(value: &str) -> Option<u16> {
    value.trim().parse::<u16>().ok().filter(|port| *port > 0)
}

/// Split a comma-separated label value, trimming and dropping empty items
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// A scaling label that could not be coerced and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelIssue {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Coerce every `scaling.*` label into raw parameters, collecting the ones that fail
pub fn collect_scaling_params(labels: &Labels) -> (ScalingParams, Vec<LabelIssue>) {
    let mut params = ScalingParams::default();
    let mut issues = Vec::new();

    for (key, value) in labels.range(SCALING_PREFIX.to_string()..) {
        let Some(param) = key.strip_prefix(SCALING_PREFIX) else {
            break;
        };

        let result = match param {
            "min_replicas" => parse_int(value).map(|v| params.min_replicas = Some(v)),
            "max_replicas" => parse_int(value).map(|v| params.max_replicas = Some(v)),
            "scale_up_cooldown" => parse_int(value).map(|v| params.scale_up_cooldown = Some(v)),
            "scale_down_cooldown" => parse_int(value).map(|v| params.scale_down_cooldown = Some(v)),
            "target_cpu" => parse_float(value).map(|v| params.target_cpu = Some(v)),
            "target_memory" => parse_float(value).map(|v| params.target_memory = Some(v)),
            "scale_up_threshold" => parse_float(value).map(|v| params.scale_up_threshold = Some(v)),
            "scale_down_threshold" => {
                parse_float(value).map(|v| params.scale_down_threshold = Some(v))
            }
            "enabled" => {
                params.enabled = Some(value.eq_ignore_ascii_case("true"));
                Ok(())
            }
            "priority" => {
                params.priority = Some(value.clone());
                Ok(())
            }
            other => {
                debug!(param = other, "Ignoring unknown scaling label");
                Ok(())
            }
        };

        if let Err(reason) = result {
            issues.push(LabelIssue {
                key: key.clone(),
                value: value.clone(),
                reason,
            });
        }
    }

    (params, issues)
}

/// Extract the scaling config, or `None` when scaling is not switched on
///
/// Individual bad values are skipped with a warning. A parameter set that
/// violates the config's range invariants discards the whole config.
pub fn parse_scaling(labels: &Labels) -> Option<ScalingConfig> {
    if labels.get(SCALING_ENABLED).map(String::as_str) != Some("true") {
        return None;
    }

    let (params, issues) = collect_scaling_params(labels);
    for issue in &issues {
        warn!(
            key = %issue.key,
            value = %issue.value,
            reason = %issue.reason,
            "Invalid scaling parameter value"
        );
    }

    match ScalingConfig::from_params(params) {
        Ok(config) => Some(config),
        Err(reason) => {
            warn!(reason = %reason, "Invalid scaling configuration, scaling disabled");
            None
        }
    }
}

fn parse_int(value: &str) -> Result<i64, String> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("expected an integer: {}", e))
}

fn parse_float(value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("expected a number: {}", e))
        .and_then(|v| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err("expected a finite number".to_string())
            }
        })
}

fn host_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r#"Host\([`'"]([^`'"]+)[`'"]\)"#).expect("valid Host pattern"),
            Regex::new(r#"HostRegexp\([`'"]([^`'"]+)[`'"]\)"#).expect("valid HostRegexp pattern"),
        ]
    })
}

/// Hostnames named in `Host(...)` then `HostRegexp(...)` sub-expressions of a rule
pub fn extract_domains(rule: &str) -> Vec<String> {
    host_patterns()
        .iter()
        .flat_map(|pattern| {
            pattern
                .captures_iter(rule)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_label_key_parse() {
        let key = LabelKey::parse("routing.http.services.web.loadbalancer.server.port").unwrap();
        assert_eq!(key.protocol, "http");
        assert_eq!(key.kind, "services");
        assert_eq!(key.name, "web");
        assert_eq!(key.subkey, Some("loadbalancer.server.port"));

        let bare = LabelKey::parse("routing.tcp.routers.db").unwrap();
        assert_eq!(bare.subkey, None);

        assert!(LabelKey::parse("routing.enable").is_none());
        assert!(LabelKey::parse("other.http.routers.web.rule").is_none());
    }

    #[test]
    fn test_routing_disabled_without_enable_label() {
        let routing = parse_routing(&labels(&[("routing.http.routers.web.rule", "Host(`a`)")]));
        assert!(!routing.enabled);
        assert_eq!(routing.rule.as_deref(), Some("Host(`a`)"));

        let routing = parse_routing(&labels(&[("routing.enable", "TRUE")]));
        assert!(!routing.enabled);
    }

    #[test]
    fn test_routing_full_extraction() {
        let routing = parse_routing(&labels(&[
            ("routing.enable", "true"),
            ("routing.http.routers.web.rule", "Host(`web.example.com`)"),
            ("routing.http.routers.web.middlewares", " auth@file , compress@file,"),
            ("routing.http.services.aaa.loadbalancer.server.port", "9000"),
            ("routing.http.services.web.loadbalancer.server.port", "3000"),
        ]));

        assert!(routing.enabled);
        assert_eq!(routing.router.as_deref(), Some("web"));
        assert_eq!(routing.rule.as_deref(), Some("Host(`web.example.com`)"));
        assert_eq!(routing.service_port, Some(3000));
        assert_eq!(routing.middlewares, vec!["auth@file", "compress@file"]);
    }

    #[test]
    fn test_port_falls_back_to_first_numeric_label() {
        let routing = parse_routing(&labels(&[
            ("routing.http.routers.web.rule", "Host(`x`)"),
            ("routing.http.services.a.loadbalancer.server.port", "http"),
            ("routing.http.services.b.loadbalancer.server.port", "8081"),
            ("routing.http.services.web.loadbalancer.server.port", "not-a-port"),
        ]));
        assert_eq!(routing.service_port, Some(8081));
    }

    #[test]
    fn test_first_router_in_lexical_order_wins() {
        let routing = parse_routing(&labels(&[
            ("routing.http.routers.zeta.rule", "Host(`z`)"),
            ("routing.http.routers.alpha.rule", "Host(`a`)"),
        ]));
        assert_eq!(routing.router.as_deref(), Some("alpha"));
        assert_eq!(routing.rule.as_deref(), Some("Host(`a`)"));
    }

    #[test]
    fn test_no_middlewares_without_router() {
        let routing = parse_routing(&labels(&[(
            "routing.http.routers.web.middlewares",
            "auth@file",
        )]));
        assert!(routing.middlewares.is_empty());
        assert_eq!(routing.router, None);
    }

    #[test]
    fn test_scaling_absent_unless_exactly_true() {
        for value in ["false", "True", "yes", ""] {
            assert!(parse_scaling(&labels(&[("scaling.enabled", value)])).is_none());
        }
        assert!(parse_scaling(&labels(&[])).is_none());
        assert!(parse_scaling(&labels(&[("scaling.enabled", "true")])).is_some());
    }

    #[test]
    fn test_scaling_bad_key_skipped_others_kept() {
        let input = labels(&[
            ("scaling.enabled", "true"),
            ("scaling.min_replicas", "abc"),
            ("scaling.max_replicas", "4"),
            ("scaling.target_cpu", "60"),
            ("scaling.priority", "high"),
        ]);

        let (params, issues) = collect_scaling_params(&input);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].key, "scaling.min_replicas");
        assert_eq!(params.min_replicas, None);
        assert_eq!(params.max_replicas, Some(4));

        let config = parse_scaling(&input).unwrap();
        assert_eq!(config.min_replicas, 1);
        assert_eq!(config.max_replicas, 4);
        assert_eq!(config.target_cpu, 60.0);
        assert_eq!(config.scale_up_threshold, 60.0);
        assert_eq!(config.scale_down_threshold, 60.0 * 0.4);
    }

    #[test]
    fn test_scaling_invalid_ranges_discard_config() {
        let config = parse_scaling(&labels(&[
            ("scaling.enabled", "true"),
            ("scaling.min_replicas", "3"),
            ("scaling.max_replicas", "2"),
        ]));
        assert!(config.is_none());

        let config = parse_scaling(&labels(&[
            ("scaling.enabled", "true"),
            ("scaling.target_cpu", "150"),
        ]));
        assert!(config.is_none());
    }

    #[test]
    fn test_extract_domains() {
        let domains = extract_domains(
            concat!(
                "Host(`api.example.com`) && PathPrefix(`/v1`) || ",
                "HostRegexp(`{sub:[a-z]+}.example.com`)",
            ),
        );
        assert_eq!(
            domains,
            vec!["api.example.com".to_string(), "{sub:[a-z]+}.example.com".to_string()]
        );
        assert!(extract_domains("PathPrefix(`/`)").is_empty());
    }
}
