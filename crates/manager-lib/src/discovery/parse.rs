//! Normalization of one raw compose entry into a [`Service`]

use crate::inventory::RawServiceEntry;
use crate::labels;
use crate::models::{Labels, Protocol, Service, ServicePort};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Build a service from its compose declaration
///
/// Returns `Err(reason)` when the entry is structurally unusable. Individual
/// bad port, volume or environment items are dropped without failing the entry.
pub fn build_service(entry: &RawServiceEntry) -> Result<Service, String> {
    let spec = match &entry.spec {
        Value::Mapping(map) => map,
        Value::Null => return Ok(Service::new(entry.name.clone(), "")),
        other => return Err(format!("expected a mapping, found {}", kind(other))),
    };

    let image = match field(spec, "image") {
        None => String::new(),
        Some(value) => scalar_to_string(value)
            .ok_or_else(|| format!("`image` must be a string, found {}", kind(value)))?,
    };

    let ports = match field(spec, "ports") {
        None => Vec::new(),
        Some(Value::Sequence(items)) => items.iter().filter_map(parse_port).collect(),
        Some(other) => return Err(format!("`ports` must be a list, found {}", kind(other))),
    };

    let networks = name_list(field(spec, "networks")).map_err(|k| format!("`networks` {}", k))?;
    let depends_on =
        name_list(field(spec, "depends_on")).map_err(|k| format!("`depends_on` {}", k))?;

    let environment = parse_environment(field(spec, "environment"))?;
    let volumes = parse_volumes(field(spec, "volumes"))?;
    let labels = parse_labels(spec)?;

    let restart_policy = field(spec, "restart").and_then(scalar_to_string);

    let routing = labels::parse_routing(&labels);
    let scaling = labels::parse_scaling(&labels);

    Ok(Service {
        name: entry.name.clone(),
        image,
        ports,
        networks,
        labels,
        volumes,
        environment,
        depends_on,
        restart_policy,
        routing_enabled: routing.enabled,
        routing_rule: routing.rule,
        routing_service_port: routing.service_port,
        routing_middlewares: routing.middlewares,
        scaling,
    })
}

/// Look up a key, treating an explicit `null` as absent
fn field<'a>(spec: &'a Mapping, key: &str) -> Option<&'a Value> {
    spec.get(key).filter(|v| !v.is_null())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Render a scalar as a string; lists and mappings have no rendering
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn scalar_to_port(value: &Value) -> Option<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    port.filter(|port| *port > 0)
}

/// Parse one port entry: `80`, `"8080:80"`, `"127.0.0.1:8080:80/udp"`, or
/// `{target, published, protocol}`
pub(crate) fn parse_port(value: &Value) -> Option<ServicePort> {
    let port = match value {
        Value::Number(_) => scalar_to_port(value).map(ServicePort::internal),
        Value::String(s) => parse_port_string(s),
        Value::Mapping(map) => {
            let internal = map.get("target").and_then(scalar_to_port)?;
            let external = match map.get("published").filter(|v| !v.is_null()) {
                None => None,
                Some(published) => Some(scalar_to_port(published)?),
            };
            let protocol = match map.get("protocol").and_then(Value::as_str) {
                None => Protocol::Tcp,
                Some(p) => p.parse().ok()?,
            };
            Some(ServicePort {
                internal,
                external,
                protocol,
            })
        }
        _ => None,
    };

    if port.is_none() {
        debug!(port = ?value, "Skipping unparseable port entry");
    }
    port
}

fn parse_port_string(raw: &str) -> Option<ServicePort> {
    let raw = raw.trim();
    let (mapping, protocol) = match raw.split_once('/') {
        Some((mapping, protocol)) => (mapping, protocol.parse::<Protocol>().ok()?),
        None => (raw, Protocol::Tcp),
    };

    let (external, internal) = match mapping.rsplit_once(':') {
        Some((published, internal)) => {
            // Drop an optional host IP in front of the published port
            let published = published.rsplit(':').next().unwrap_or(published);
            let external = if published.is_empty() {
                None
            } else {
                Some(published.parse::<u16>().ok().filter(|p| *p > 0)?)
            };
            (external, internal)
        }
        None => (None, mapping),
    };

    let internal = internal.parse::<u16>().ok().filter(|p| *p > 0)?;
    Some(ServicePort {
        internal,
        external,
        protocol,
    })
}

/// Names from either a list of strings or the keys of a mapping
fn name_list(value: Option<&Value>) -> Result<Vec<String>, String> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Sequence(items)) => Ok(items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()),
        Some(Value::Mapping(map)) => Ok(map
            .keys()
            .filter_map(|key| key.as_str().map(str::to_string))
            .collect()),
        Some(other) => Err(format!("must be a list or mapping, found {}", kind(other))),
    }
}

/// `KEY=VALUE` list or mapping into an ordered map of strings
fn key_value_map(value: Option<&Value>, what: &str) -> Result<BTreeMap<String, String>, String> {
    let mut map = BTreeMap::new();
    match value {
        None => {}
        Some(Value::Sequence(items)) => {
            for item in items {
                let Some((key, value)) = item.as_str().and_then(|s| s.split_once('=')) else {
                    debug!(item = ?item, "Skipping {} entry without '='", what);
                    continue;
                };
                map.insert(key.to_string(), value.to_string());
            }
        }
        Some(Value::Mapping(entries)) => {
            for (key, value) in entries {
                match (key.as_str(), scalar_to_string(value)) {
                    (Some(key), Some(value)) => {
                        map.insert(key.to_string(), value);
                    }
                    _ => debug!(key = ?key, "Skipping non-scalar {} entry", what),
                }
            }
        }
        Some(other) => {
            return Err(format!(
                "`{}` must be a list or mapping, found {}",
                what,
                kind(other)
            ))
        }
    }
    Ok(map)
}

fn parse_environment(value: Option<&Value>) -> Result<BTreeMap<String, String>, String> {
    key_value_map(value, "environment")
}

/// Labels from the service itself and from `deploy.labels`; deploy labels win
fn parse_labels(spec: &Mapping) -> Result<Labels, String> {
    let mut labels = key_value_map(field(spec, "labels"), "labels")?;

    let deploy_labels = match field(spec, "deploy") {
        Some(Value::Mapping(deploy)) => field(deploy, "labels"),
        _ => None,
    };
    labels.extend(key_value_map(deploy_labels, "deploy.labels")?);

    Ok(labels)
}

fn parse_volumes(value: Option<&Value>) -> Result<Vec<String>, String> {
    let items = match value {
        None => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items,
        Some(other) => return Err(format!("`volumes` must be a list, found {}", kind(other))),
    };

    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Mapping(map) => {
                let source = map.get("source").and_then(Value::as_str).unwrap_or("");
                let target = map.get("target").and_then(Value::as_str).unwrap_or("");
                match (source.is_empty(), target.is_empty()) {
                    (false, false) => Some(format!("{}:{}", source, target)),
                    (true, false) => Some(target.to_string()),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect())
}
