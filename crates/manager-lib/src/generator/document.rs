//! Routing document types
//!
//! Field names serialize in the proxy's camelCase dialect. Every map is a
//! `BTreeMap`, so identical input always serializes to identical bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generated routing configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingDocument {
    #[serde(default, skip_serializing_if = "HttpSection::is_empty")]
    pub http: HttpSection,
    #[serde(default, skip_serializing_if = "TcpSection::is_empty")]
    pub tcp: TcpSection,
}

impl RoutingDocument {
    /// Serialize as YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default)]
    pub routers: BTreeMap<String, HttpRouter>,
    #[serde(default)]
    pub services: BTreeMap<String, HttpService>,
    /// Middleware definitions; routers only reference middlewares defined elsewhere
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub middlewares: BTreeMap<String, serde_yaml::Value>,
}

impl HttpSection {
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty() && self.services.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRouter {
    pub rule: String,
    pub service: String,
    #[serde(rename = "entryPoints")]
    pub entry_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouterTls>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterTls {
    #[serde(rename = "certResolver")]
    pub cert_resolver: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpService {
    #[serde(rename = "loadBalancer")]
    pub load_balancer: HttpLoadBalancer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpLoadBalancer {
    pub servers: Vec<UrlServer>,
    #[serde(
        rename = "healthCheck",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub health_check: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<Sticky>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlServer {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub path: String,
    pub interval: String,
    pub timeout: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticky {
    pub cookie: StickyCookie,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickyCookie {
    pub name: String,
    pub secure: bool,
    #[serde(rename = "httpOnly")]
    pub http_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSection {
    #[serde(default)]
    pub routers: BTreeMap<String, TcpRouter>,
    #[serde(default)]
    pub services: BTreeMap<String, TcpService>,
}

impl TcpSection {
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty() && self.services.is_empty()
    }
}

/// TCP router; label subkeys other than `entrypoints` are carried through verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpRouter {
    #[serde(
        rename = "entryPoints",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub entry_points: Vec<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpService {
    #[serde(rename = "loadBalancer")]
    pub load_balancer: TcpLoadBalancer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpLoadBalancer {
    pub servers: Vec<AddressServer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressServer {
    pub address: String,
}
