//! Routing document generation
//!
//! A pure transform from discovered services to a [`RoutingDocument`].
//! Identical input and settings always yield an identical document.

pub mod document;
mod http;
mod tcp;

pub use document::RoutingDocument;
pub use http::{
    default_middlewares, framework_health_path, is_web_service, router_name, service_name,
};

use crate::config::GeneratorConfig;
use crate::labels::{LabelKey, SERVER_PORT, SERVER_SCHEME};
use crate::models::Service;
use tracing::{debug, info, warn};

/// File name the routing document is written under
pub const OUTPUT_FILE: &str = "services.yml";

/// Builds routing documents from discovered services
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    settings: GeneratorConfig,
    swarm_mode: bool,
}

impl ConfigGenerator {
    pub fn new(settings: GeneratorConfig, swarm_mode: bool) -> Self {
        Self {
            settings,
            swarm_mode,
        }
    }

    /// Use the configured swarm flag, or the detected one when unset
    pub fn from_config(settings: &GeneratorConfig, detected_swarm: bool) -> Self {
        let swarm_mode = settings.swarm_mode.unwrap_or(detected_swarm);
        Self::new(settings.clone(), swarm_mode)
    }

    pub fn swarm_mode(&self) -> bool {
        self.swarm_mode
    }

    pub fn generate(&self, services: &[Service]) -> RoutingDocument {
        info!(services = services.len(), "Generating routing configuration");

        let mut document = RoutingDocument::default();

        for service in services {
            if is_tcp_service(service) {
                debug!(service = %service.name, "Adding TCP routing");
                self.add_tcp(&mut document.tcp, service);
            } else if service.routing_enabled {
                debug!(service = %service.name, "Adding HTTP routing");
                document
                    .http
                    .routers
                    .insert(router_name(service), self.http_router(service));
                document
                    .http
                    .services
                    .insert(service_name(service), self.http_service(service));
            }
        }

        info!(
            http_routers = document.http.routers.len(),
            tcp_routers = document.tcp.routers.len(),
            "Generated routing configuration"
        );
        document
    }

    /// Host used when synthesizing an address from a port label
    fn backend_host<'a>(&'a self, service: &'a Service) -> &'a str {
        self.settings
            .default_backend_host
            .as_deref()
            .unwrap_or(&service.name)
    }
}

/// True when the service carries any `routing.tcp.*` label, or an HTTP
/// service port label whose paired scheme label is `tcp`
pub fn is_tcp_service(service: &Service) -> bool {
    let keys = || {
        service
            .labels
            .iter()
            .filter_map(|(key, value)| Some((LabelKey::parse(key)?, value.as_str())))
    };

    if keys().any(|(key, _)| key.protocol == "tcp") {
        return true;
    }

    keys()
        .filter(|(key, value)| {
            key.is("http", "services", SERVER_SCHEME) && value.trim().eq_ignore_ascii_case("tcp")
        })
        .any(|(scheme, _)| {
            let paired = keys().any(|(key, _)| {
                key.name == scheme.name && key.is("http", "services", SERVER_PORT)
            });
            if !paired {
                warn!(
                    service = %service.name,
                    http_service = scheme.name,
                    "Ignoring tcp scheme label without a matching port label"
                );
            }
            paired
        })
}
