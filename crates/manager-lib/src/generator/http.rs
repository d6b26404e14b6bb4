//! HTTP router and service synthesis

use super::document::{
    HealthCheck, HttpLoadBalancer, HttpRouter, HttpService, RouterTls, Sticky, StickyCookie,
    UrlServer,
};
use super::ConfigGenerator;
use crate::labels::{self, HEALTHCHECK_HEADERS, HEALTHCHECK_PATH, SERVER_ADDRESS, SERVER_PORT};
use crate::models::{Priority, Service};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const SECURE_HEADERS: &str = "secure-headers@file";
pub const COMPRESS: &str = "compress@file";
pub const RATE_LIMIT: &str = "rate-limit@file";
pub const RATE_LIMIT_API: &str = "rate-limit-api@file";
pub const RATE_LIMIT_CRITICAL: &str = "rate-limit-critical@file";
pub const AUTH: &str = "auth@file";

/// Image or name fragments that mark a browser-facing web application
const WEB_INDICATORS: &[&str] = &[
    "rails", "django", "express", "nginx", "apache", "php", "laravel", "symfony", "vue", "react",
];

/// Image fragments mapped to their framework's conventional health endpoint
const FRAMEWORK_HEALTH_PATHS: &[(&[&str], &str)] = &[
    (&["spring", "java"], "/actuator/health"),
    (&["rails", "ruby"], "/health"),
    (&["django", "python"], "/health/"),
    (&["express", "node"], "/health"),
];

pub fn router_name(service: &Service) -> String {
    format!("{}_router", service.name)
}

pub fn service_name(service: &Service) -> String {
    format!("{}_service", service.name)
}

/// True when the image or name looks like a web application
pub fn is_web_service(service: &Service) -> bool {
    let image = service.image.to_lowercase();
    let name = service.name.to_lowercase();
    WEB_INDICATORS
        .iter()
        .any(|indicator| image.contains(indicator) || name.contains(indicator))
}

/// Health endpoint implied by the image's framework, if recognised
pub fn framework_health_path(image: &str) -> Option<&'static str> {
    let image = image.to_lowercase();
    FRAMEWORK_HEALTH_PATHS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| image.contains(k)))
        .map(|(_, path)| *path)
}

/// Middlewares applied when the service does not list its own
pub fn default_middlewares(service: &Service) -> Vec<String> {
    let mut middlewares = vec![SECURE_HEADERS.to_string()];

    if is_web_service(service) {
        middlewares.push(COMPRESS.to_string());
    }

    let rate_limit = match service.scaling.as_ref().and_then(|s| s.priority) {
        Some(Priority::Critical) => RATE_LIMIT_CRITICAL,
        Some(Priority::High | Priority::Medium) => RATE_LIMIT_API,
        Some(Priority::Low) | None => RATE_LIMIT,
    };
    middlewares.push(rate_limit.to_string());

    let name = service.name.to_lowercase();
    if name.contains("admin") || name.contains("dashboard") {
        middlewares.push(AUTH.to_string());
    }

    middlewares
}

/// `Name: value, Other: value` into a header map
fn parse_headers(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|header| header.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn with_scheme(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

impl ConfigGenerator {
    pub(super) fn http_router(&self, service: &Service) -> HttpRouter {
        let rule = service.routing_rule.clone().unwrap_or_else(|| {
            format!("Host(`{}{}`)", service.name, self.settings.domain_suffix)
        });

        let middlewares = if service.routing_middlewares.is_empty() {
            default_middlewares(service)
        } else {
            service.routing_middlewares.clone()
        };

        HttpRouter {
            rule,
            service: service_name(service),
            entry_points: vec![self.settings.entry_point.clone()],
            middlewares,
            tls: self.settings.tls_enabled.then(|| RouterTls {
                cert_resolver: self.settings.cert_resolver.clone(),
            }),
        }
    }

    pub(super) fn http_service(&self, service: &Service) -> HttpService {
        let servers = match self.resolve_server(service) {
            Some(server) => vec![server],
            None => {
                warn!(
                    service = %service.name,
                    "No port found for service, emitting empty server list"
                );
                Vec::new()
            }
        };

        let sticky = is_web_service(service).then(|| Sticky {
            cookie: StickyCookie {
                name: format!("{}_session", service.name),
                secure: true,
                http_only: true,
            },
        });

        HttpService {
            load_balancer: HttpLoadBalancer {
                servers,
                health_check: self.health_check(service),
                sticky,
            },
        }
    }

    /// Backend URL by precedence: explicit address, port label, then main port
    fn resolve_server(&self, service: &Service) -> Option<UrlServer> {
        if let Some(address) = explicit_address(service) {
            let url = with_scheme(address);
            debug!(service = %service.name, url = %url, "Using address from label");
            return Some(UrlServer { url });
        }

        let port_key = labels::routing_key("http", "services", &service_name(service), SERVER_PORT);
        if let Some(port) = service.labels.get(&port_key).and_then(|v| labels::parse_port(v)) {
            let host = self.backend_host(service);
            debug!(service = %service.name, port, "Using port from service label");
            return Some(UrlServer {
                url: format!("http://{}:{}", host, port),
            });
        }

        let port = service.main_port()?;
        let host = if self.swarm_mode {
            service.name.as_str()
        } else {
            self.settings
                .default_backend_host
                .as_deref()
                .or(self.settings.external_host.as_deref())
                .unwrap_or(&service.name)
        };
        debug!(service = %service.name, port, "Falling back to main port");
        Some(UrlServer {
            url: format!("http://{}:{}", host, port),
        })
    }

    fn health_check(&self, service: &Service) -> Option<HealthCheck> {
        let labelled =
            labels::matching(&service.labels, "http", "services", HEALTHCHECK_PATH).next();

        let (path, headers) = match labelled {
            Some((name, path)) => {
                let headers_key =
                    labels::routing_key("http", "services", name, HEALTHCHECK_HEADERS);
                let headers = service
                    .labels
                    .get(&headers_key)
                    .map(|raw| parse_headers(raw))
                    .unwrap_or_default();
                (path.to_string(), headers)
            }
            None => (
                framework_health_path(&service.image)?.to_string(),
                BTreeMap::new(),
            ),
        };

        Some(HealthCheck {
            path,
            interval: self.settings.health_check.interval.clone(),
            timeout: self.settings.health_check.timeout.clone(),
            headers,
        })
    }
}

/// Address label for the service: its own name first, then `_`/`-` variants, then any
fn explicit_address(service: &Service) -> Option<&str> {
    let addresses: Vec<(&str, &str)> =
        labels::matching(&service.labels, "http", "services", SERVER_ADDRESS).collect();

    let variants = [
        service.name.clone(),
        service.name.replace('_', "-"),
        service.name.replace('-', "_"),
    ];

    variants
        .iter()
        .find_map(|variant| {
            addresses
                .iter()
                .find(|(name, _)| *name == variant.as_str())
                .map(|(_, address)| *address)
        })
        .or_else(|| addresses.first().map(|(_, address)| *address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::models::{ScalingConfig, ServicePort};

    fn generator() -> ConfigGenerator {
        ConfigGenerator::new(GeneratorConfig::default(), false)
    }

    fn service(name: &str, image: &str, labels: &[(&str, &str)]) -> Service {
        let mut service = Service::new(name, image);
        service.labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        service
    }

    #[test]
    fn test_address_label_beats_port_label() {
        let mut svc = service(
            "web",
            "nginx",
            &[
                ("routing.http.services.web_service.loadbalancer.server.port", "8080"),
                ("routing.http.services.web.loadbalancer.server.address", "10.0.0.2:80"),
            ],
        );
        svc.ports.push(ServicePort::internal(80));

        let lb = generator().http_service(&svc).load_balancer;
        assert_eq!(lb.servers, vec![UrlServer { url: "http://10.0.0.2:80".to_string() }]);
    }

    #[test]
    fn test_address_variant_precedence() {
        let svc = service(
            "my-app",
            "busybox",
            &[
                ("routing.http.services.aaa.loadbalancer.server.address", "http://first:1"),
                ("routing.http.services.my_app.loadbalancer.server.address", "https://variant:2"),
            ],
        );
        assert_eq!(explicit_address(&svc), Some("https://variant:2"));

        let other = service(
            "worker",
            "busybox",
            &[("routing.http.services.zzz.loadbalancer.server.address", "z:1")],
        );
        assert_eq!(explicit_address(&other), Some("z:1"));
    }

    #[test]
    fn test_port_label_on_computed_service_key() {
        let svc = service(
            "api",
            "busybox",
            &[("routing.http.services.api_service.loadbalancer.server.port", "9000")],
        );

        let mut config = GeneratorConfig::default();
        config.default_backend_host = Some("10.1.1.1".to_string());
        let lb = ConfigGenerator::new(config, false).http_service(&svc).load_balancer;
        assert_eq!(lb.servers[0].url, "http://10.1.1.1:9000");

        let lb = generator().http_service(&svc).load_balancer;
        assert_eq!(lb.servers[0].url, "http://api:9000");
    }

    #[test]
    fn test_main_port_fallback_hosts() {
        let mut svc = service("api", "busybox", &[]);
        svc.ports.push(ServicePort::internal(8000));

        let mut config = GeneratorConfig::default();
        config.external_host = Some("192.168.1.10".to_string());

        let compose = ConfigGenerator::new(config.clone(), false);
        assert_eq!(
            compose.http_service(&svc).load_balancer.servers[0].url,
            "http://192.168.1.10:8000"
        );

        let swarm = ConfigGenerator::new(config, true);
        assert_eq!(
            swarm.http_service(&svc).load_balancer.servers[0].url,
            "http://api:8000"
        );
    }

    #[test]
    fn test_no_port_gives_empty_servers() {
        let svc = service("ghost", "busybox", &[]);
        assert!(generator().http_service(&svc).load_balancer.servers.is_empty());
    }

    #[test]
    fn test_health_check_sources() {
        let labelled = service(
            "api",
            "busybox",
            &[
                ("routing.http.services.api.loadbalancer.healthcheck.path", "/ping"),
                (
                    "routing.http.services.api.loadbalancer.healthcheck.headers",
                    "X-Probe: 1, Host: api.internal",
                ),
            ],
        );
        let check = generator().health_check(&labelled).unwrap();
        assert_eq!(check.path, "/ping");
        assert_eq!(check.interval, "30s");
        assert_eq!(check.headers.get("Host").map(String::as_str), Some("api.internal"));

        let spring = service("billing", "acme/spring-billing:2", &[]);
        assert_eq!(generator().health_check(&spring).unwrap().path, "/actuator/health");

        let django = service("site", "python:3.12", &[]);
        assert_eq!(generator().health_check(&django).unwrap().path, "/health/");

        let plain = service("cache", "redis:7", &[]);
        assert!(generator().health_check(&plain).is_none());
    }

    #[test]
    fn test_default_middlewares() {
        let mut admin = service("admin-panel", "php:8-apache", &[]);
        assert_eq!(
            default_middlewares(&admin),
            vec![SECURE_HEADERS, COMPRESS, RATE_LIMIT, AUTH]
        );

        let mut scaling = ScalingConfig::default();
        scaling.priority = Some(Priority::Critical);
        admin.scaling = Some(scaling.clone());
        assert!(default_middlewares(&admin).contains(&RATE_LIMIT_CRITICAL.to_string()));

        let mut api = service("orders", "golang:1.22", &[]);
        scaling.priority = Some(Priority::Medium);
        api.scaling = Some(scaling);
        assert_eq!(default_middlewares(&api), vec![SECURE_HEADERS, RATE_LIMIT_API]);
    }

    #[test]
    fn test_router_defaults_and_explicit_middlewares() {
        let mut svc = service("shop", "node:20", &[]);
        let router = generator().http_router(&svc);
        assert_eq!(router.rule, "Host(`shop.ddev`)");
        assert_eq!(router.service, "shop_service");
        assert_eq!(router.entry_points, vec!["websecure"]);
        assert_eq!(router.middlewares, vec![SECURE_HEADERS, RATE_LIMIT]);

        svc.routing_middlewares = vec!["custom@file".to_string()];
        assert_eq!(generator().http_router(&svc).middlewares, vec!["custom@file"]);
    }

    #[test]
    fn test_router_tls() {
        let svc = service("shop", "node:20", &[]);
        assert!(generator().http_router(&svc).tls.is_none());

        let mut settings = GeneratorConfig::default();
        settings.tls_enabled = true;
        let router = ConfigGenerator::new(settings, false).http_router(&svc);
        assert_eq!(
            router.tls,
            Some(RouterTls { cert_resolver: "letsencrypt".to_string() })
        );

        let yaml = serde_yaml::to_string(&router).unwrap();
        assert!(yaml.contains("tls:\n  certResolver: letsencrypt"), "{}", yaml);
    }

    #[test]
    fn test_web_services_get_sticky_sessions() {
        let web = service("frontend", "node:20-react", &[]);
        let sticky = generator().http_service(&web).load_balancer.sticky.unwrap();
        assert_eq!(sticky.cookie.name, "frontend_session");
        assert!(sticky.cookie.http_only);

        let api = service("orders", "golang:1.22", &[]);
        assert!(generator().http_service(&api).load_balancer.sticky.is_none());
    }
}
