//! TCP routers and services, taken from `routing.tcp.*` labels

use super::document::{AddressServer, TcpSection, TcpService};
use super::ConfigGenerator;
use crate::labels::{self, LabelKey, ENTRYPOINTS, SERVER_ADDRESS, SERVER_PORT};
use crate::models::Service;
use tracing::debug;

impl ConfigGenerator {
    /// Merge the service's TCP routers and services into `section`
    ///
    /// Router and service names come from the labels themselves. An explicit
    /// address always wins over one synthesized from a port label.
    pub(super) fn add_tcp(&self, section: &mut TcpSection, service: &Service) {
        let keys = || {
            service
                .labels
                .iter()
                .filter_map(|(key, value)| Some((LabelKey::parse(key)?, value.as_str())))
                .filter(|(key, _)| key.protocol == "tcp")
        };

        for (key, value) in keys().filter(|(key, _)| key.kind == "routers") {
            let router = section.routers.entry(key.name.to_string()).or_default();
            match key.subkey {
                Some(ENTRYPOINTS) => router.entry_points = labels::split_list(value),
                Some(subkey) => {
                    router.fields.insert(subkey.to_string(), value.to_string());
                }
                None => {}
            }
        }

        let service_keys: Vec<_> = keys().filter(|(key, _)| key.kind == "services").collect();

        for (key, value) in &service_keys {
            let entry = section.services.entry(key.name.to_string()).or_default();
            if key.subkey == Some(SERVER_ADDRESS) {
                entry.load_balancer.servers.push(AddressServer {
                    address: value.to_string(),
                });
            }
        }

        let host = self.backend_host(service);
        for (key, value) in &service_keys {
            if key.subkey != Some(SERVER_PORT) {
                continue;
            }
            let Some(port) = labels::parse_port(value) else {
                debug!(
                    service = %service.name,
                    tcp_service = key.name,
                    value = %value,
                    "Ignoring invalid TCP port label"
                );
                continue;
            };
            let entry: &mut TcpService =
                section.services.entry(key.name.to_string()).or_default();
            if entry.load_balancer.servers.is_empty() {
                debug!(
                    service = %service.name,
                    tcp_service = key.name,
                    "Synthesizing TCP address from port"
                );
                entry.load_balancer.servers.push(AddressServer {
                    address: format!("{}:{}", host, port),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::generator::document::TcpRouter;

    fn tcp_service(name: &str, pairs: &[(&str, &str)]) -> Service {
        let mut service = Service::new(name, "postgres:16");
        service.labels = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        service
    }

    fn generate(config: GeneratorConfig, service: &Service) -> TcpSection {
        let mut section = TcpSection::default();
        ConfigGenerator::new(config, false).add_tcp(&mut section, service);
        section
    }

    #[test]
    fn test_tcp_router_fields() {
        let service = tcp_service(
            "db",
            &[
                ("routing.tcp.routers.pg.entrypoints", "postgres, backup ,"),
                ("routing.tcp.routers.pg.rule", "HostSNI(`*`)"),
                ("routing.tcp.routers.pg.service", "pg"),
                ("routing.tcp.services.pg.loadbalancer.server.port", "5432"),
            ],
        );

        let section = generate(GeneratorConfig::default(), &service);
        let router = &section.routers["pg"];
        assert_eq!(router.entry_points, vec!["postgres", "backup"]);
        assert_eq!(router.fields["rule"], "HostSNI(`*`)");
        assert_eq!(router.fields["service"], "pg");
        assert_eq!(
            section.services["pg"].load_balancer.servers,
            vec![AddressServer { address: "db:5432".to_string() }]
        );
    }

    #[test]
    fn test_tcp_explicit_address_wins_over_port() {
        let service = tcp_service(
            "db",
            &[
                ("routing.tcp.services.pg.loadbalancer.server.port", "5432"),
                ("routing.tcp.services.pg.loadbalancer.server.address", "10.0.0.9:5433"),
            ],
        );

        let section = generate(GeneratorConfig::default(), &service);
        assert_eq!(
            section.services["pg"].load_balancer.servers,
            vec![AddressServer { address: "10.0.0.9:5433".to_string() }]
        );
    }

    #[test]
    fn test_tcp_port_uses_backend_host() {
        let service = tcp_service(
            "cache",
            &[("routing.tcp.services.redis.loadbalancer.server.port", "6379")],
        );

        let mut config = GeneratorConfig::default();
        config.default_backend_host = Some("172.17.0.1".to_string());
        let section = generate(config, &service);
        assert_eq!(
            section.services["redis"].load_balancer.servers[0].address,
            "172.17.0.1:6379"
        );
    }

    #[test]
    fn test_tcp_invalid_port_is_ignored() {
        let service = tcp_service(
            "db",
            &[
                ("routing.tcp.services.pg.loadbalancer.server.port", "abc"),
                ("routing.tcp.services.replica.loadbalancer.server.port", " "),
                ("routing.tcp.services.backup.loadbalancer.server.port", "70000"),
                ("routing.tcp.services.ok.loadbalancer.server.port", " 5432 "),
            ],
        );

        let section = generate(GeneratorConfig::default(), &service);
        assert!(!section.services.contains_key("pg"));
        assert!(!section.services.contains_key("replica"));
        assert!(!section.services.contains_key("backup"));
        assert_eq!(
            section.services["ok"].load_balancer.servers,
            vec![AddressServer { address: "db:5432".to_string() }]
        );
    }

    #[test]
    fn test_bare_router_key_creates_empty_router() {
        let service = tcp_service("db", &[("routing.tcp.routers.pg", "x")]);
        let section = generate(GeneratorConfig::default(), &service);
        assert_eq!(section.routers["pg"], TcpRouter::default());
        assert!(section.services.is_empty());
    }
}
