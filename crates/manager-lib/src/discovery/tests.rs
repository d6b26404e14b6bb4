//! Discovery tests against compose files on disk
//!
//! These write real compose documents to a temp directory and run the full
//! load-and-build path.

#[cfg(test)]
mod compose_file_tests {
    use crate::discovery::{
        dependency_graph, hosts_line, routing_enabled, scalable, services_by_network,
        ServiceDiscovery,
    };
    use crate::error::InventoryError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_compose(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("docker-compose.yml");
        std::fs::write(&path, content).unwrap();
        path
    }

    const STACK: &str = r#"
version: '3.8'
services:
  web:
    image: nginx:1.25
    ports:
      - "8080:80"
    networks: [frontend]
    labels:
      - "routing.enable=true"
      - "routing.http.routers.web.rule=Host(`web.example.com`)"
    depends_on: [api]
  api:
    image: python:3.12
    ports:
      - "8081:8000"
    networks: [frontend, backend]
    depends_on:
      db:
        condition: service_healthy
    deploy:
      labels:
        routing.enable: "true"
        routing.http.routers.api.rule: Host(`api.example.com`)
        scaling.enabled: "true"
        scaling.min_replicas: "2"
        scaling.max_replicas: "6"
        scaling.priority: high
  broken:
    image: busybox
    ports: "not-a-list"
  db:
    image: postgres:16
    networks: [backend]
"#;

    #[test]
    fn test_discover_skips_broken_entry() {
        let dir = TempDir::new().unwrap();
        let path = write_compose(&dir, STACK);

        let report = ServiceDiscovery::default().discover_report(&path).unwrap();
        let skipped = report.skipped();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].0, "broken");

        let services = report.into_services();
        let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["web", "api", "db"]);
    }

    #[test]
    fn test_discover_basic_web_service() {
        let dir = TempDir::new().unwrap();
        let path = write_compose(&dir, STACK);

        let services = ServiceDiscovery::default().discover_services(&path).unwrap();
        let web = services.iter().find(|s| s.name == "web").unwrap();

        assert_eq!(web.image, "nginx:1.25");
        assert!(web.routing_enabled);
        assert_eq!(web.routing_rule.as_deref(), Some("Host(`web.example.com`)"));
        assert_eq!(web.main_port(), Some(80));
        assert_eq!(web.domain_names(), vec!["web.example.com".to_string()]);
        assert!(web.scaling.is_none());
    }

    #[test]
    fn test_supporting_queries() {
        let dir = TempDir::new().unwrap();
        let path = write_compose(&dir, STACK);
        let services = ServiceDiscovery::default().discover_services(&path).unwrap();

        let graph = dependency_graph(&services);
        assert!(graph["web"].contains("api"));
        assert!(graph["api"].contains("db"));
        assert!(graph["db"].is_empty());

        let networks = services_by_network(&services);
        assert_eq!(networks["frontend"], vec!["web", "api"]);
        assert_eq!(networks["backend"], vec!["api", "db"]);

        let routed: Vec<_> = routing_enabled(&services).iter().map(|s| s.name.clone()).collect();
        assert_eq!(routed, vec!["web", "api"]);

        let scalable: Vec<_> = scalable(&services).iter().map(|s| s.name.clone()).collect();
        assert_eq!(scalable, vec!["api"]);
    }

    #[test]
    fn test_hosts_line_sorted_and_unique() {
        let dir = TempDir::new().unwrap();
        let path = write_compose(&dir, STACK);
        let services = ServiceDiscovery::default().discover_services(&path).unwrap();

        assert_eq!(
            hosts_line(&services, "10.0.0.5").as_deref(),
            Some("10.0.0.5 api.example.com web.example.com")
        );
        assert_eq!(hosts_line(&services[2..], "10.0.0.5"), None);
    }

    #[test]
    fn test_discover_empty_services() {
        let dir = TempDir::new().unwrap();
        let path = write_compose(&dir, "version: '3.8'\nservices: {}\n");

        let services = ServiceDiscovery::default().discover_services(&path).unwrap();
        assert!(services.is_empty());
    }

    #[test]
    fn test_discover_missing_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = ServiceDiscovery::default().discover_services(&dir.path().join("nope.yml"));
        assert!(matches!(result, Err(InventoryError::NotFound(_))));
    }

    #[test]
    fn test_rediscovery_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = write_compose(&dir, STACK);
        let discovery = ServiceDiscovery::default();

        let first = discovery.discover_services(&path).unwrap();
        let second = discovery.discover_services(&path).unwrap();
        assert_eq!(first, second);
    }
}
