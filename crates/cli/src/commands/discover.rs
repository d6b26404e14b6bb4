//! Service discovery listing

use anyhow::Result;
use manager_lib::Service;
use serde::Serialize;
use tabled::Tabled;

use super::load_report;
use crate::config::Settings;
use crate::output::{join_or_dash, print_rows, yes_no};

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Ports")]
    ports: String,
    #[tabled(rename = "Routed")]
    routed: String,
    #[tabled(rename = "Domains")]
    domains: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
}

impl From<&Service> for ServiceRow {
    fn from(service: &Service) -> Self {
        let ports: Vec<String> = service.ports.iter().map(ToString::to_string).collect();
        let replicas = match &service.scaling {
            Some(scaling) if scaling.enabled => {
                format!("{}-{}", scaling.min_replicas, scaling.max_replicas)
            }
            _ => "-".to_string(),
        };

        Self {
            name: service.name.clone(),
            image: service.image.clone(),
            ports: join_or_dash(&ports),
            routed: yes_no(service.routing_enabled),
            domains: join_or_dash(&service.domain_names()),
            replicas,
        }
    }
}

#[derive(Serialize)]
struct SkippedEntry<'a> {
    name: &'a str,
    reason: &'a str,
}

#[derive(Serialize)]
struct DiscoverView<'a> {
    services: &'a [Service],
    skipped: Vec<SkippedEntry<'a>>,
}

/// List every discovered service
pub fn discover(settings: &Settings) -> Result<()> {
    let report = load_report(settings)?;
    let services = report.services();

    let rows: Vec<ServiceRow> = services.iter().map(ServiceRow::from).collect();
    let view = DiscoverView {
        services: &services,
        skipped: report
            .skipped()
            .into_iter()
            .map(|(name, reason)| SkippedEntry { name, reason })
            .collect(),
    };

    print_rows(&rows, &view, settings.format)
}
