//! Container status for compose services

use anyhow::{bail, Context, Result};
use manager_lib::autoscaler::ContainerRuntime;
use manager_lib::DockerCli;
use serde::Serialize;
use tabled::Tabled;

use super::load_report;
use crate::config::Settings;
use crate::output::{color_status, print_rows, print_warning};

const NOT_RUNNING: &str = "not running";

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Containers")]
    containers: String,
    #[tabled(rename = "Health")]
    health: String,
}

#[derive(Debug, Serialize)]
struct StatusEntry {
    service: String,
    running: u32,
    total: u32,
    health: String,
}

pub async fn status(settings: &Settings, only: Option<&str>) -> Result<()> {
    let mut services = load_report(settings)?.into_services();
    if let Some(name) = only {
        services.retain(|service| service.name == name);
        if services.is_empty() {
            bail!(
                "Service '{}' not found in {}",
                name,
                settings.manager.compose_file.display()
            );
        }
    }

    let runtime = DockerCli::new(&settings.manager.compose_file);
    let mode = runtime
        .detect_mode()
        .await
        .context("Failed to query the container runtime")?;

    let mut entries = Vec::with_capacity(services.len());
    for service in &services {
        let entry = match runtime.status(&service.name, mode).await {
            Ok(status) => StatusEntry {
                service: service.name.clone(),
                running: status.running,
                total: status.total,
                health: status
                    .health()
                    .map(|health| health.to_string())
                    .unwrap_or_else(|| NOT_RUNNING.to_string()),
            },
            Err(e) => {
                print_warning(&format!("{}: {}", service.name, e));
                StatusEntry {
                    service: service.name.clone(),
                    running: 0,
                    total: 0,
                    health: "unknown".to_string(),
                }
            }
        };
        entries.push(entry);
    }

    let rows: Vec<StatusRow> = entries
        .iter()
        .map(|entry| StatusRow {
            service: entry.service.clone(),
            containers: format!("{}/{}", entry.running, entry.total),
            health: color_status(&entry.health),
        })
        .collect();

    print_rows(&rows, &entries, settings.format)
}
