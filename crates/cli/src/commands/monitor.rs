//! Foreground autoscaler

use anyhow::{Context, Result};
use manager_lib::autoscaler::{DecisionRecord, Outcome};
use manager_lib::{AutoscalerBuilder, DockerCli, PrometheusClient, StructuredLogger};
use std::sync::Arc;
use tabled::Tabled;
use tokio::sync::watch;

use super::load_report;
use crate::config::Settings;
use crate::output::{color_status, print_info, print_rows};

#[derive(Tabled)]
struct DecisionRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
}

impl From<&DecisionRecord> for DecisionRow {
    fn from(record: &DecisionRecord) -> Self {
        let replicas = match (record.current_replicas, record.desired_replicas) {
            (Some(current), Some(desired)) if record.outcome != Outcome::Unchanged => {
                format!("{} -> {}", current, desired)
            }
            (Some(current), _) => current.to_string(),
            _ => "-".to_string(),
        };

        Self {
            service: record.service.clone(),
            outcome: color_status(&record.outcome.to_string()),
            metric: record
                .metric
                .map(|metric| format!("{:.1}", metric))
                .unwrap_or_else(|| "-".to_string()),
            replicas,
        }
    }
}

/// Run the scaling loop until Ctrl+C, then print the last decisions
pub async fn monitor(mut settings: Settings, dry_run: bool, interval: Option<u64>) -> Result<()> {
    if dry_run {
        settings.manager.autoscaler.dry_run = true;
    }
    if let Some(interval) = interval {
        settings.manager.autoscaler.check_interval_secs = interval;
    }
    settings
        .manager
        .validate()
        .context("Invalid autoscaler settings")?;

    // A compose file that cannot be loaded aborts before the loop starts
    load_report(&settings)?;

    let config = &settings.manager;
    let metrics = PrometheusClient::new(&config.prometheus)
        .context("Failed to create Prometheus client")?;
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());

    let autoscaler = AutoscalerBuilder::new()
        .config(config)
        .metrics_provider(Arc::new(metrics))
        .runtime(Arc::new(DockerCli::new(&config.compose_file)))
        .logger(StructuredLogger::new(host))
        .build()
        .await
        .context("Failed to start autoscaler")?;

    let decisions = autoscaler.decisions();
    print_info(&format!(
        "Monitoring {} every {}s in {} mode{} (Ctrl+C to stop)",
        config.compose_file.display(),
        config.autoscaler.check_interval_secs,
        autoscaler.mode(),
        if config.autoscaler.dry_run { ", dry run" } else { "" }
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(autoscaler.run(shutdown_rx));

    tokio::select! {
        result = &mut handle => {
            result.context("Autoscaler task failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            print_info("Stopping autoscaler");
            shutdown_tx.send_replace(true);
            handle.await.context("Autoscaler task failed")?;
        }
    }

    let records = decisions.list();
    let rows: Vec<DecisionRow> = records.iter().map(DecisionRow::from).collect();
    print_rows(&rows, &records, settings.format)
}
