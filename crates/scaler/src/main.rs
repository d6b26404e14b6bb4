//! tsm-scaler - threshold autoscaler daemon
//!
//! Re-reads the compose file on every tick, samples each scalable service
//! from Prometheus and steps its replica count through the docker CLI.

use anyhow::{Context, Result};
use manager_lib::{
    autoscaler::{AutoscalerBuilder, ContainerRuntime, DecisionRegistry, DockerCli},
    config::ManagerConfig,
    discovery::ServiceDiscovery,
    health::{components, HealthRegistry},
    metrics::PrometheusClient,
    observability::{ScalerMetrics, StructuredLogger},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tsm_scaler::{api, config::ScalerConfig};

const SCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting tsm-scaler");

    let scaler_config = ScalerConfig::load()?;
    let config = ManagerConfig::load(scaler_config.config_path.as_deref())
        .context("Failed to load manager configuration")?;
    info!(
        compose_file = %config.compose_file.display(),
        prometheus = %config.prometheus.url,
        interval_secs = config.autoscaler.check_interval_secs,
        "Scaler configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    // A missing or unreadable compose file aborts startup
    let report = ServiceDiscovery::default()
        .discover_report(&config.compose_file)
        .context("Initial discovery failed")?;
    for (name, reason) in report.skipped() {
        warn!(service = name, reason = reason, "Service skipped during discovery");
    }

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(&config.compose_file));
    let mode = runtime
        .detect_mode()
        .await
        .context("Container runtime is unreachable")?;

    let metrics_provider = Arc::new(
        PrometheusClient::new(&config.prometheus).context("Failed to create Prometheus client")?,
    );

    let metrics = ScalerMetrics::new();
    let logger = StructuredLogger::new(&scaler_config.host_name);
    logger.log_startup(SCALER_VERSION, mode, config.autoscaler.dry_run);

    let decisions = Arc::new(DecisionRegistry::new());
    let autoscaler = AutoscalerBuilder::new()
        .config(&config)
        .metrics_provider(metrics_provider)
        .runtime(runtime)
        .mode(mode)
        .decisions(decisions.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()
        .await?;

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        decisions,
        mode,
        config.autoscaler.dry_run,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(scaler_config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(autoscaler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Autoscaler task ended abnormally");
    }
    health_registry
        .set_unhealthy(components::AUTOSCALER, "Stopped")
        .await;
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
