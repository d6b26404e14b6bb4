//! HTTP API for health checks, Prometheus metrics and scaling decisions

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use manager_lib::{
    autoscaler::{DecisionRecord, DecisionRegistry, OrchestrationMode},
    health::{ComponentStatus, HealthRegistry},
    observability::ScalerMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ScalerMetrics,
    pub decisions: Arc<DecisionRegistry>,
    pub mode: OrchestrationMode,
    pub dry_run: bool,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ScalerMetrics,
        decisions: Arc<DecisionRegistry>,
        mode: OrchestrationMode,
        dry_run: bool,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            decisions,
            mode,
            dry_run,
        }
    }
}

/// Body of `/api/v1/services`
#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub mode: OrchestrationMode,
    pub dry_run: bool,
    pub services: Vec<DecisionRecord>,
}

/// 200 while healthy or degraded, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Latest decision for every scalable service
async fn services(State(state): State<Arc<AppState>>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        mode: state.mode,
        dry_run: state.dry_run,
        services: state.decisions.list(),
    })
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/services", get(services))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
