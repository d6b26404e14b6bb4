//! Service manager library
//!
//! This crate provides the core functionality for:
//! - Service discovery from compose files and their routing/scaling labels
//! - Routing document generation for the reverse proxy
//! - Threshold autoscaling against a metrics backend
//! - Health checks and observability for the scaling daemon

pub mod autoscaler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod generator;
pub mod health;
pub mod inventory;
pub mod labels;
pub mod metrics;
pub mod models;
pub mod observability;

pub use autoscaler::{Autoscaler, AutoscalerBuilder, DockerCli, OrchestrationMode};
pub use config::ManagerConfig;
pub use discovery::ServiceDiscovery;
pub use generator::{ConfigGenerator, RoutingDocument};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use metrics::{MetricsProvider, PrometheusClient};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
