//! Scaling daemon
//!
//! Runs the autoscaler loop and serves health, readiness, Prometheus metrics
//! and the latest scaling decisions over HTTP.

pub mod api;
pub mod config;
