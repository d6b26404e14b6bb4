//! Last decision per service, shared with the daemon API

use super::decision::MetricSource;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What the loop did with a service in its latest sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Unchanged,
    Scaled,
    DryRun,
    CooldownActive,
    NoMetrics,
    NoContainers,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Unchanged => "unchanged",
            Outcome::Scaled => "scaled",
            Outcome::DryRun => "dry_run",
            Outcome::CooldownActive => "cooldown_active",
            Outcome::NoMetrics => "no_metrics",
            Outcome::NoContainers => "no_containers",
            Outcome::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub service: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_source: Option<MetricSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_replicas: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_replicas: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: i64,
}

impl DecisionRecord {
    pub fn new(service: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            service: service.into(),
            outcome,
            metric_source: None,
            metric: None,
            current_replicas: None,
            desired_replicas: None,
            message: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_metric(mut self, source: MetricSource, value: f64) -> Self {
        self.metric_source = Some(source);
        self.metric = Some(value);
        self
    }

    pub fn with_replicas(mut self, current: u32, desired: u32) -> Self {
        self.current_replicas = Some(current);
        self.desired_replicas = Some(desired);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Concurrent map of service name to its latest decision
#[derive(Debug, Default)]
pub struct DecisionRegistry {
    records: DashMap<String, DecisionRecord>,
}

impl DecisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: DecisionRecord) {
        self.records.insert(record.service.clone(), record);
    }

    pub fn get(&self, service: &str) -> Option<DecisionRecord> {
        self.records.get(service).map(|r| r.clone())
    }

    /// All records ordered by service name
    pub fn list(&self) -> Vec<DecisionRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.service.cmp(&b.service));
        records
    }

    /// Drop records for services that are no longer scalable
    pub fn retain_services(&self, services: &BTreeSet<String>) {
        self.records.retain(|name, _| services.contains(name));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
