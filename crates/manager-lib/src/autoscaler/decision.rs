//! Replica decisions
//!
//! Pure functions of one metric sample, the observed replica count and the
//! service's scaling config.

use crate::models::ScalingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Outcome of comparing a metric against thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScaleDecision {
    NoChange { replicas: u32 },
    Scale { from: u32, to: u32, direction: Direction },
}

impl ScaleDecision {
    /// Replica count the service should run
    pub fn desired(&self) -> u32 {
        match self {
            ScaleDecision::NoChange { replicas } => *replicas,
            ScaleDecision::Scale { to, .. } => *to,
        }
    }
}

/// Which sample a decision was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Cpu,
    Memory,
}

/// CPU when present, memory otherwise; `None` when neither is available
pub fn representative_metric(cpu: Option<f64>, memory: Option<f64>) -> Option<(MetricSource, f64)> {
    cpu.map(|v| (MetricSource::Cpu, v))
        .or_else(|| memory.map(|v| (MetricSource::Memory, v)))
}

/// Step the replica count by one towards the thresholds, within bounds
///
/// Scales up when `metric` is above `scale_up_threshold` and below the
/// ceiling, down when below `scale_down_threshold` and above the floor.
/// A count changed outside the loop is brought back into
/// `[min_replicas, max_replicas]` whatever the metric says.
pub fn decide(metric: f64, current: u32, config: &ScalingConfig) -> ScaleDecision {
    let stepped = if metric > config.scale_up_threshold && current < config.max_replicas {
        current.saturating_add(1)
    } else if metric < config.scale_down_threshold && current > config.min_replicas {
        current.saturating_sub(1)
    } else {
        current
    };
    let desired = stepped.max(config.min_replicas).min(config.max_replicas);

    if desired > current {
        ScaleDecision::Scale {
            from: current,
            to: desired,
            direction: Direction::Up,
        }
    } else if desired < current {
        ScaleDecision::Scale {
            from: current,
            to: desired,
            direction: Direction::Down,
        }
    } else {
        ScaleDecision::NoChange { replicas: current }
    }
}
