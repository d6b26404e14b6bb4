//! Container runtime control
//!
//! Replica counts are read and changed through the `docker` CLI. The
//! orchestration mode decides which commands apply and is detected once at
//! startup.

use crate::error::RuntimeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How replicas are managed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationMode {
    Compose,
    Swarm,
}

impl fmt::Display for OrchestrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationMode::Compose => f.write_str("compose"),
            OrchestrationMode::Swarm => f.write_str("swarm"),
        }
    }
}

/// Coarse service health derived from container counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => f.write_str("healthy"),
            HealthState::Degraded => f.write_str("degraded"),
            HealthState::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// Observed container counts for one service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: u32,
    pub total: u32,
}

impl ServiceStatus {
    /// `None` when the service has no containers at all
    pub fn health(&self) -> Option<HealthState> {
        if self.total == 0 {
            None
        } else if self.running == self.total {
            Some(HealthState::Healthy)
        } else if self.running > 0 {
            Some(HealthState::Degraded)
        } else {
            Some(HealthState::Unhealthy)
        }
    }
}

/// Reads and changes service replica counts
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Detect whether the host is an active swarm node
    async fn detect_mode(&self) -> Result<OrchestrationMode, RuntimeError>;

    /// Current container counts for a service
    async fn status(
        &self,
        service: &str,
        mode: OrchestrationMode,
    ) -> Result<ServiceStatus, RuntimeError>;

    /// Set the replica count of a service
    async fn scale(
        &self,
        service: &str,
        replicas: u32,
        mode: OrchestrationMode,
    ) -> Result<(), RuntimeError>;
}

/// `docker` CLI backed runtime
#[derive(Debug, Clone)]
pub struct DockerCli {
    compose_file: PathBuf,
}

impl DockerCli {
    pub fn new(compose_file: impl Into<PathBuf>) -> Self {
        Self {
            compose_file: compose_file.into(),
        }
    }

    async fn compose_scale(&self, service: &str, replicas: u32) -> Result<(), RuntimeError> {
        let file = self.compose_file.to_string_lossy().into_owned();
        let scale = format!("{}={}", service, replicas);
        let args = ["-f", file.as_str(), "up", "-d", "--scale", scale.as_str(), "--no-recreate"];

        let mut plugin_args = vec!["compose"];
        plugin_args.extend_from_slice(&args);

        match run("docker", &plugin_args).await {
            Ok(_) => Ok(()),
            Err(error) => {
                warn!(error = %error, "docker compose failed, retrying with docker-compose");
                run("docker-compose", &args).await.map(|_| ())
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn detect_mode(&self) -> Result<OrchestrationMode, RuntimeError> {
        let state = run("docker", &["info", "--format", "{{.Swarm.LocalNodeState}}"]).await?;
        let mode = if state.trim() == "active" {
            OrchestrationMode::Swarm
        } else {
            OrchestrationMode::Compose
        };
        info!(mode = %mode, "Detected orchestration mode");
        Ok(mode)
    }

    async fn status(
        &self,
        service: &str,
        mode: OrchestrationMode,
    ) -> Result<ServiceStatus, RuntimeError> {
        match mode {
            OrchestrationMode::Compose => {
                let filter = format!("label=com.docker.compose.service={}", service);
                let args = ["ps", "-a", "--filter", filter.as_str(), "--format", "{{.State}}"];
                let output = run("docker", &args).await?;
                Ok(parse_container_states(&output))
            }
            OrchestrationMode::Swarm => {
                let filter = format!("name={}", service);
                let command = format!("docker service ls --filter {}", filter);
                let output = run(
                    "docker",
                    &["service", "ls", "--filter", filter.as_str(), "--format", "{{.Replicas}}"],
                )
                .await?;
                parse_swarm_replicas(&output).ok_or(RuntimeError::UnexpectedOutput {
                    command,
                    output: output.trim().to_string(),
                })
            }
        }
    }

    async fn scale(
        &self,
        service: &str,
        replicas: u32,
        mode: OrchestrationMode,
    ) -> Result<(), RuntimeError> {
        info!(service, replicas, mode = %mode, "Scaling service");
        match mode {
            OrchestrationMode::Compose => self.compose_scale(service, replicas).await,
            OrchestrationMode::Swarm => {
                let target = format!("{}={}", service, replicas);
                run("docker", &["service", "scale", target.as_str()]).await.map(|_| ())
            }
        }
    }
}

/// Run a command to completion, returning its stdout
async fn run(program: &str, args: &[&str]) -> Result<String, RuntimeError> {
    let command = format!("{} {}", program, args.join(" "));
    debug!(command = %command, "Running command");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| RuntimeError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(RuntimeError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One container state per line; `running` lines count as running
pub fn parse_container_states(output: &str) -> ServiceStatus {
    let states: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    ServiceStatus {
        running: states.iter().filter(|state| **state == "running").count() as u32,
        total: states.len() as u32,
    }
}

/// `running/desired`, optionally followed by a note such as `(max 1 per node)`
pub fn parse_swarm_replicas(output: &str) -> Option<ServiceStatus> {
    let Some(line) = output.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return Some(ServiceStatus::default());
    };

    let field = line.split_whitespace().next()?;
    let (running, total) = field.split_once('/')?;

    Some(ServiceStatus {
        running: running.parse().ok()?,
        total: total.parse().ok()?,
    })
}
