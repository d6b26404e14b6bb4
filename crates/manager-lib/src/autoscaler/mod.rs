//! Threshold autoscaler
//!
//! A timer-driven loop. Every tick re-discovers the compose file, samples
//! each scalable service and steps its replica count by at most one. The
//! loop is the only writer of replica counts, so it holds no locks; it
//! always re-reads the observed count before deciding.

mod decision;
mod registry;
pub mod runtime;


pub use decision::{decide, representative_metric, Direction, MetricSource, ScaleDecision};
pub use registry::{DecisionRecord, DecisionRegistry, Outcome};
pub use runtime::{
    ContainerRuntime, DockerCli, HealthState, OrchestrationMode, ServiceStatus,
};

use crate::config::{AutoscalerConfig, ManagerConfig, PrometheusConfig};
use crate::discovery::{self, ServiceDiscovery};
use crate::health::{components, HealthRegistry};
use crate::metrics::{render_query, MetricsProvider};
use crate::models::{ScalingConfig, Service};
use crate::observability::{ScalerMetrics, StructuredLogger};
use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Where the loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Checking,
    Stopped,
}

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub scalable: usize,
    pub scaled: usize,
    pub dry_run: usize,
    pub unchanged: usize,
    /// No metrics, no containers, or still cooling down
    pub skipped: usize,
    pub failed: usize,
    /// Set when the sweep ended early on a stop signal
    pub interrupted: bool,
}

/// Last issued scale per direction, for cooldown gating
#[derive(Debug, Default)]
struct Cooldown {
    last_up: Option<Instant>,
    last_down: Option<Instant>,
}

impl Cooldown {
    /// Remaining wait before another scale in `direction` is allowed
    fn remaining(&self, direction: Direction, config: &ScalingConfig) -> Option<u64> {
        let (last, window) = match direction {
            Direction::Up => (self.last_up, config.scale_up_cooldown_secs),
            Direction::Down => (self.last_down, config.scale_down_cooldown_secs),
        };
        let elapsed = last?.elapsed().as_secs();
        (elapsed < window).then(|| window - elapsed)
    }

    fn mark(&mut self, direction: Direction) {
        let now = Instant::now();
        match direction {
            Direction::Up => self.last_up = Some(now),
            Direction::Down => self.last_down = Some(now),
        }
    }
}

/// Autoscaler control loop
pub struct Autoscaler {
    compose_file: PathBuf,
    discovery: ServiceDiscovery,
    metrics: Arc<dyn MetricsProvider>,
    runtime: Arc<dyn ContainerRuntime>,
    queries: PrometheusConfig,
    settings: AutoscalerConfig,
    mode: OrchestrationMode,
    decisions: Arc<DecisionRegistry>,
    health: Option<HealthRegistry>,
    cooldowns: HashMap<String, Cooldown>,
    state: watch::Sender<LoopState>,
    observability: ScalerMetrics,
    logger: StructuredLogger,
}

impl Autoscaler {
    /// Observe loop state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn decisions(&self) -> Arc<DecisionRegistry> {
        self.decisions.clone()
    }

    pub fn mode(&self) -> OrchestrationMode {
        self.mode
    }

    /// Run sweeps on every tick until `shutdown` carries `true` or its sender is dropped
    ///
    /// The first sweep starts immediately. A stop signal interrupts the wait
    /// and is also checked between services inside a sweep.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.check_interval_secs,
            dry_run = self.settings.dry_run,
            mode = %self.mode,
            "Starting autoscaler loop"
        );

        let mut ticker = interval(self.settings.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(&shutdown).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(LoopState::Stopped);
        info!("Autoscaler loop stopped");
    }

    /// One pass over every scalable service
    pub async fn sweep(&mut self, shutdown: &watch::Receiver<bool>) -> SweepSummary {
        self.state.send_replace(LoopState::Checking);
        let start = Instant::now();
        let mut summary = SweepSummary::default();

        let services = match self.discovery.discover_services(&self.compose_file) {
            Ok(services) => {
                self.report(components::DISCOVERY, None).await;
                services
            }
            Err(e) => {
                warn!(error = %e, "Discovery failed, skipping sweep");
                self.report(components::DISCOVERY, Some(e.to_string())).await;
                self.state.send_replace(LoopState::Idle);
                return summary;
            }
        };

        let scalable: Vec<Service> = discovery::scalable(&services).into_iter().cloned().collect();
        summary.scalable = scalable.len();

        let names: BTreeSet<String> = scalable.iter().map(|s| s.name.clone()).collect();
        self.decisions.retain_services(&names);
        self.cooldowns.retain(|name, _| names.contains(name));

        let mut runtime_error = None;
        let mut metric_misses = 0;

        for service in &scalable {
            if *shutdown.borrow() {
                debug!("Stop requested mid-sweep");
                summary.interrupted = true;
                break;
            }

            let record = self.check_service(service).await;
            match record.outcome {
                Outcome::Scaled => summary.scaled += 1,
                Outcome::DryRun => summary.dry_run += 1,
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::NoMetrics => {
                    metric_misses += 1;
                    summary.skipped += 1;
                }
                Outcome::NoContainers | Outcome::CooldownActive => summary.skipped += 1,
                Outcome::Failed => {
                    summary.failed += 1;
                    runtime_error = record.message.clone();
                }
            }
            self.decisions.record(record);
        }

        self.report(components::RUNTIME, runtime_error).await;
        let metrics_problem = (metric_misses > 0 && metric_misses == summary.scalable)
            .then(|| "No metric samples for any scalable service".to_string());
        if let Some(health) = &self.health {
            match metrics_problem {
                Some(message) => health.set_degraded(components::METRICS_PROVIDER, message).await,
                None => health.set_healthy(components::METRICS_PROVIDER).await,
            }
            health.set_healthy(components::AUTOSCALER).await;
        }

        let elapsed = start.elapsed();
        self.observability
            .observe_sweep(elapsed.as_secs_f64(), summary.scalable);
        self.logger.log_sweep(&summary, elapsed.as_millis());

        self.state.send_replace(LoopState::Idle);
        summary
    }

    /// Decide for one service and act on the decision
    async fn check_service(&mut self, service: &Service) -> DecisionRecord {
        let name = service.name.as_str();
        let Some(config) = service.scaling.as_ref() else {
            return DecisionRecord::new(name, Outcome::Unchanged);
        };

        let status = match self.runtime.status(name, self.mode).await {
            Ok(status) => status,
            Err(e) => {
                warn!(service = name, error = %e, "Failed to read service status");
                return DecisionRecord::new(name, Outcome::Failed).with_message(e.to_string());
            }
        };
        if status.total == 0 {
            debug!(service = name, "No containers, skipping");
            return DecisionRecord::new(name, Outcome::NoContainers);
        }
        let current = status.running;

        let cpu_query = render_query(&self.queries.cpu_query, name);
        let memory_query = render_query(&self.queries.memory_query, name);
        let (cpu, memory) = tokio::join!(
            self.metrics.query(&cpu_query),
            self.metrics.query(&memory_query)
        );

        let Some((source, metric)) = representative_metric(cpu, memory) else {
            debug!(service = name, "No metrics available, skipping");
            self.observability.inc_metric_miss();
            return DecisionRecord::new(name, Outcome::NoMetrics);
        };

        let record = DecisionRecord::new(name, Outcome::Unchanged).with_metric(source, metric);

        let (from, to, direction) = match decide(metric, current, config) {
            ScaleDecision::NoChange { replicas } => {
                debug!(service = name, metric, replicas, "Within thresholds");
                return record.with_replicas(current, replicas);
            }
            ScaleDecision::Scale {
                from,
                to,
                direction,
            } => (from, to, direction),
        };
        let record = record.with_replicas(from, to);

        if self.settings.respect_cooldowns {
            let cooldown = self.cooldowns.entry(name.to_string()).or_default();
            if let Some(remaining) = cooldown.remaining(direction, config) {
                info!(
                    service = name,
                    direction = %direction,
                    remaining_secs = remaining,
                    "Scale suppressed by cooldown"
                );
                return DecisionRecord {
                    outcome: Outcome::CooldownActive,
                    ..record
                }
                .with_message(format!("scale {} cooldown, {}s remaining", direction, remaining));
            }
        }

        if self.settings.dry_run {
            self.logger.log_dry_run(name, from, to, direction, metric);
            self.observability.inc_scale_action(direction, false);
            return DecisionRecord {
                outcome: Outcome::DryRun,
                ..record
            };
        }

        self.logger
            .log_scale_action(name, from, to, direction, metric, self.mode);
        match self.runtime.scale(name, to, self.mode).await {
            Ok(()) => {
                self.observability.inc_scale_action(direction, true);
                self.cooldowns.entry(name.to_string()).or_default().mark(direction);
                DecisionRecord {
                    outcome: Outcome::Scaled,
                    ..record
                }
            }
            Err(e) => {
                self.logger.log_scale_failure(name, to, &e.to_string());
                self.observability.inc_scale_failure();
                DecisionRecord {
                    outcome: Outcome::Failed,
                    ..record
                }
                .with_message(e.to_string())
            }
        }
    }

    async fn report(&self, component: &str, problem: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };
        match problem {
            Some(message) => health.set_degraded(component, message).await,
            None => health.set_healthy(component).await,
        }
    }
}

/// Builder for the autoscaler loop
pub struct AutoscalerBuilder {
    compose_file: PathBuf,
    discovery: ServiceDiscovery,
    metrics: Option<Arc<dyn MetricsProvider>>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    queries: PrometheusConfig,
    settings: AutoscalerConfig,
    mode: Option<OrchestrationMode>,
    decisions: Option<Arc<DecisionRegistry>>,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
}

impl AutoscalerBuilder {
    pub fn new() -> Self {
        let config = ManagerConfig::default();
        Self {
            compose_file: config.compose_file,
            discovery: ServiceDiscovery::default(),
            metrics: None,
            runtime: None,
            queries: config.prometheus,
            settings: config.autoscaler,
            mode: None,
            decisions: None,
            health: None,
            logger: StructuredLogger::new("localhost"),
        }
    }

    /// Take the compose file, metric queries and loop settings from `config`
    pub fn config(mut self, config: &ManagerConfig) -> Self {
        self.compose_file = config.compose_file.clone();
        self.queries = config.prometheus.clone();
        self.settings = config.autoscaler.clone();
        self
    }

    pub fn discovery(mut self, discovery: ServiceDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn metrics_provider(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Skip detection and use this mode
    pub fn mode(mut self, mode: OrchestrationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn decisions(mut self, decisions: Arc<DecisionRegistry>) -> Self {
        self.decisions = Some(decisions);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the loop, detecting the orchestration mode unless one was set
    pub async fn build(self) -> Result<Autoscaler> {
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics provider is required"))?;
        let runtime = self
            .runtime
            .ok_or_else(|| anyhow::anyhow!("Container runtime is required"))?;

        let mode = match self.mode {
            Some(mode) => mode,
            None => runtime.detect_mode().await?,
        };

        let (state, _) = watch::channel(LoopState::Idle);

        Ok(Autoscaler {
            compose_file: self.compose_file,
            discovery: self.discovery,
            metrics,
            runtime,
            queries: self.queries,
            settings: self.settings,
            mode,
            decisions: self.decisions.unwrap_or_default(),
            health: self.health,
            cooldowns: HashMap::new(),
            state,
            observability: ScalerMetrics::new(),
            logger: self.logger,
        })
    }
}

impl Default for AutoscalerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
