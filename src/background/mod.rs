//! Self-Healer — periodic health check loop (spec §7, "Health and
//! recovery").
//!
//! Monitors queue backlog, worker pool saturation, and store write
//! failures. None of these checks can truly "heal" the underlying
//! condition (a pile-up clears itself once devices respond; a saturated
//! pool needs more capacity, not a restart) — true to the teacher's own
//! checks, `heal()` here mostly logs and reports, it doesn't pretend to
//! fix what it can't.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::QueueBroker;
use crate::workers::PoolMetrics;

#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded { reason } => write!(f, "DEGRADED: {reason}"),
            HealthStatus::Unhealthy { reason } => write!(f, "UNHEALTHY: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum HealAction {
    Reconnected,
    FallbackActivated,
    NoActionNeeded,
    ManualInterventionRequired { reason: String },
}

impl std::fmt::Display for HealAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealAction::Reconnected => write!(f, "reconnected"),
            HealAction::FallbackActivated => write!(f, "fallback activated"),
            HealAction::NoActionNeeded => write!(f, "no action needed"),
            HealAction::ManualInterventionRequired { reason } => {
                write!(f, "manual intervention required: {reason}")
            }
        }
    }
}

pub trait HealthCheck: Send + Sync {
    fn component_name(&self) -> &str;
    fn check(&self) -> HealthStatus;
    fn heal(&self) -> HealAction;
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_checked: Instant,
    pub last_action: Option<HealAction>,
}

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub components: Vec<ComponentHealth>,
    pub overall: HealthStatus,
    pub check_cycles: u64,
}

impl SystemHealth {
    fn new() -> Self {
        Self {
            components: Vec::new(),
            overall: HealthStatus::Healthy,
            check_cycles: 0,
        }
    }
}

/// Flags a queue backlog that isn't draining (spec §7, "Queue backlog").
/// Degraded past `warn_depth`, unhealthy past `critical_depth` — which is
/// a few cadence ticks' worth of work stuck behind a slow worker pool.
pub struct QueueBacklogHealthCheck {
    name: &'static str,
    depth: Arc<std::sync::atomic::AtomicUsize>,
    warn_depth: usize,
    critical_depth: usize,
}

impl QueueBacklogHealthCheck {
    pub fn new(
        name: &'static str,
        depth: Arc<std::sync::atomic::AtomicUsize>,
        warn_depth: usize,
        critical_depth: usize,
    ) -> Self {
        Self {
            name,
            depth,
            warn_depth,
            critical_depth,
        }
    }
}

impl HealthCheck for QueueBacklogHealthCheck {
    fn component_name(&self) -> &str {
        self.name
    }

    fn check(&self) -> HealthStatus {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth >= self.critical_depth {
            HealthStatus::Unhealthy {
                reason: format!("{depth} tasks queued, at or above critical depth {}", self.critical_depth),
            }
        } else if depth >= self.warn_depth {
            HealthStatus::Degraded {
                reason: format!("{depth} tasks queued, above warn depth {}", self.warn_depth),
            }
        } else {
            HealthStatus::Healthy
        }
    }

    fn heal(&self) -> HealAction {
        warn!(queue = self.name, "queue backlog growing — check worker pool capacity and device reachability");
        HealAction::ManualInterventionRequired {
            reason: format!("{} backlog requires more worker capacity or a reachability fix, not a restart", self.name),
        }
    }
}

impl QueueBacklogHealthCheck {
    pub fn for_broker(broker: &QueueBroker) -> Vec<QueueBacklogHealthCheck> {
        vec![
            QueueBacklogHealthCheck::new("alerts queue", broker.alerts.depth_handle(), 500, 2_000),
            QueueBacklogHealthCheck::new("monitoring queue", broker.monitoring.depth_handle(), 2_000, 8_000),
            QueueBacklogHealthCheck::new("snmp queue", broker.snmp.depth_handle(), 2_000, 8_000),
            QueueBacklogHealthCheck::new("maintenance queue", broker.maintenance.depth_handle(), 200, 1_000),
        ]
    }
}

/// Flags a worker pool running at or near full concurrent capacity,
/// meaning tasks queue behind busy workers rather than starting
/// immediately.
pub struct WorkerPoolHealthCheck {
    name: &'static str,
    metrics: Arc<PoolMetrics>,
    pool_size: usize,
}

impl WorkerPoolHealthCheck {
    pub fn new(name: &'static str, metrics: Arc<PoolMetrics>, pool_size: usize) -> Self {
        Self {
            name,
            metrics,
            pool_size,
        }
    }
}

impl HealthCheck for WorkerPoolHealthCheck {
    fn component_name(&self) -> &str {
        self.name
    }

    fn check(&self) -> HealthStatus {
        let busy = self.metrics.busy.load(Ordering::Relaxed) as usize;
        let consecutive_failures = self.metrics.consecutive_probe_failures.load(Ordering::Relaxed);
        if consecutive_failures >= 50 {
            return HealthStatus::Unhealthy {
                reason: format!("{consecutive_failures} consecutive probe failures"),
            };
        }
        if busy >= self.pool_size {
            HealthStatus::Degraded {
                reason: format!("all {} workers busy", self.pool_size),
            }
        } else {
            HealthStatus::Healthy
        }
    }

    fn heal(&self) -> HealAction {
        warn!(pool = self.name, "worker pool saturated");
        HealAction::NoActionNeeded
    }
}

/// Counts consecutive relational/TSDB write failures. Incremented by the
/// Gateway's callers on error, reset to zero on the next success (spec
/// §7, "Relational store failure" / "TSDB store failure").
#[derive(Default)]
pub struct StoreFailureTracker {
    consecutive_failures: AtomicU64,
}

impl StoreFailureTracker {
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct StoreHealthCheck {
    tracker: Arc<StoreFailureTracker>,
    retry_budget: u64,
}

impl StoreHealthCheck {
    pub fn new(tracker: Arc<StoreFailureTracker>, retry_budget: u64) -> Self {
        Self { tracker, retry_budget }
    }
}

impl HealthCheck for StoreHealthCheck {
    fn component_name(&self) -> &str {
        "store writes"
    }

    fn check(&self) -> HealthStatus {
        let failures = self.tracker.consecutive_failures.load(Ordering::Relaxed);
        if failures > self.retry_budget {
            HealthStatus::Unhealthy {
                reason: format!("{failures} consecutive store write failures, past the retry budget"),
            }
        } else if failures > 0 {
            HealthStatus::Degraded {
                reason: format!("{failures} consecutive store write failures"),
            }
        } else {
            HealthStatus::Healthy
        }
    }

    fn heal(&self) -> HealAction {
        error!("store writes failing persistently — check relational/TSDB connectivity");
        HealAction::ManualInterventionRequired {
            reason: "store connectivity requires operator attention".to_string(),
        }
    }
}

/// Runs every registered [`HealthCheck`] on a fixed cadence and keeps the
/// worst status visible for the ambient `/healthz` endpoint.
pub struct SelfHealer {
    checks: Vec<Box<dyn HealthCheck>>,
    health: Arc<RwLock<SystemHealth>>,
    interval: Duration,
}

impl SelfHealer {
    pub fn new(checks: Vec<Box<dyn HealthCheck>>, interval: Duration) -> Self {
        Self {
            checks,
            health: Arc::new(RwLock::new(SystemHealth::new())),
            interval,
        }
    }

    pub fn health_handle(&self) -> Arc<RwLock<SystemHealth>> {
        self.health.clone()
    }

    /// Run the health check loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(checks = self.checks.len(), interval_secs = self.interval.as_secs(), "self-healer started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("self-healer stopping on shutdown signal");
                    return;
                }
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }
    }

    async fn run_cycle(&self) {
        let mut components = Vec::with_capacity(self.checks.len());
        let mut worst = HealthStatus::Healthy;

        for check in &self.checks {
            let status = check.check();
            let action = match &status {
                HealthStatus::Unhealthy { .. } => {
                    error!(component = check.component_name(), status = %status, "component unhealthy — attempting heal");
                    Some(check.heal())
                }
                HealthStatus::Degraded { .. } => {
                    warn!(component = check.component_name(), status = %status, "component degraded");
                    None
                }
                HealthStatus::Healthy => {
                    debug!(component = check.component_name(), "component healthy");
                    None
                }
            };

            if let Some(ref action) = action {
                info!(component = check.component_name(), action = %action, "heal action taken");
            }

            match (&worst, &status) {
                (HealthStatus::Healthy, HealthStatus::Degraded { .. }) => worst = status.clone(),
                (HealthStatus::Healthy, HealthStatus::Unhealthy { .. }) => worst = status.clone(),
                (HealthStatus::Degraded { .. }, HealthStatus::Unhealthy { .. }) => worst = status.clone(),
                _ => {}
            }

            components.push(ComponentHealth {
                name: check.component_name().to_string(),
                status,
                last_checked: Instant::now(),
                last_action: action,
            });
        }

        let mut health = self.health.write().await;
        health.components = components;
        health.overall = worst;
        health.check_cycles += 1;
    }
}
