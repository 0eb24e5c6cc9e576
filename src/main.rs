//! fleetwatch — network monitoring backend for a distributed device fleet.
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://... fleetwatch
//! fleetwatch --config fleetwatch.toml
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: relational store connection string
//! - `FLEETWATCH_TSDB_WRITE_URL` / `FLEETWATCH_TSDB_QUERY_URL`: TSDB endpoints
//! - `FLEETWATCH_CONFIG`: path to a `fleetwatch.toml` override file
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleetwatch::alerts::topology::DependencyGraph;
use fleetwatch::alerts::AlertEvaluator;
use fleetwatch::api::{self, ApiState};
use fleetwatch::background::{
    QueueBacklogHealthCheck, SelfHealer, StoreFailureTracker, StoreHealthCheck, WorkerPoolHealthCheck,
};
use fleetwatch::config::{self, Settings};
use fleetwatch::credentials::{CredentialStore, InMemoryCredentialStore};
use fleetwatch::gateway::cache::ReadCache;
use fleetwatch::gateway::relational::{PostgresRelationalStore, RelationalStore};
use fleetwatch::gateway::tsdb::{HttpTsdbStore, TsdbStore};
use fleetwatch::gateway::Gateway;
use fleetwatch::probes::icmp::SurgePingDriver;
use fleetwatch::probes::snmp::CsnmpDriver;
use fleetwatch::queue::QueueBroker;
use fleetwatch::scheduler::Scheduler;
use fleetwatch::shutdown;
use fleetwatch::state_machine::StateMachine;
use fleetwatch::workers::{MaintenancePoolConfig, MaintenanceWorkerPool, ProbePoolConfig, ProbeWorkerPool};

#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(about = "Network monitoring backend: ICMP/SNMP polling, state machine, alerting")]
#[command(version)]
struct CliArgs {
    /// Path to a fleetwatch.toml config file (overrides FLEETWATCH_CONFIG and cwd discovery).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run entirely against in-memory stores instead of Postgres/TSDB — for
    /// local trials and demos, never for production deployment.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let settings = Settings::load(args.config.as_deref()).context("loading configuration")?;
    config::init(settings.clone());

    info!("fleetwatch starting up");

    let gateway = if args.in_memory || settings.relational.database_url.is_empty() {
        info!("running with in-memory stores (no DATABASE_URL configured)");
        Gateway::in_memory()
    } else {
        let relational: Arc<dyn RelationalStore> = Arc::new(
            PostgresRelationalStore::connect(&settings.relational.database_url, settings.relational.pool_size)
                .await
                .context("connecting to relational store")?,
        );
        let tsdb: Arc<dyn TsdbStore> = Arc::new(HttpTsdbStore::new(
            settings.tsdb.write_url.clone(),
            settings.tsdb.query_url.clone(),
            settings.tsdb.write_timeout(),
            settings.tsdb.query_timeout(),
        ));
        let cache = Arc::new(ReadCache::new(
            Duration::from_secs(settings.cache.device_detail_ttl_sec),
            Duration::from_secs(settings.cache.device_list_ttl_sec),
            Duration::from_secs(settings.cache.isp_status_ttl_sec),
        ));
        Gateway::new(relational, tsdb, cache)
    };

    let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new(
        load_master_key().context("loading credential master key")?,
    ));

    for rule in &settings.alert_rules {
        gateway.upsert_alert_rule(rule).await.context("seeding built-in alert rules")?;
    }

    let queues = Arc::new(QueueBroker::new(
        settings.worker.alerts * 4,
        settings.worker.monitoring * 20,
        settings.worker.snmp * 20,
        settings.worker.maintenance * 10,
    ));
    let state_machine = Arc::new(StateMachine::new(settings.flap.clone()));
    let store_failures = Arc::new(StoreFailureTracker::default());

    let cancel = CancellationToken::new();
    shutdown::install_signal_handler(cancel.clone());

    let mut tasks: JoinSet<()> = JoinSet::new();

    let icmp_driver = Arc::new(SurgePingDriver::new().context("creating ICMP driver")?);
    let snmp_driver = Arc::new(CsnmpDriver::new());

    let monitoring_pool = Arc::new(ProbeWorkerPool::new(
        fleetwatch::types::ProbeKind::Icmp,
        &queues,
        gateway.clone(),
        state_machine.clone(),
        icmp_driver.clone(),
        snmp_driver.clone(),
        credentials.clone(),
        ProbePoolConfig {
            pool_size: settings.worker.monitoring,
            tasks_per_child: settings.worker.tasks_per_child,
            icmp_timeout: settings.probe.icmp_timeout(),
            snmp_get_timeout: settings.probe.snmp_get_timeout(),
            snmp_walk_timeout: settings.probe.snmp_walk_timeout(),
        },
        store_failures.clone(),
    ));
    let snmp_pool = Arc::new(ProbeWorkerPool::new(
        fleetwatch::types::ProbeKind::Snmp,
        &queues,
        gateway.clone(),
        state_machine.clone(),
        icmp_driver.clone(),
        snmp_driver.clone(),
        credentials.clone(),
        ProbePoolConfig {
            pool_size: settings.worker.snmp,
            tasks_per_child: settings.worker.tasks_per_child,
            icmp_timeout: settings.probe.icmp_timeout(),
            snmp_get_timeout: settings.probe.snmp_get_timeout(),
            snmp_walk_timeout: settings.probe.snmp_walk_timeout(),
        },
        store_failures.clone(),
    ));
    let maintenance_pool = Arc::new(MaintenanceWorkerPool::new(
        &queues,
        gateway.clone(),
        snmp_driver.clone(),
        credentials.clone(),
        MaintenancePoolConfig {
            pool_size: settings.worker.maintenance,
            tasks_per_child: settings.worker.tasks_per_child,
            snmp_walk_timeout: settings.probe.snmp_walk_timeout(),
            retention_days: settings.retention.ping_history_days,
        },
        store_failures.clone(),
    ));

    let scheduler = Scheduler::new(gateway.clone(), queues.clone(), settings.batch.clone());
    let scheduler = Arc::new(scheduler);
    let alert_evaluator = Arc::new(AlertEvaluator::new(gateway.clone(), Arc::new(DependencyGraph::new())));

    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(settings.cadence.icmp_interval_sec);
        tasks.spawn(async move { scheduler.run_icmp_cadence(interval, cancel).await });
    }
    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(settings.cadence.snmp_interval_sec);
        tasks.spawn(async move { scheduler.run_snmp_cadence(interval, cancel).await });
    }
    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(settings.cadence.interface_discovery_interval_sec);
        tasks.spawn(async move { scheduler.run_interface_discovery_cadence(interval, cancel).await });
    }
    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let interval = Duration::from_secs(settings.cadence.cleanup_interval_sec);
        tasks.spawn(async move { scheduler.run_cleanup_cadence(interval, cancel).await });
    }
    {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        let evaluator = alert_evaluator.clone();
        let interval = Duration::from_secs(settings.cadence.alert_interval_sec);
        tasks.spawn(async move { scheduler.run_alert_cadence(interval, cancel, evaluator).await });
    }

    for handle in monitoring_pool.clone().spawn(cancel.clone()) {
        tasks.spawn(async move {
            let _ = handle.await;
        });
    }
    for handle in snmp_pool.clone().spawn(cancel.clone()) {
        tasks.spawn(async move {
            let _ = handle.await;
        });
    }
    for handle in maintenance_pool.clone().spawn(cancel.clone()) {
        tasks.spawn(async move {
            let _ = handle.await;
        });
    }

    let health_checks: Vec<Box<dyn fleetwatch::background::HealthCheck>> = {
        let mut checks: Vec<Box<dyn fleetwatch::background::HealthCheck>> = Vec::new();
        for check in QueueBacklogHealthCheck::for_broker(&queues) {
            checks.push(Box::new(check));
        }
        checks.push(Box::new(StoreHealthCheck::new(
            store_failures.clone(),
            fleetwatch::config::defaults::STORE_WRITE_RETRIES as u64,
        )));
        checks.push(Box::new(WorkerPoolHealthCheck::new(
            "monitoring pool",
            monitoring_pool.metrics(),
            settings.worker.monitoring,
        )));
        checks.push(Box::new(WorkerPoolHealthCheck::new(
            "snmp pool",
            snmp_pool.metrics(),
            settings.worker.snmp,
        )));
        checks.push(Box::new(WorkerPoolHealthCheck::new(
            "maintenance pool",
            maintenance_pool.metrics(),
            settings.worker.maintenance,
        )));
        checks
    };
    let self_healer = SelfHealer::new(
        health_checks,
        Duration::from_secs(settings.cadence.worker_health_check_interval_sec),
    );
    let health_handle = self_healer.health_handle();
    {
        let cancel = cancel.clone();
        tasks.spawn(async move { self_healer.run(cancel).await });
    }

    let api_state = Arc::new(ApiState {
        health: health_handle,
        queues: queues.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&settings.health_addr)
        .await
        .with_context(|| format!("binding health endpoint to {}", settings.health_addr))?;
    info!(addr = %settings.health_addr, "ambient health/metrics endpoint listening");
    {
        let cancel = cancel.clone();
        let router = api::build_router(api_state);
        tasks.spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;
        });
    }

    cancel.cancelled().await;
    shutdown::drain(&queues, Duration::from_secs(fleetwatch::config::defaults::SHUTDOWN_DRAIN_SEC)).await;

    while tasks.join_next().await.is_some() {}

    info!("fleetwatch shutdown complete");
    Ok(())
}

/// Load the AES-256 master key used to decrypt SNMP credentials. Never a
/// baked-in default — an unset `FLEETWATCH_MASTER_KEY` is a startup error,
/// not a silently-insecure fallback.
fn load_master_key() -> Result<[u8; 32]> {
    let hex_key = std::env::var("FLEETWATCH_MASTER_KEY")
        .context("FLEETWATCH_MASTER_KEY must be set to a 64-character hex string")?;
    let bytes = hex_decode(&hex_key).context("FLEETWATCH_MASTER_KEY must be valid hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("FLEETWATCH_MASTER_KEY must decode to exactly 32 bytes"))
}

fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        anyhow::bail!("odd-length hex string");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).context("invalid hex digit"))
        .collect()
}
