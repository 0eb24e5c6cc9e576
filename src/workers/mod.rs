//! Worker Pools (component F, spec §3, §4.1).
//!
//! Each pool owns one [`Queue`] and a fixed number of concurrent tasks.
//! Every task follows the worker contract: acquire a store handle, read
//! the minimum state needed, release it, perform the network I/O, then
//! reacquire to publish the result — no store session spans network I/O
//! (spec §4.1, testable property P5). Workers are recycled after
//! `tasks_per_child` iterations to bound resident memory (spec §6).

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::background::StoreFailureTracker;
use crate::credentials::{CredentialStore, DecryptedCredential};
use crate::error::ProbeError;
use crate::gateway::Gateway;
use crate::interfaces;
use crate::probes::{oids, IcmpDriver, SnmpDriver};
use crate::queue::{MaintenanceTask, ProbeTask, Queue};
use crate::state_machine::StateMachine;
use crate::types::{DeviceId, FailureReason, Interface, ProbeKind, ProbeResult};

/// Picks the one queue a `ProbeWorkerPool` drains, out of the broker's four.
fn select_queue(queues: &crate::queue::QueueBroker, kind: ProbeKind) -> Arc<Queue<ProbeTask>> {
    match kind {
        ProbeKind::Icmp => queues.monitoring.clone(),
        ProbeKind::Snmp => queues.snmp.clone(),
    }
}

/// Shared counters a [`crate::background`] health check reads to judge
/// pool saturation — incremented when a task starts, decremented when it
/// finishes.
#[derive(Default)]
pub struct PoolMetrics {
    pub busy: AtomicU64,
    pub recycled_total: AtomicU64,
    pub consecutive_probe_failures: AtomicU64,
}

pub struct ProbePoolConfig {
    pub pool_size: usize,
    pub tasks_per_child: u64,
    pub icmp_timeout: Duration,
    pub snmp_get_timeout: Duration,
    pub snmp_walk_timeout: Duration,
}

/// A pool of workers draining one probe queue (monitoring or snmp).
pub struct ProbeWorkerPool {
    queue: Arc<Queue<ProbeTask>>,
    gateway: Gateway,
    state_machine: Arc<StateMachine>,
    icmp_driver: Arc<dyn IcmpDriver>,
    snmp_driver: Arc<dyn SnmpDriver>,
    credentials: Arc<dyn CredentialStore>,
    cfg: ProbePoolConfig,
    kind: ProbeKind,
    metrics: Arc<PoolMetrics>,
    store_failures: Arc<StoreFailureTracker>,
}

impl ProbeWorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: ProbeKind,
        queues: &crate::queue::QueueBroker,
        gateway: Gateway,
        state_machine: Arc<StateMachine>,
        icmp_driver: Arc<dyn IcmpDriver>,
        snmp_driver: Arc<dyn SnmpDriver>,
        credentials: Arc<dyn CredentialStore>,
        cfg: ProbePoolConfig,
        store_failures: Arc<StoreFailureTracker>,
    ) -> Self {
        Self {
            queue: select_queue(queues, kind),
            gateway,
            state_machine,
            icmp_driver,
            snmp_driver,
            credentials,
            cfg,
            kind,
            metrics: Arc::new(PoolMetrics::default()),
            store_failures,
        }
    }

    pub fn metrics(&self) -> Arc<PoolMetrics> {
        self.metrics.clone()
    }

    /// Spawn `pool_size` long-running worker tasks. Each one recycles
    /// itself (returns and gets replaced by a fresh task) after
    /// `tasks_per_child` probes — this bounds the lifetime of any leaked
    /// per-task state without ever stopping the pool as a whole.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.cfg.pool_size)
            .map(|worker_id| {
                let pool = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { pool.run_recycling(worker_id, cancel).await })
            })
            .collect()
    }

    async fn run_recycling(self: Arc<Self>, worker_id: usize, cancel: CancellationToken) {
        loop {
            self.run_generation(worker_id, cancel.clone()).await;
            if cancel.is_cancelled() {
                return;
            }
            self.metrics.recycled_total.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, kind = ?self.kind, "worker recycled");
        }
    }

    /// Run up to `tasks_per_child` tasks, or until cancelled.
    async fn run_generation(&self, worker_id: usize, cancel: CancellationToken) {
        for _ in 0..self.cfg.tasks_per_child {
            let task = tokio::select! {
                _ = cancel.cancelled() => return,
                task = self.queue.dequeue() => task,
            };
            let Some(task) = task else { return };

            self.metrics.busy.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.process(task, worker_id).await {
                warn!(worker_id, error = %e, "probe task failed");
            }
            self.metrics.busy.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// The worker contract in one call: acquire -> read -> release ->
    /// network I/O -> acquire -> write.
    async fn process(&self, task: ProbeTask, worker_id: usize) -> Result<(), ProbeError> {
        // 1. acquire + read: the only store access before network I/O.
        let device = self
            .gateway
            .latest_state(&task.device_id)
            .await
            .map_err(|e| ProbeError::Transient(e.to_string()))?;
        // 2. release: `device` is an owned value, not a handle — nothing
        // from the store stays open past this point.

        // 3. network I/O, with the retry policy from spec §4.1.
        let credential_id = device.as_ref().and_then(|d| d.snmp_credential_id.clone());
        let result = match self.kind {
            ProbeKind::Icmp => self.run_icmp(&task).await,
            ProbeKind::Snmp => self.run_snmp(&task, credential_id.clone()).await,
        };

        if result.reachable {
            self.metrics.consecutive_probe_failures.store(0, Ordering::Relaxed);
        } else {
            self.metrics.consecutive_probe_failures.fetch_add(1, Ordering::Relaxed);
        }

        // 4. reacquire + write: state machine transition, then both stores.
        if let Some(device) = device {
            let (updated, _transition) = self.state_machine.apply(&device, &result);
            if updated != device {
                if let Err(e) = self
                    .gateway
                    .apply_state_transition(&updated.id, updated.down_since, updated.flap_state, updated.flap_until)
                    .await
                {
                    self.store_failures.record_failure();
                    return Err(ProbeError::Transient(e.to_string()));
                }
            }
        }
        match self.gateway.write_probe(&result).await {
            Ok(()) => self.store_failures.record_success(),
            Err(e) => {
                self.store_failures.record_failure();
                return Err(ProbeError::Transient(e.to_string()));
            }
        }

        if self.kind == ProbeKind::Snmp && result.reachable {
            if let Err(e) = self.walk_interface_metrics(&task, credential_id).await {
                warn!(worker_id, device_id = %task.device_id, error = %e, "interface metrics walk failed");
            }
        }

        debug!(worker_id, device_id = %task.device_id, reachable = result.reachable, "probe complete");
        Ok(())
    }

    /// Walk `ifOperStatus`/`ifAdminStatus` for interfaces already known for
    /// this device (discovered by the maintenance pool's interface
    /// discovery job) and persist any status change. Runs on the same 60s
    /// SNMP cadence as the probe itself rather than a separate scheduler
    /// method — SPEC_FULL's "interface metrics collection" job shares the
    /// snmp queue with the device-reachability GET.
    async fn walk_interface_metrics(&self, task: &ProbeTask, credential_id: Option<String>) -> Result<(), ProbeError> {
        let known = self
            .gateway
            .list_interfaces(&task.device_id)
            .await
            .map_err(|e| ProbeError::Transient(e.to_string()))?;
        if known.is_empty() {
            return Ok(());
        }

        let credential = match credential_id {
            Some(_) => self.credentials.credential_for_device(&task.device_id.0).await,
            None => self.credentials.default_credential().await,
        }
        .map_err(|e| ProbeError::Persistent { reason: "no_credential", detail: e.to_string() })?;

        let target = std::net::SocketAddr::new(task.ip, 161);
        let oper = self
            .snmp_driver
            .walk(target, &credential, oids::IF_OPER_STATUS, self.cfg.snmp_walk_timeout)
            .await?;
        let admin = self
            .snmp_driver
            .walk(target, &credential, oids::IF_ADMIN_STATUS, self.cfg.snmp_walk_timeout)
            .await?;

        let mut oper_by_index: std::collections::HashMap<i32, crate::types::OperStatus> = std::collections::HashMap::new();
        for vb in &oper {
            if let (Some(idx), Some(code)) = (interfaces::oid_index(&vb.oid), interfaces::varbind_int(&vb.value)) {
                oper_by_index.insert(idx, interfaces::oper_status_from_code(code));
            }
        }
        let mut admin_by_index: std::collections::HashMap<i32, crate::types::OperStatus> = std::collections::HashMap::new();
        for vb in &admin {
            if let (Some(idx), Some(code)) = (interfaces::oid_index(&vb.oid), interfaces::varbind_int(&vb.value)) {
                admin_by_index.insert(idx, interfaces::oper_status_from_code(code));
            }
        }

        let mut updated: Vec<Interface> = Vec::new();
        for mut iface in known {
            let mut changed = false;
            if let Some(status) = oper_by_index.get(&iface.if_index) {
                if *status != iface.oper_status {
                    iface.oper_status = *status;
                    changed = true;
                }
            }
            if let Some(status) = admin_by_index.get(&iface.if_index) {
                if *status != iface.admin_status {
                    iface.admin_status = *status;
                    changed = true;
                }
            }
            if changed {
                updated.push(iface);
            }
        }

        if !updated.is_empty() {
            self.gateway
                .upsert_interfaces(&updated)
                .await
                .map_err(|e| ProbeError::Transient(e.to_string()))?;
        }
        Ok(())
    }

    /// ICMP retries once on timeout (spec §4.1).
    async fn run_icmp(&self, task: &ProbeTask) -> ProbeResult {
        let deadline = self.cfg.icmp_timeout;
        let sequence = next_sequence();
        let first = self.icmp_driver.ping(task.ip, deadline).await;
        let outcome = match first {
            Ok(echo) => Ok(echo),
            Err(ProbeError::Timeout(_)) => self.icmp_driver.ping(task.ip, deadline).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(echo) => ProbeResult {
                device_id: task.device_id.clone(),
                device_ip: task.ip,
                kind: ProbeKind::Icmp,
                timestamp: chrono::Utc::now(),
                sequence,
                reachable: true,
                rtt_avg_ms: Some(echo.rtt.as_secs_f64() * 1000.0),
                rtt_min_ms: Some(echo.rtt.as_secs_f64() * 1000.0),
                rtt_max_ms: Some(echo.rtt.as_secs_f64() * 1000.0),
                packet_loss_percent: 0.0,
                varbinds: Vec::new(),
                failure_reason: None,
            },
            Err(e) => ProbeResult::unreachable(
                task.device_id.clone(),
                task.ip,
                ProbeKind::Icmp,
                chrono::Utc::now(),
                sequence,
                classify_failure(&e),
            ),
        }
    }

    /// SNMP retries up to 2x with jittered exponential backoff (spec
    /// §4.1). A persistent failure (auth, ACL, malformed) is never
    /// retried within the same cycle (spec §7).
    async fn run_snmp(&self, task: &ProbeTask, credential_id: Option<String>) -> ProbeResult {
        let sequence = next_sequence();
        let credential = match credential_id {
            Some(_) => self.credentials.credential_for_device(&task.device_id.0).await,
            None => self.credentials.default_credential().await,
        };

        let credential = match credential {
            Ok(c) => c,
            Err(e) => {
                return ProbeResult::unreachable(
                    task.device_id.clone(),
                    task.ip,
                    ProbeKind::Snmp,
                    chrono::Utc::now(),
                    sequence,
                    match e {
                        crate::error::CredentialError::DecryptionFailed => FailureReason::AuthFailure,
                        _ => FailureReason::NoAccessPolicy,
                    },
                );
            }
        };

        let target = std::net::SocketAddr::new(task.ip, 161);
        let mut last_err: Option<ProbeError> = None;

        for attempt in 0..3u32 {
            if attempt > 0 {
                if matches!(last_err, Some(ProbeError::Persistent { .. })) {
                    break;
                }
                let jitter_ms: u64 = rand::thread_rng().gen_range(0..250);
                let backoff = Duration::from_millis(250 * 2u64.pow(attempt - 1) + jitter_ms);
                tokio::time::sleep(backoff).await;
            }

            let attempt_result = self
                .snmp_driver
                .get(target, &credential, &[oids::SYS_DESCR], self.cfg.snmp_get_timeout)
                .await;

            match attempt_result {
                Ok(varbinds) => {
                    return ProbeResult {
                        device_id: task.device_id.clone(),
                        device_ip: task.ip,
                        kind: ProbeKind::Snmp,
                        timestamp: chrono::Utc::now(),
                        sequence,
                        reachable: true,
                        rtt_avg_ms: None,
                        rtt_min_ms: None,
                        rtt_max_ms: None,
                        packet_loss_percent: 0.0,
                        varbinds,
                        failure_reason: None,
                    };
                }
                Err(e) => {
                    let persistent = matches!(e, ProbeError::Persistent { .. });
                    last_err = Some(e);
                    if persistent {
                        break;
                    }
                }
            }
        }

        let reason = last_err.as_ref().map(classify_failure).unwrap_or(FailureReason::Timeout);
        ProbeResult::unreachable(task.device_id.clone(), task.ip, ProbeKind::Snmp, chrono::Utc::now(), sequence, reason)
    }
}

pub struct MaintenancePoolConfig {
    pub pool_size: usize,
    pub tasks_per_child: u64,
    pub snmp_walk_timeout: Duration,
    pub retention_days: u32,
}

/// A pool of workers draining the maintenance queue: interface discovery,
/// retention cleanup, and trigger-window resets (SPEC_FULL §D). Follows
/// the same recycling-worker shape as [`ProbeWorkerPool`], sized much
/// smaller since these jobs are hourly/daily, not per-cadence-tick.
pub struct MaintenanceWorkerPool {
    queue: Arc<Queue<MaintenanceTask>>,
    gateway: Gateway,
    snmp_driver: Arc<dyn SnmpDriver>,
    credentials: Arc<dyn CredentialStore>,
    cfg: MaintenancePoolConfig,
    metrics: Arc<PoolMetrics>,
    store_failures: Arc<StoreFailureTracker>,
}

impl MaintenanceWorkerPool {
    pub fn new(
        queues: &crate::queue::QueueBroker,
        gateway: Gateway,
        snmp_driver: Arc<dyn SnmpDriver>,
        credentials: Arc<dyn CredentialStore>,
        cfg: MaintenancePoolConfig,
        store_failures: Arc<StoreFailureTracker>,
    ) -> Self {
        Self {
            queue: queues.maintenance.clone(),
            gateway,
            snmp_driver,
            credentials,
            cfg,
            metrics: Arc::new(PoolMetrics::default()),
            store_failures,
        }
    }

    pub fn metrics(&self) -> Arc<PoolMetrics> {
        self.metrics.clone()
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.cfg.pool_size)
            .map(|worker_id| {
                let pool = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { pool.run_recycling(worker_id, cancel).await })
            })
            .collect()
    }

    async fn run_recycling(self: Arc<Self>, worker_id: usize, cancel: CancellationToken) {
        loop {
            self.run_generation(worker_id, cancel.clone()).await;
            if cancel.is_cancelled() {
                return;
            }
            self.metrics.recycled_total.fetch_add(1, Ordering::Relaxed);
            debug!(worker_id, "maintenance worker recycled");
        }
    }

    async fn run_generation(&self, worker_id: usize, cancel: CancellationToken) {
        for _ in 0..self.cfg.tasks_per_child {
            let task = tokio::select! {
                _ = cancel.cancelled() => return,
                task = self.queue.dequeue() => task,
            };
            let Some(task) = task else { return };

            self.metrics.busy.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.process(task).await {
                warn!(worker_id, error = %e, "maintenance task failed");
            }
            self.metrics.busy.fetch_sub(1, Ordering::Relaxed);
        }
    }

    async fn process(&self, task: MaintenanceTask) -> Result<(), ProbeError> {
        match task {
            MaintenanceTask::InterfaceDiscovery(device_id) => self.discover_interfaces(&device_id).await,
            MaintenanceTask::RetentionCleanup => self.run_retention_cleanup().await,
            MaintenanceTask::ResetTriggerWindow { rule_id, reset_24h, reset_7d } => {
                match self.gateway.reset_trigger_window(&rule_id, reset_24h, reset_7d).await {
                    Ok(()) => {
                        self.store_failures.record_success();
                        Ok(())
                    }
                    Err(e) => {
                        self.store_failures.record_failure();
                        Err(ProbeError::Transient(e.to_string()))
                    }
                }
            }
        }
    }

    /// Walk `ifDescr`/`ifAlias`/`ifOperStatus`/`ifAdminStatus`/`ifHighSpeed`
    /// for every interface on a device, classify each, and upsert the full
    /// set. Devices with no SNMP credential or that are ICMP-only are
    /// skipped, not retried — there is nothing to discover.
    async fn discover_interfaces(&self, device_id: &DeviceId) -> Result<(), ProbeError> {
        let device = self
            .gateway
            .latest_state(device_id)
            .await
            .map_err(|e| ProbeError::Transient(e.to_string()))?;
        let Some(device) = device else { return Ok(()) };
        if !device.monitoring_mode.wants_snmp() {
            return Ok(());
        }

        let credential = match device.snmp_credential_id {
            Some(_) => self.credentials.credential_for_device(&device_id.0).await,
            None => self.credentials.default_credential().await,
        }
        .map_err(|e| ProbeError::Persistent { reason: "no_credential", detail: e.to_string() })?;

        let target = std::net::SocketAddr::new(device.ip, 161);
        let descr = self.snmp_driver.walk(target, &credential, oids::IF_DESCR, self.cfg.snmp_walk_timeout).await?;
        let alias = self.snmp_driver.walk(target, &credential, oids::IF_ALIAS, self.cfg.snmp_walk_timeout).await?;
        let oper = self
            .snmp_driver
            .walk(target, &credential, oids::IF_OPER_STATUS, self.cfg.snmp_walk_timeout)
            .await?;
        let admin = self
            .snmp_driver
            .walk(target, &credential, oids::IF_ADMIN_STATUS, self.cfg.snmp_walk_timeout)
            .await?;
        let speed = self
            .snmp_driver
            .walk(target, &credential, oids::IF_HIGH_SPEED, self.cfg.snmp_walk_timeout)
            .await?;

        let mut by_index: std::collections::HashMap<i32, Interface> = std::collections::HashMap::new();
        for vb in &descr {
            if let Some(idx) = interfaces::oid_index(&vb.oid) {
                by_index.entry(idx).or_insert_with(|| blank_interface(device_id, idx)).if_name =
                    interfaces::varbind_text(&vb.value);
            }
        }
        for vb in &alias {
            if let Some(idx) = interfaces::oid_index(&vb.oid) {
                by_index.entry(idx).or_insert_with(|| blank_interface(device_id, idx)).if_alias =
                    interfaces::varbind_text(&vb.value);
            }
        }
        for vb in &oper {
            if let (Some(idx), Some(code)) = (interfaces::oid_index(&vb.oid), interfaces::varbind_int(&vb.value)) {
                by_index.entry(idx).or_insert_with(|| blank_interface(device_id, idx)).oper_status =
                    interfaces::oper_status_from_code(code);
            }
        }
        for vb in &admin {
            if let (Some(idx), Some(code)) = (interfaces::oid_index(&vb.oid), interfaces::varbind_int(&vb.value)) {
                by_index.entry(idx).or_insert_with(|| blank_interface(device_id, idx)).admin_status =
                    interfaces::oper_status_from_code(code);
            }
        }
        for vb in &speed {
            if let (Some(idx), Some(mbps)) = (interfaces::oid_index(&vb.oid), interfaces::varbind_int(&vb.value)) {
                by_index.entry(idx).or_insert_with(|| blank_interface(device_id, idx)).link_speed_bps =
                    Some(mbps as u64 * 1_000_000);
            }
        }

        let mut discovered: Vec<Interface> = by_index.into_values().collect();
        for iface in &mut discovered {
            iface.interface_type = interfaces::classify(&iface.if_name, &iface.if_alias);
            iface.isp_provider = interfaces::isp_provider(&iface.if_alias).map(str::to_string);
        }

        if discovered.is_empty() {
            return Ok(());
        }

        match self.gateway.upsert_interfaces(&discovered).await {
            Ok(()) => {
                self.store_failures.record_success();
                Ok(())
            }
            Err(e) => {
                self.store_failures.record_failure();
                Err(ProbeError::Transient(e.to_string()))
            }
        }
    }

    async fn run_retention_cleanup(&self) -> Result<(), ProbeError> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(self.cfg.retention_days as i64);
        match self.gateway.purge_history(cutoff).await {
            Ok(removed) => {
                self.store_failures.record_success();
                debug!(removed, "retention cleanup purged TSDB history");
                Ok(())
            }
            Err(e) => {
                self.store_failures.record_failure();
                Err(ProbeError::Transient(e.to_string()))
            }
        }
    }
}

fn blank_interface(device_id: &DeviceId, if_index: i32) -> Interface {
    Interface {
        device_id: device_id.clone(),
        if_index,
        if_name: String::new(),
        if_alias: String::new(),
        admin_status: crate::types::OperStatus::Unknown,
        oper_status: crate::types::OperStatus::Unknown,
        link_speed_bps: None,
        interface_type: crate::types::InterfaceType::Unknown,
        isp_provider: None,
        is_critical: false,
    }
}

fn classify_failure(e: &ProbeError) -> FailureReason {
    match e {
        ProbeError::Timeout(_) => FailureReason::Timeout,
        ProbeError::Transient(_) => FailureReason::TransientNetwork,
        ProbeError::Cancelled => FailureReason::Cancelled,
        ProbeError::Persistent { reason, .. } => match *reason {
            "v3_unsupported" | "snmp_get_failed" | "snmp_walk_failed" => FailureReason::NoAccessPolicy,
            "malformed_oid" => FailureReason::MalformedResponse,
            _ => FailureReason::NoAccessPolicy,
        },
    }
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::InMemoryCredentialStore;
    use crate::types::DeviceId;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::sync::atomic::AtomicUsize;

    struct FlakyIcmpDriver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IcmpDriver for FlakyIcmpDriver {
        async fn ping(&self, _ip: IpAddr, _deadline: Duration) -> Result<crate::probes::IcmpEcho, ProbeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err(ProbeError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(crate::probes::IcmpEcho { rtt: Duration::from_millis(5) })
            }
        }
    }

    struct AlwaysFailSnmpDriver;

    #[async_trait]
    impl SnmpDriver for AlwaysFailSnmpDriver {
        async fn get(
            &self,
            _target: std::net::SocketAddr,
            _credential: &DecryptedCredential,
            _oids: &[&str],
            _deadline: Duration,
        ) -> Result<Vec<crate::types::Varbind>, ProbeError> {
            Err(ProbeError::Transient("simulated".into()))
        }

        async fn walk(
            &self,
            _target: std::net::SocketAddr,
            _credential: &DecryptedCredential,
            _base_oid: &str,
            _deadline: Duration,
        ) -> Result<Vec<crate::types::Varbind>, ProbeError> {
            Err(ProbeError::Transient("simulated".into()))
        }
    }

    fn pool_cfg() -> ProbePoolConfig {
        ProbePoolConfig {
            pool_size: 1,
            tasks_per_child: 10,
            icmp_timeout: Duration::from_millis(50),
            snmp_get_timeout: Duration::from_millis(50),
            snmp_walk_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn icmp_retries_once_on_timeout_then_succeeds() {
        let pool = ProbeWorkerPool::new(
            ProbeKind::Icmp,
            &crate::queue::QueueBroker::new(4, 4, 4, 4),
            Gateway::in_memory(),
            Arc::new(StateMachine::new(crate::config::FlapConfig::default())),
            Arc::new(FlakyIcmpDriver { calls: AtomicUsize::new(0) }),
            Arc::new(AlwaysFailSnmpDriver),
            Arc::new(InMemoryCredentialStore::new([1u8; 32])),
            pool_cfg(),
            Arc::new(crate::background::StoreFailureTracker::default()),
        );

        let task = ProbeTask {
            device_id: DeviceId::from("d1"),
            ip: "10.0.0.1".parse().unwrap(),
            batch_id: 0,
        };
        let result = pool.run_icmp(&task).await;
        assert!(result.reachable);
    }

    #[tokio::test]
    async fn snmp_does_not_retry_past_a_persistent_failure() {
        struct PersistentFailSnmpDriver(AtomicUsize);
        #[async_trait]
        impl SnmpDriver for PersistentFailSnmpDriver {
            async fn get(
                &self,
                _target: std::net::SocketAddr,
                _credential: &DecryptedCredential,
                _oids: &[&str],
                _deadline: Duration,
            ) -> Result<Vec<crate::types::Varbind>, ProbeError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(ProbeError::Persistent { reason: "snmp_get_failed", detail: "acl denied".into() })
            }
            async fn walk(
                &self,
                _target: std::net::SocketAddr,
                _credential: &DecryptedCredential,
                _base_oid: &str,
                _deadline: Duration,
            ) -> Result<Vec<crate::types::Varbind>, ProbeError> {
                unimplemented!()
            }
        }

        let driver = Arc::new(PersistentFailSnmpDriver(AtomicUsize::new(0)));
        let credentials = Arc::new(InMemoryCredentialStore::new([1u8; 32]));
        credentials
            .register_for_device(
                "d1",
                crate::types::SnmpCredential {
                    id: "c1".into(),
                    version: crate::types::SnmpVersion::V2c,
                    secret: crate::types::CredentialSecret::Community { ciphertext: seal_test_secret() },
                    priority: 0,
                    is_default: true,
                },
            )
            .unwrap();

        let pool = ProbeWorkerPool::new(
            ProbeKind::Snmp,
            &crate::queue::QueueBroker::new(4, 4, 4, 4),
            Gateway::in_memory(),
            Arc::new(StateMachine::new(crate::config::FlapConfig::default())),
            Arc::new(FlakyIcmpDriver { calls: AtomicUsize::new(0) }),
            driver.clone(),
            credentials,
            pool_cfg(),
            Arc::new(crate::background::StoreFailureTracker::default()),
        );

        let task = ProbeTask {
            device_id: DeviceId::from("d1"),
            ip: "10.0.0.1".parse().unwrap(),
            batch_id: 0,
        };
        let result = pool.run_snmp(&task, Some("c1".into())).await;
        assert!(!result.reachable);
        assert_eq!(driver.0.load(Ordering::SeqCst), 1);
    }

    fn seal_test_secret() -> Vec<u8> {
        use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
        use aes_gcm::{Aes256Gcm, Key};
        let key = Key::<Aes256Gcm>::from_slice(&[1u8; 32]);
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher.encrypt(&nonce, b"public".as_slice()).unwrap();
        [nonce.as_slice(), &ciphertext].concat()
    }
}
