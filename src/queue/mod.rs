//! Priority Queue Broker (component E, spec §3, §4.1).
//!
//! Four independently-sized queues — alerts, monitoring, snmp, maintenance —
//! each with its own worker pool. "Priority" here means capacity
//! allocation, not preemption: a backlog in `monitoring` never borrows
//! capacity from `alerts`, and no worker pool ever drains a queue other
//! than its own (spec §4.1, "no work stealing").

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::error::QueueError;
use crate::types::DeviceId;

/// One unit of ICMP or SNMP probing work, produced by the Batch Planner.
#[derive(Debug, Clone)]
pub struct ProbeTask {
    pub device_id: DeviceId,
    pub ip: IpAddr,
    pub batch_id: u64,
}

/// One unit of alert-rule evaluation work.
#[derive(Debug, Clone)]
pub struct AlertTask {
    pub rule_id: String,
}

/// Maintenance jobs: interface discovery, retention cleanup, and the
/// 24h/7d trigger-counter reset (SPEC_FULL §D).
#[derive(Debug, Clone)]
pub enum MaintenanceTask {
    InterfaceDiscovery(DeviceId),
    RetentionCleanup,
    ResetTriggerWindow { rule_id: String, reset_24h: bool, reset_7d: bool },
}

/// A single named, bounded FIFO queue with a live depth counter for
/// backlog health checks (spec §7, "Queue backlog").
pub struct Queue<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    depth: Arc<AtomicUsize>,
    shutting_down: Arc<std::sync::atomic::AtomicBool>,
}

impl<T: Send + 'static> Queue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            name,
            tx,
            rx: Mutex::new(rx),
            depth: Arc::new(AtomicUsize::new(0)),
            shutting_down: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn depth_handle(&self) -> Arc<AtomicUsize> {
        self.depth.clone()
    }

    /// Enqueue a task. Fails once the queue has begun shutdown, or once
    /// the bounded channel is full (backpressure, never an unbounded
    /// buffer).
    pub async fn enqueue(&self, task: T) -> Result<(), QueueError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(QueueError::ShuttingDown(self.name));
        }
        self.tx
            .send(task)
            .await
            .map_err(|_| QueueError::EnqueueFailed(format!("{} queue closed", self.name)))?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Pull the next task for this queue's worker pool. `None` once the
    /// queue is drained and closed.
    pub async fn dequeue(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        let task = rx.recv().await;
        if task.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        task
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Stop accepting new enqueues. Workers keep draining whatever is
    /// already buffered (spec §4.1, "Cancellation and shutdown").
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        warn!(queue = self.name, "queue closing to new enqueues, draining backlog");
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The four isolated queues, sized per `config::WorkerPoolConfig` capacity
/// (spec §6) — each queue's bound tracks its own worker pool size times a
/// small multiplier, not a single shared bound. Each queue is `Arc`-wrapped
/// so a worker pool can hold its own queue independent of the broker.
pub struct QueueBroker {
    pub alerts: Arc<Queue<AlertTask>>,
    pub monitoring: Arc<Queue<ProbeTask>>,
    pub snmp: Arc<Queue<ProbeTask>>,
    pub maintenance: Arc<Queue<MaintenanceTask>>,
}

impl QueueBroker {
    pub fn new(alerts_cap: usize, monitoring_cap: usize, snmp_cap: usize, maintenance_cap: usize) -> Self {
        Self {
            alerts: Arc::new(Queue::new("alerts", alerts_cap)),
            monitoring: Arc::new(Queue::new("monitoring", monitoring_cap)),
            snmp: Arc::new(Queue::new("snmp", snmp_cap)),
            maintenance: Arc::new(Queue::new("maintenance", maintenance_cap)),
        }
    }

    pub fn begin_shutdown(&self) {
        self.alerts.begin_shutdown();
        self.monitoring.begin_shutdown();
        self.snmp.begin_shutdown();
        self.maintenance.begin_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_dequeue_round_trips_and_tracks_depth() {
        let q: Queue<AlertTask> = Queue::new("alerts", 8);
        assert_eq!(q.depth(), 0);
        q.enqueue(AlertTask { rule_id: "r1".into() }).await.unwrap();
        assert_eq!(q.depth(), 1);
        let task = q.dequeue().await.unwrap();
        assert_eq!(task.rule_id, "r1");
        assert_eq!(q.depth(), 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_enqueues_but_allows_draining_existing() {
        let q: Queue<AlertTask> = Queue::new("alerts", 8);
        q.enqueue(AlertTask { rule_id: "r1".into() }).await.unwrap();
        q.begin_shutdown();

        let err = q.enqueue(AlertTask { rule_id: "r2".into() }).await.unwrap_err();
        assert!(matches!(err, QueueError::ShuttingDown("alerts")));

        let drained = q.dequeue().await;
        assert!(drained.is_some());
    }

    #[tokio::test]
    async fn four_queues_are_independent_backlogs() {
        let broker = QueueBroker::new(4, 4, 4, 4);
        broker.alerts.enqueue(AlertTask { rule_id: "r1".into() }).await.unwrap();
        assert_eq!(broker.alerts.depth(), 1);
        assert_eq!(broker.monitoring.depth(), 0);
        assert_eq!(broker.snmp.depth(), 0);
        assert_eq!(broker.maintenance.depth(), 0);
    }
}
