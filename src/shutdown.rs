//! Graceful shutdown (spec §4.1, "Cancellation and shutdown").
//!
//! Ctrl-C cancels a single [`CancellationToken`] shared by every cadence,
//! worker pool, and the self-healer. Queues stop accepting new work
//! immediately; workers keep draining whatever is already buffered until
//! either the backlog empties or `SHUTDOWN_DRAIN_SEC` elapses, whichever
//! comes first — no in-flight probe is ever torn down mid-write.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::QueueBroker;

/// Cancel `cancel` on Ctrl-C. Spawned once at startup.
pub fn install_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal, cancelling all cadences and worker pools");
            cancel.cancel();
        }
    });
}

/// Stop accepting new enqueues on every queue, then wait for either the
/// backlog to drain or `deadline` to elapse. Workers that are still
/// running past the deadline are left to finish their current task — this
/// only bounds how long shutdown *waits*, it never aborts a worker mid-task.
pub async fn drain(queues: &QueueBroker, deadline: Duration) {
    queues.begin_shutdown();
    let start = tokio::time::Instant::now();

    loop {
        let total_depth = queues.alerts.depth() + queues.monitoring.depth() + queues.snmp.depth() + queues.maintenance.depth();
        if total_depth == 0 {
            info!("queues drained cleanly before shutdown deadline");
            return;
        }
        if start.elapsed() >= deadline {
            warn!(remaining = total_depth, "shutdown deadline reached with tasks still queued — proceeding anyway");
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Await every spawned task handle, logging (not panicking on) a task that
/// exited via panic — a worker crash should never take the whole process
/// down with it.
pub async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "a background task panicked during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_returns_immediately_once_queues_are_empty() {
        let queues = QueueBroker::new(4, 4, 4, 4);
        let start = tokio::time::Instant::now();
        drain(&queues, Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn drain_stops_accepting_new_enqueues() {
        let queues = QueueBroker::new(4, 4, 4, 4);
        drain(&queues, Duration::from_millis(50)).await;
        let err = queues
            .alerts
            .enqueue(crate::queue::AlertTask { rule_id: "r1".into() })
            .await;
        assert!(err.is_err());
    }
}
