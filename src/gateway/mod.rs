//! Hybrid Metric Store Gateway (components I+J, spec §3, §4.3).
//!
//! The single seam every other component goes through to reach storage:
//! relational store for current state, TSDB for history, read cache in
//! front of both. Nothing outside this module talks to `sqlx` or
//! `reqwest` directly.

pub mod cache;
pub mod relational;
pub mod tsdb;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::GatewayError;
use crate::types::{AlertInstance, AlertRule, Device, DeviceId, FlapState, Interface, LatestPing, ProbeResult};
use cache::ReadCache;
use relational::RelationalStore;
use tsdb::{TsdbStore, WindowAggregate};

/// Bulk-read chunk bound re-exported for callers that assemble their own
/// ID batches before calling into the gateway.
pub use crate::config::defaults::BULK_READ_CHUNK_SIZE;

/// The Gateway: relational store + TSDB + read cache, composed behind one
/// API. Cloned cheaply (every field is an `Arc` or cheap to share).
#[derive(Clone)]
pub struct Gateway {
    relational: Arc<dyn RelationalStore>,
    tsdb: Arc<dyn TsdbStore>,
    cache: Arc<ReadCache>,
}

impl Gateway {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        tsdb: Arc<dyn TsdbStore>,
        cache: Arc<ReadCache>,
    ) -> Self {
        Self {
            relational,
            tsdb,
            cache,
        }
    }

    /// Append a probe result to the TSDB and refresh the relational
    /// `latest_ping` row (spec §3, §4.3) — the denormalized single-row
    /// snapshot that is distinct from `Device.down_since`. TSDB
    /// unavailability never blocks or corrupts relational state (spec §4.3,
    /// §7 "TSDB store failure") — the error is returned for the caller to
    /// log and retry, never panics.
    pub async fn write_probe(&self, result: &ProbeResult) -> Result<(), GatewayError> {
        self.relational.upsert_latest_ping(&LatestPing::from(result)).await?;
        self.tsdb.write_probe(result).await
    }

    /// Current single-row-per-device ping snapshot, if one has been
    /// recorded yet.
    pub async fn latest_ping(&self, device_id: &DeviceId) -> Result<Option<LatestPing>, GatewayError> {
        self.relational.get_latest_ping(device_id).await
    }

    pub async fn write_alert_event(&self, instance: &AlertInstance) -> Result<(), GatewayError> {
        self.relational.upsert_alert_instance(instance).await
    }

    /// Look up a rule's currently-open instance for a device, if any —
    /// the dedup check the Alert Evaluator runs before opening a new one.
    pub async fn open_alert_instance(
        &self,
        rule_id: &str,
        device_id: &DeviceId,
    ) -> Result<Option<AlertInstance>, GatewayError> {
        self.relational.get_open_alert_instance(rule_id, device_id).await
    }

    pub async fn list_open_alert_instances(&self) -> Result<Vec<AlertInstance>, GatewayError> {
        self.relational.list_open_alert_instances().await
    }

    /// Apply a State Machine transition: relational `UPDATE`, then
    /// cache invalidation. Order matters — a reader must never observe a
    /// cache entry that predates a committed relational write (spec §4.3).
    pub async fn apply_state_transition(
        &self,
        id: &DeviceId,
        down_since: Option<DateTime<Utc>>,
        flap_state: FlapState,
        flap_until: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError> {
        self.relational
            .update_device_state(id, down_since, flap_state, flap_until)
            .await?;
        self.cache.invalidate_device(id);
        Ok(())
    }

    pub async fn upsert_device(&self, device: &Device) -> Result<(), GatewayError> {
        self.relational.upsert_device(device).await?;
        self.cache.invalidate_device(&device.id);
        Ok(())
    }

    pub async fn upsert_interfaces(&self, interfaces: &[Interface]) -> Result<(), GatewayError> {
        self.relational.upsert_interfaces(interfaces).await
    }

    pub async fn list_interfaces(&self, device_id: &DeviceId) -> Result<Vec<Interface>, GatewayError> {
        self.relational.list_interfaces(device_id).await
    }

    /// Single-device current state, cache-first.
    pub async fn latest_state(&self, id: &DeviceId) -> Result<Option<Device>, GatewayError> {
        if let Some(cached) = self.cache.get_device(id) {
            return Ok(Some(cached));
        }
        let device = self.relational.get_device(id).await?;
        if let Some(d) = &device {
            self.cache.put_device(d.clone());
        }
        Ok(device)
    }

    /// Bulk current-state read. Never issues a single `IN (...)` with more
    /// than [`BULK_READ_CHUNK_SIZE`] IDs — the relational store chunks
    /// internally, and this just forwards (spec §4.3 P9).
    pub async fn latest_state_bulk(&self, ids: &[DeviceId]) -> Result<Vec<Device>, GatewayError> {
        self.relational.get_devices_bulk(ids).await
    }

    pub async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
        if let Some(cached) = self.cache.get_device_list() {
            return Ok(cached);
        }
        let devices = self.relational.list_enabled_devices().await?;
        self.cache.put_device_list(devices.clone());
        Ok(devices)
    }

    /// Windowed aggregate from the TSDB. Returns
    /// `Err(GatewayError::TsdbUnavailable)` rather than a synthetic zero —
    /// callers (the Alert Evaluator) must treat that as "unknown" and skip
    /// evaluating the predicate this cycle, never as "no loss" (spec §4.2,
    /// §7).
    pub async fn window_aggregate(
        &self,
        device_id: &DeviceId,
        window: Duration,
    ) -> Result<WindowAggregate, GatewayError> {
        match self.tsdb.window_aggregate(device_id, window).await {
            Ok(agg) => Ok(agg),
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "TSDB aggregate unavailable this cycle");
                Err(e)
            }
        }
    }

    pub async fn history(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, GatewayError> {
        self.tsdb.history(device_id, since, until).await
    }

    /// Drop TSDB samples older than `cutoff` (spec §6 `retention.ping_history_days`,
    /// the daily cleanup cadence). Never touches relational state — retention
    /// only prunes history, not current device/alert state.
    pub async fn purge_history(&self, cutoff: DateTime<Utc>) -> Result<u64, GatewayError> {
        self.tsdb.purge_before(cutoff).await
    }

    pub async fn reset_trigger_window(
        &self,
        rule_id: &str,
        reset_24h: bool,
        reset_7d: bool,
    ) -> Result<(), GatewayError> {
        self.relational.reset_trigger_window(rule_id, reset_24h, reset_7d).await
    }

    pub async fn upsert_alert_rule(&self, rule: &AlertRule) -> Result<(), GatewayError> {
        self.relational.upsert_alert_rule(rule).await
    }

    /// Rules the Alert Evaluator should run this cadence tick (spec §4.2) —
    /// backed by the relational store the same way device/interface state
    /// is, rather than a static in-process list.
    pub async fn list_enabled_alert_rules(&self) -> Result<Vec<AlertRule>, GatewayError> {
        self.relational.list_enabled_alert_rules().await
    }

    /// Build a Gateway backed entirely by in-memory stores — used by tests
    /// and by the scenario harness.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(relational::InMemoryRelationalStore::new()),
            Arc::new(tsdb::InMemoryTsdbStore::new()),
            Arc::new(ReadCache::new(
                Duration::from_secs(crate::config::defaults::CACHE_DEVICE_DETAIL_TTL_SEC),
                Duration::from_secs(crate::config::defaults::CACHE_DEVICE_LIST_TTL_SEC),
                Duration::from_secs(crate::config::defaults::CACHE_ISP_STATUS_TTL_SEC),
            )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MonitoringMode;

    fn device(id: &str) -> Device {
        Device {
            id: DeviceId::from(id),
            ip: "10.0.0.1".parse().unwrap(),
            display_name: id.to_string(),
            device_type: "router".into(),
            branch: None,
            region: None,
            enabled: true,
            snmp_credential_id: None,
            monitoring_mode: MonitoringMode::Both,
            down_since: None,
            flap_state: FlapState::Stable,
            flap_until: None,
        }
    }

    #[tokio::test]
    async fn state_transition_invalidates_cache_immediately() {
        let gw = Gateway::in_memory();
        let d = device("d1");
        gw.upsert_device(&d).await.unwrap();
        gw.latest_state(&d.id).await.unwrap();
        assert!(gw.cache.get_device(&d.id).is_some());

        let now = Utc::now();
        gw.apply_state_transition(&d.id, Some(now), FlapState::Stable, None)
            .await
            .unwrap();

        assert!(gw.cache.get_device(&d.id).is_none());
    }

    #[tokio::test]
    async fn window_aggregate_propagates_unavailable_rather_than_zero() {
        let relational = Arc::new(relational::InMemoryRelationalStore::new());
        let tsdb = Arc::new(tsdb::InMemoryTsdbStore::new());
        tsdb.force_unavailable.store(true, std::sync::atomic::Ordering::Relaxed);
        let gw = Gateway::new(
            relational,
            tsdb,
            Arc::new(ReadCache::new(
                Duration::from_secs(30),
                Duration::from_secs(30),
                Duration::from_secs(30),
            )),
        );

        let result = gw.window_aggregate(&DeviceId::from("d1"), Duration::from_secs(300)).await;
        assert!(matches!(result, Err(GatewayError::TsdbUnavailable)));
    }
}
