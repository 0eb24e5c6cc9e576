//! TSDB store (spec §3 "Time-series store"): append-only probe history.
//! Never the authority for current up/down state — that is the relational
//! store's job (spec §4.3).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::GatewayError;
use crate::types::{DeviceId, ProbeResult};

/// A windowed aggregate over a device's probe history — backs
/// `AvgPacketLossExceeds` / `AvgRttExceeds` (spec §4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowAggregate {
    pub avg_packet_loss_percent: f64,
    pub avg_rtt_ms: Option<f64>,
    pub sample_count: u32,
}

#[async_trait]
pub trait TsdbStore: Send + Sync {
    async fn write_probe(&self, result: &ProbeResult) -> Result<(), GatewayError>;

    /// Aggregate over the last `window` for one device. Returns
    /// `Err(GatewayError::TsdbUnavailable)` when the backend cannot answer —
    /// callers must treat that as "unknown", never as zero (spec §4.2, §7).
    async fn window_aggregate(
        &self,
        device_id: &DeviceId,
        window: Duration,
    ) -> Result<WindowAggregate, GatewayError>;

    /// Raw probe history for a device within `[since, until]`, most recent
    /// last (append order).
    async fn history(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, GatewayError>;

    /// Drop samples older than `cutoff` (spec §6 `retention.ping_history_days`).
    /// Returns the number of samples removed where the backend can report
    /// one; `0` is a valid "nothing to do" result, not an error.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, GatewayError>;
}

/// Remote-write-style HTTP client against a Prometheus-compatible TSDB.
pub struct HttpTsdbStore {
    client: reqwest::Client,
    write_url: String,
    query_url: String,
    write_timeout: Duration,
    query_timeout: Duration,
}

impl HttpTsdbStore {
    pub fn new(write_url: String, query_url: String, write_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            write_url,
            query_url,
            write_timeout,
            query_timeout,
        }
    }
}

#[derive(Deserialize)]
struct PromQueryResponse {
    data: PromQueryData,
}

#[derive(Deserialize)]
struct PromQueryData {
    result: Vec<PromQuerySample>,
}

#[derive(Deserialize)]
struct PromQuerySample {
    value: (f64, String),
}

#[async_trait]
impl TsdbStore for HttpTsdbStore {
    async fn write_probe(&self, result: &ProbeResult) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "device_id": result.device_id.0,
            "kind": result.kind,
            "timestamp": result.timestamp.timestamp_millis(),
            "sequence": result.sequence,
            "reachable": result.reachable,
            "rtt_avg_ms": result.rtt_avg_ms,
            "packet_loss_percent": result.packet_loss_percent,
        });

        let resp = self
            .client
            .post(&self.write_url)
            .timeout(self.write_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::TsdbWriteFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::TsdbWriteFailed(format!(
                "unexpected status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn window_aggregate(
        &self,
        device_id: &DeviceId,
        window: Duration,
    ) -> Result<WindowAggregate, GatewayError> {
        let query = format!(
            "avg_over_time(packet_loss_percent{{device_id=\"{}\"}}[{}s])",
            device_id.0,
            window.as_secs()
        );
        let resp = self
            .client
            .get(&self.query_url)
            .timeout(self.query_timeout)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|_| GatewayError::TsdbUnavailable)?;

        if !resp.status().is_success() {
            return Err(GatewayError::TsdbUnavailable);
        }

        let parsed: PromQueryResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::TsdbMalformed(e.to_string()))?;

        let avg_packet_loss_percent = parsed
            .data
            .result
            .first()
            .and_then(|s| s.value.1.parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(WindowAggregate {
            avg_packet_loss_percent,
            avg_rtt_ms: None,
            sample_count: parsed.data.result.len() as u32,
        })
    }

    async fn history(
        &self,
        _device_id: &DeviceId,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, GatewayError> {
        Err(GatewayError::TsdbMalformed(
            "range-query history retrieval is backend-specific and not wired for this deployment".into(),
        ))
    }

    /// Issues a Prometheus-style admin delete against every series ending
    /// at `cutoff`. The admin API does not report how many samples matched,
    /// so a successful call always reports `0`.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, GatewayError> {
        let delete_url = self.query_url.replacen("/query", "/admin/tsdb/delete_series", 1);
        let resp = self
            .client
            .post(&delete_url)
            .timeout(self.write_timeout)
            .query(&[
                ("match[]", "packet_loss_percent"),
                ("end", &cutoff.timestamp().to_string()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::TsdbWriteFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::TsdbWriteFailed(format!(
                "unexpected status {} from delete_series",
                resp.status()
            )));
        }
        Ok(0)
    }
}

/// In-memory append-only store for tests. Keeps every probe ever written,
/// per device, in arrival order.
pub struct InMemoryTsdbStore {
    series: RwLock<HashMap<DeviceId, Vec<ProbeResult>>>,
    /// When set, `window_aggregate`/`history` behave as if the backend were
    /// unreachable — used to exercise the degraded-TSDB scenario (S4).
    pub force_unavailable: std::sync::atomic::AtomicBool,
}

impl InMemoryTsdbStore {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            force_unavailable: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

impl Default for InMemoryTsdbStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TsdbStore for InMemoryTsdbStore {
    async fn write_probe(&self, result: &ProbeResult) -> Result<(), GatewayError> {
        if self.force_unavailable.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(GatewayError::TsdbWriteFailed("forced unavailable".into()));
        }
        self.series
            .write()
            .expect("lock poisoned")
            .entry(result.device_id.clone())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn window_aggregate(
        &self,
        device_id: &DeviceId,
        window: Duration,
    ) -> Result<WindowAggregate, GatewayError> {
        if self.force_unavailable.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(GatewayError::TsdbUnavailable);
        }
        let guard = self.series.read().expect("lock poisoned");
        let Some(samples) = guard.get(device_id) else {
            return Ok(WindowAggregate::default());
        };
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        let windowed: Vec<&ProbeResult> = samples.iter().filter(|p| p.timestamp >= cutoff).collect();
        if windowed.is_empty() {
            return Ok(WindowAggregate::default());
        }

        let avg_packet_loss_percent =
            windowed.iter().map(|p| p.packet_loss_percent).sum::<f64>() / windowed.len() as f64;
        let rtts: Vec<f64> = windowed.iter().filter_map(|p| p.rtt_avg_ms).collect();
        let avg_rtt_ms = (!rtts.is_empty()).then(|| rtts.iter().sum::<f64>() / rtts.len() as f64);

        Ok(WindowAggregate {
            avg_packet_loss_percent,
            avg_rtt_ms,
            sample_count: windowed.len() as u32,
        })
    }

    async fn history(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, GatewayError> {
        if self.force_unavailable.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(GatewayError::TsdbUnavailable);
        }
        let guard = self.series.read().expect("lock poisoned");
        Ok(guard
            .get(device_id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|p| p.timestamp >= since && p.timestamp <= until)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, GatewayError> {
        if self.force_unavailable.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(GatewayError::TsdbUnavailable);
        }
        let mut removed = 0u64;
        let mut guard = self.series.write().expect("lock poisoned");
        for samples in guard.values_mut() {
            let before = samples.len();
            samples.retain(|p| p.timestamp >= cutoff);
            removed += (before - samples.len()) as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureReason, ProbeKind};
    use std::sync::atomic::Ordering;

    fn probe(device_id: &str, loss: f64, ts: DateTime<Utc>, seq: u64) -> ProbeResult {
        ProbeResult {
            device_id: DeviceId::from(device_id),
            device_ip: "10.0.0.1".parse().unwrap(),
            kind: ProbeKind::Icmp,
            timestamp: ts,
            sequence: seq,
            reachable: loss < 100.0,
            rtt_avg_ms: (loss < 100.0).then_some(12.0),
            rtt_min_ms: None,
            rtt_max_ms: None,
            packet_loss_percent: loss,
            varbinds: Vec::new(),
            failure_reason: (loss >= 100.0).then_some(FailureReason::Timeout),
        }
    }

    #[tokio::test]
    async fn window_aggregate_averages_recent_samples_only() {
        let store = InMemoryTsdbStore::new();
        let now = Utc::now();
        store.write_probe(&probe("d1", 0.0, now - chrono::Duration::seconds(600), 1)).await.unwrap();
        store.write_probe(&probe("d1", 50.0, now - chrono::Duration::seconds(60), 2)).await.unwrap();
        store.write_probe(&probe("d1", 100.0, now, 3)).await.unwrap();

        let agg = store
            .window_aggregate(&DeviceId::from("d1"), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(agg.sample_count, 2);
        assert!((agg.avg_packet_loss_percent - 75.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn forced_unavailable_surfaces_as_unavailable_not_zero() {
        let store = InMemoryTsdbStore::new();
        store.force_unavailable.store(true, Ordering::Relaxed);
        let result = store.window_aggregate(&DeviceId::from("d1"), Duration::from_secs(300)).await;
        assert!(matches!(result, Err(GatewayError::TsdbUnavailable)));
    }
}
