//! ProbeResult (spec §3) — immutable, append-only in the TSDB.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::device::DeviceId;

/// Diagnostic reason a probe came back unreachable. A failure is a data
/// point, not a dropped task (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    TransientNetwork,
    AuthFailure,
    NoAccessPolicy,
    MalformedResponse,
    Cancelled,
}

impl FailureReason {
    /// Whether this reason is worth retrying within the same cycle.
    /// Persistent failures (auth, ACL, malformed) are not retried on the
    /// same cycle — spec §7.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureReason::Timeout | FailureReason::TransientNetwork)
    }
}

/// A single varbind returned by an SNMP GET/WALK/GETBULK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Varbind {
    pub oid: String,
    pub value: String,
}

/// The kind of probe that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Icmp,
    Snmp,
}

/// Immutable result of one ICMP echo or SNMP GET/WALK against one device.
///
/// Invariant: `reachable == false` implies RTT fields are `None` and
/// `packet_loss_percent` is at or above the unreachable threshold (100.0
/// for a single echo; a batched implementation may report a partial loss
/// percentage across several echoes).
///
/// Invariant: within a single device, `(timestamp, sequence)` is strictly
/// monotonic — ties are broken by `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub device_id: DeviceId,
    pub device_ip: IpAddr,
    pub kind: ProbeKind,
    pub timestamp: DateTime<Utc>,
    /// Secondary ordering key, monotonic per device, used to break ties
    /// when two probes land at the same wall-clock timestamp.
    pub sequence: u64,
    pub reachable: bool,
    pub rtt_avg_ms: Option<f64>,
    pub rtt_min_ms: Option<f64>,
    pub rtt_max_ms: Option<f64>,
    pub packet_loss_percent: f64,
    pub varbinds: Vec<Varbind>,
    pub failure_reason: Option<FailureReason>,
}

impl ProbeResult {
    pub fn unreachable(
        device_id: DeviceId,
        device_ip: IpAddr,
        kind: ProbeKind,
        timestamp: DateTime<Utc>,
        sequence: u64,
        reason: FailureReason,
    ) -> Self {
        Self {
            device_id,
            device_ip,
            kind,
            timestamp,
            sequence,
            reachable: false,
            rtt_avg_ms: None,
            rtt_min_ms: None,
            rtt_max_ms: None,
            packet_loss_percent: 100.0,
            varbinds: Vec::new(),
            failure_reason: Some(reason),
        }
    }

    /// Whether this result's ordering key is newer than the given
    /// `(timestamp, sequence)` pair — used by the State Machine to ignore
    /// out-of-order arrivals (spec §4.1).
    pub fn is_newer_than(&self, last_timestamp: DateTime<Utc>, last_sequence: u64) -> bool {
        (self.timestamp, self.sequence) > (last_timestamp, last_sequence)
    }
}

/// Denormalized single-row-per-device latest-ping snapshot (spec §3, §4.3):
/// the relational store's fast-path view of the most recent probe, kept
/// distinct from `Device.down_since` which is owned by the state machine.
/// One `UPDATE` per probe, never an `INSERT` of a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestPing {
    pub device_id: DeviceId,
    pub kind: ProbeKind,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub reachable: bool,
    pub rtt_avg_ms: Option<f64>,
    pub packet_loss_percent: f64,
}

impl From<&ProbeResult> for LatestPing {
    fn from(result: &ProbeResult) -> Self {
        Self {
            device_id: result.device_id.clone(),
            kind: result.kind,
            timestamp: result.timestamp,
            sequence: result.sequence,
            reachable: result.reachable,
            rtt_avg_ms: result.rtt_avg_ms,
            packet_loss_percent: result.packet_loss_percent,
        }
    }
}

impl LatestPing {
    /// Same ordering rule as `ProbeResult::is_newer_than` — a reordered
    /// probe must not clobber a newer `latest_ping` row.
    pub fn is_newer_than(&self, last_timestamp: DateTime<Utc>, last_sequence: u64) -> bool {
        (self.timestamp, self.sequence) > (last_timestamp, last_sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_result_has_no_rtt_and_full_loss() {
        let r = ProbeResult::unreachable(
            DeviceId::from("d1"),
            "10.0.0.1".parse().unwrap(),
            ProbeKind::Icmp,
            Utc::now(),
            1,
            FailureReason::Timeout,
        );
        assert!(!r.reachable);
        assert!(r.rtt_avg_ms.is_none());
        assert!(r.packet_loss_percent >= 100.0);
    }

    #[test]
    fn ordering_breaks_ties_on_sequence() {
        let ts = Utc::now();
        let r = ProbeResult {
            device_id: DeviceId::from("d1"),
            device_ip: "10.0.0.1".parse().unwrap(),
            kind: ProbeKind::Icmp,
            timestamp: ts,
            sequence: 5,
            reachable: true,
            rtt_avg_ms: Some(1.0),
            rtt_min_ms: Some(1.0),
            rtt_max_ms: Some(1.0),
            packet_loss_percent: 0.0,
            varbinds: Vec::new(),
            failure_reason: None,
        };
        assert!(r.is_newer_than(ts, 4));
        assert!(!r.is_newer_than(ts, 5));
        assert!(!r.is_newer_than(ts, 6));
    }
}
