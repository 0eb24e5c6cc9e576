//! AlertRule / AlertInstance (spec §3, §4.2). Predicates are a closed set —
//! a rule is always the tuple `(predicate, scope)`, never free-form SQL or
//! an expression language (spec §4.2, §9 Design Notes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Info" => Ok(Severity::Info),
            "Low" => Ok(Severity::Low),
            "Medium" => Ok(Severity::Medium),
            "High" => Ok(Severity::High),
            "Critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Firing,
    Acknowledged,
    Resolved,
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Firing" => Ok(AlertStatus::Firing),
            "Acknowledged" => Ok(AlertStatus::Acknowledged),
            "Resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert_status {other:?}")),
        }
    }
}

/// The closed set of alert predicates (spec §4.2 table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    IsDown,
    IsDownFor { seconds: i64 },
    AvgPacketLossExceeds { threshold_percent: f64, window_sec: i64 },
    AvgRttExceeds { threshold_ms: f64, window_sec: i64 },
    StateChangesExceed { count: u32, window_sec: i64 },
}

impl Predicate {
    /// `true` for predicates that read only the relational `down_since`
    /// column and must never touch the TSDB (spec §4.2 step 3).
    pub fn is_relational_only(&self) -> bool {
        matches!(self, Predicate::IsDown | Predicate::IsDownFor { .. })
    }
}

/// A device-attribute scope filter, combined via AND with the predicate.
/// Equality only — no free-form expressions (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub is_isp_link: Option<bool>,
    pub device_type: Option<String>,
    pub branch: Option<String>,
    pub region: Option<String>,
    /// A single custom-field equality: (field name, expected value).
    pub custom_field: Option<(String, String)>,
}

impl Scope {
    pub fn any() -> Self {
        Self {
            is_isp_link: None,
            device_type: None,
            branch: None,
            region: None,
            custom_field: None,
        }
    }

    pub fn isp_links_only() -> Self {
        Self {
            is_isp_link: Some(true),
            ..Self::any()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerStats {
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub count_24h: u32,
    pub count_7d: u32,
}

impl Default for TriggerStats {
    fn default() -> Self {
        Self {
            last_triggered_at: None,
            count_24h: 0,
            count_7d: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub predicate: Predicate,
    pub scope: Scope,
    /// Confirmation window (seconds) — how long the predicate must hold
    /// before a firing instance opens. Distinct from `IsDownFor`'s own
    /// parameter: this is the rule-level hysteresis, not the predicate's.
    pub confirmation_sec: i64,
    /// Seconds to keep the instance open after the predicate recovers.
    pub hysteresis_sec: i64,
    pub enabled: bool,
    pub trigger_stats: TriggerStats,
}

/// Deduplication key: (rule_id, device_id, open_epoch). At most one firing
/// instance may exist per key (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub rule_id: String,
    pub device_id: String,
    pub open_epoch: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstance {
    pub id: String,
    pub rule_id: String,
    pub device_id: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl AlertInstance {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            rule_id: self.rule_id.clone(),
            device_id: self.device_id.clone(),
            open_epoch: self.opened_at.timestamp(),
        }
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(at);
        self.duration_seconds = Some((at - self.opened_at).num_seconds().max(0));
    }
}
