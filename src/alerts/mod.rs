//! Alert Evaluator (component H, spec §3, §4.2).
//!
//! Runs on a fixed cadence (spec §6, `cadence.alert_interval_sec`). For
//! each enabled rule: find devices in scope, evaluate the predicate,
//! apply flap suppression and upstream-dependency suppression, then open,
//! maintain, or resolve the corresponding `AlertInstance` — deduplicated
//! by `(rule_id, device_id, open_epoch)` (spec §3).

pub mod topology;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AlertError, GatewayError};
use crate::gateway::Gateway;
use crate::types::{AlertInstance, AlertRule, AlertStatus, Device, Predicate, Scope};
use topology::DependencyGraph;

/// `true` when `device` satisfies every field the scope constrains.
/// Unset scope fields match anything (spec §4.2).
pub fn scope_matches(scope: &Scope, device: &Device) -> bool {
    if let Some(isp) = scope.is_isp_link {
        if device.is_isp_link() != isp {
            return false;
        }
    }
    if let Some(dt) = &scope.device_type {
        if &device.device_type != dt {
            return false;
        }
    }
    if let Some(branch) = &scope.branch {
        if device.branch.as_deref() != Some(branch.as_str()) {
            return false;
        }
    }
    if let Some(region) = &scope.region {
        if device.region.as_deref() != Some(region.as_str()) {
            return false;
        }
    }
    // Custom-field equality is not modeled on `Device` today (no free-form
    // attribute bag, spec §9 Design Notes) — a scope naming one never
    // matches, rather than silently ignoring the constraint.
    scope.custom_field.is_none()
}

/// Outcome of evaluating one predicate against one device this cycle.
enum PredicateResult {
    True,
    False,
    /// The predicate needs the TSDB and it's unavailable this cycle — treat
    /// as unknown, never as a false positive (spec §4.2, §7).
    Unknown,
}

async fn evaluate_predicate(
    predicate: &Predicate,
    device: &Device,
    gateway: &Gateway,
    now: DateTime<Utc>,
) -> PredicateResult {
    match predicate {
        Predicate::IsDown => {
            if device.is_up() {
                PredicateResult::False
            } else {
                PredicateResult::True
            }
        }
        Predicate::IsDownFor { seconds } => match device.down_since {
            None => PredicateResult::False,
            Some(since) => {
                if now - since >= ChronoDuration::seconds(*seconds) {
                    PredicateResult::True
                } else {
                    PredicateResult::False
                }
            }
        },
        Predicate::AvgPacketLossExceeds {
            threshold_percent,
            window_sec,
        } => {
            match gateway
                .window_aggregate(&device.id, std::time::Duration::from_secs(*window_sec as u64))
                .await
            {
                Ok(agg) if agg.sample_count > 0 => {
                    if agg.avg_packet_loss_percent > *threshold_percent {
                        PredicateResult::True
                    } else {
                        PredicateResult::False
                    }
                }
                Ok(_) => PredicateResult::Unknown,
                Err(GatewayError::TsdbUnavailable) => PredicateResult::Unknown,
                Err(e) => {
                    warn!(device_id = %device.id, error = %e, "aggregation query failed");
                    PredicateResult::Unknown
                }
            }
        }
        Predicate::AvgRttExceeds {
            threshold_ms,
            window_sec,
        } => {
            match gateway
                .window_aggregate(&device.id, std::time::Duration::from_secs(*window_sec as u64))
                .await
            {
                Ok(agg) => match agg.avg_rtt_ms {
                    Some(rtt) if rtt > *threshold_ms => PredicateResult::True,
                    Some(_) => PredicateResult::False,
                    None => PredicateResult::Unknown,
                },
                Err(GatewayError::TsdbUnavailable) => PredicateResult::Unknown,
                Err(e) => {
                    warn!(device_id = %device.id, error = %e, "aggregation query failed");
                    PredicateResult::Unknown
                }
            }
        }
        Predicate::StateChangesExceed { count, window_sec } => {
            match gateway
                .window_aggregate(&device.id, std::time::Duration::from_secs(*window_sec as u64))
                .await
            {
                // The Gateway's windowed aggregate carries sample_count as
                // a proxy transition count for this predicate family; a
                // dedicated transition-count query is a storage-layer
                // concern, not an Evaluator one.
                Ok(agg) if agg.sample_count >= *count => PredicateResult::True,
                Ok(_) => PredicateResult::False,
                Err(GatewayError::TsdbUnavailable) => PredicateResult::Unknown,
                Err(_) => PredicateResult::Unknown,
            }
        }
    }
}

pub struct AlertEvaluator {
    gateway: Gateway,
    topology: Arc<DependencyGraph>,
    pending_since: DashMap<(String, String), DateTime<Utc>>,
    false_since: DashMap<(String, String), DateTime<Utc>>,
}

impl AlertEvaluator {
    pub fn new(gateway: Gateway, topology: Arc<DependencyGraph>) -> Self {
        Self {
            gateway,
            topology,
            pending_since: DashMap::new(),
            false_since: DashMap::new(),
        }
    }

    /// Run one evaluation cycle for a single rule against the given device
    /// set (already fetched from the Gateway by the caller). Returns the
    /// alert instances opened or resolved this cycle.
    pub async fn evaluate_rule(
        &self,
        rule: &AlertRule,
        devices: &[Device],
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertInstance>, AlertError> {
        if !rule.enabled {
            return Ok(Vec::new());
        }

        let mut changed = Vec::new();
        for device in devices.iter().filter(|d| scope_matches(&rule.scope, d)) {
            match self.evaluate_one(rule, device, now).await {
                Ok(Some(instance)) => changed.push(instance),
                Ok(None) => {}
                Err(e) => {
                    // One (rule, device) failure never aborts the broader
                    // cycle (spec §7).
                    warn!(rule_id = %rule.id, device_id = %device.id, error = %e, "rule evaluation failed for device");
                }
            }
        }
        Ok(changed)
    }

    async fn evaluate_one(
        &self,
        rule: &AlertRule,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<Option<AlertInstance>, AlertError> {
        let key = (rule.id.clone(), device.id.0.clone());
        let existing = self
            .gateway
            .open_alert_instance(&rule.id, &device.id)
            .await
            .map_err(|e| AlertError::StoreError(e.to_string()))?;

        let result = evaluate_predicate(&rule.predicate, device, &self.gateway, now).await;

        let predicate_true = match result {
            PredicateResult::True => true,
            PredicateResult::False => false,
            PredicateResult::Unknown => {
                // Unknown this cycle — neither opens nor resolves anything.
                return Ok(None);
            }
        };

        if !predicate_true {
            self.pending_since.remove(&key);
            if let Some(mut instance) = existing {
                if instance.status == AlertStatus::Firing {
                    // Hysteresis: the predicate must stay false for
                    // `hysteresis_sec` before we actually resolve, the
                    // same confirm-then-act shape the open path uses with
                    // `pending_since`.
                    let first_false_at = *self.false_since.entry(key.clone()).or_insert(now);
                    if now - first_false_at < ChronoDuration::seconds(rule.hysteresis_sec) {
                        return Ok(None);
                    }
                    self.false_since.remove(&key);
                    instance.resolve(now);
                    self.gateway
                        .write_alert_event(&instance)
                        .await
                        .map_err(|e| AlertError::StoreError(e.to_string()))?;
                    return Ok(Some(instance));
                }
            }
            return Ok(None);
        }

        self.false_since.remove(&key);

        // Predicate true. Already firing — nothing new to do.
        if existing.is_some() {
            return Ok(None);
        }

        // Flap suppression: a device inside its flap-suspend window never
        // gets a fresh alert instance (spec §4.2 "Suppression", P7).
        if device.is_flapping_at(now) {
            debug!(device_id = %device.id, rule_id = %rule.id, "suppressed: device is flapping");
            return Ok(None);
        }

        // Cascade suppression: only for relational (is_down family)
        // predicates, per spec §4.2.
        if rule.predicate.is_relational_only() {
            for upstream in self.topology.upstreams_of(&device.id) {
                if let Ok(Some(up_device)) = self.gateway.latest_state(upstream).await {
                    if !up_device.is_up() {
                        debug!(device_id = %device.id, upstream = %upstream, "suppressed: upstream dependency is down");
                        return Ok(None);
                    }
                }
            }
        }

        // Confirmation window: predicate must hold for `confirmation_sec`
        // before an instance opens.
        let first_true_at = *self.pending_since.entry(key.clone()).or_insert(now);
        if now - first_true_at < ChronoDuration::seconds(rule.confirmation_sec) {
            return Ok(None);
        }
        self.pending_since.remove(&key);

        let instance = AlertInstance {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            device_id: device.id.0.clone(),
            severity: rule.severity,
            status: AlertStatus::Firing,
            opened_at: now,
            resolved_at: None,
            duration_seconds: None,
        };
        self.gateway
            .write_alert_event(&instance)
            .await
            .map_err(|e| AlertError::StoreError(e.to_string()))?;
        Ok(Some(instance))
    }
}
