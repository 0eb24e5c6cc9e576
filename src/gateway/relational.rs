//! Relational store (spec §3 "Relational store"): the single-row-per-device
//! authority for current state. Every update is an `UPDATE`, never an
//! `INSERT` of a new row per probe — that is what the TSDB is for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use crate::error::GatewayError;
use crate::types::{
    AlertInstance, AlertRule, AlertStatus, Device, DeviceId, FlapState, Interface, LatestPing,
    MonitoringMode, Predicate, ProbeKind, Scope, Severity, TriggerStats,
};

fn parse_col<T: FromStr>(field: &'static str, raw: &str) -> Result<T, GatewayError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| GatewayError::RowMapping(format!("column {field}: {e}")))
}

/// Current-state authority plus alert-instance bookkeeping. One row per
/// device, updated in place (spec §3).
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn upsert_device(&self, device: &Device) -> Result<(), GatewayError>;
    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, GatewayError>;
    async fn get_devices_bulk(&self, ids: &[DeviceId]) -> Result<Vec<Device>, GatewayError>;
    async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError>;

    /// Apply a state-machine transition: sets `down_since`, `flap_state`,
    /// and `flap_until` in a single `UPDATE`.
    async fn update_device_state(
        &self,
        id: &DeviceId,
        down_since: Option<DateTime<Utc>>,
        flap_state: FlapState,
        flap_until: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError>;

    async fn upsert_interfaces(&self, interfaces: &[Interface]) -> Result<(), GatewayError>;
    async fn list_interfaces(&self, device_id: &DeviceId) -> Result<Vec<Interface>, GatewayError>;

    async fn upsert_alert_instance(&self, instance: &AlertInstance) -> Result<(), GatewayError>;
    async fn get_open_alert_instance(
        &self,
        rule_id: &str,
        device_id: &DeviceId,
    ) -> Result<Option<AlertInstance>, GatewayError>;
    async fn list_open_alert_instances(&self) -> Result<Vec<AlertInstance>, GatewayError>;

    /// Reset the 24h/7d trigger counters on the named rule. Driven by a
    /// scheduled maintenance job, not derived on the fly from an event log
    /// (SPEC_FULL §D, Open Question resolution).
    async fn reset_trigger_window(&self, rule_id: &str, reset_24h: bool, reset_7d: bool) -> Result<(), GatewayError>;

    /// Single-row-per-device latest-ping snapshot (spec §3, §4.3), distinct
    /// from `Device.down_since`. Implementations must guard against
    /// reordered writes using the same `(timestamp, sequence)` ordering the
    /// State Machine uses — an older probe arriving late must never
    /// overwrite a newer row.
    async fn upsert_latest_ping(&self, ping: &LatestPing) -> Result<(), GatewayError>;
    async fn get_latest_ping(&self, device_id: &DeviceId) -> Result<Option<LatestPing>, GatewayError>;

    async fn upsert_alert_rule(&self, rule: &AlertRule) -> Result<(), GatewayError>;
    async fn list_enabled_alert_rules(&self) -> Result<Vec<AlertRule>, GatewayError>;
}

/// Postgres-backed implementation. Bulk reads chunk at
/// [`crate::config::defaults::BULK_READ_CHUNK_SIZE`] IDs per sub-query —
/// a hard correctness requirement (spec §4.3), not a tuning knob.
pub struct PostgresRelationalStore {
    pool: PgPool,
}

impl PostgresRelationalStore {
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_device(row: sqlx::postgres::PgRow) -> Result<Device, GatewayError> {
        let ip_text: String = row.try_get("ip")?;
        let monitoring_mode: String = row.try_get("monitoring_mode")?;
        let flap_state: String = row.try_get("flap_state")?;
        Ok(Device {
            id: DeviceId::from(row.try_get::<String, _>("id")?),
            ip: parse_col("ip", &ip_text)?,
            display_name: row.try_get("display_name")?,
            device_type: row.try_get("device_type")?,
            branch: row.try_get("branch")?,
            region: row.try_get("region")?,
            enabled: row.try_get("enabled")?,
            snmp_credential_id: row.try_get("snmp_credential_id")?,
            monitoring_mode: parse_col::<MonitoringMode>("monitoring_mode", &monitoring_mode)?,
            down_since: row.try_get("down_since")?,
            flap_state: parse_col::<FlapState>("flap_state", &flap_state)?,
            flap_until: row.try_get("flap_until")?,
        })
    }

    fn row_to_interface(row: sqlx::postgres::PgRow) -> Result<Interface, GatewayError> {
        let admin_status: String = row.try_get("admin_status")?;
        let oper_status: String = row.try_get("oper_status")?;
        let interface_type: String = row.try_get("interface_type")?;
        let link_speed_bps: Option<i64> = row.try_get("link_speed_bps")?;
        Ok(Interface {
            device_id: DeviceId::from(row.try_get::<String, _>("device_id")?),
            if_index: row.try_get("if_index")?,
            if_name: row.try_get("if_name")?,
            if_alias: row.try_get("if_alias")?,
            admin_status: parse_col("admin_status", &admin_status)?,
            oper_status: parse_col("oper_status", &oper_status)?,
            link_speed_bps: link_speed_bps.map(|v| v as u64),
            interface_type: parse_col("interface_type", &interface_type)?,
            isp_provider: row.try_get("isp_provider")?,
            is_critical: row.try_get("is_critical")?,
        })
    }

    fn row_to_alert_instance(row: sqlx::postgres::PgRow) -> Result<AlertInstance, GatewayError> {
        let severity: String = row.try_get("severity")?;
        let status: String = row.try_get("status")?;
        Ok(AlertInstance {
            id: row.try_get("id")?,
            rule_id: row.try_get("rule_id")?,
            device_id: row.try_get("device_id")?,
            severity: parse_col("severity", &severity)?,
            status: parse_col("status", &status)?,
            opened_at: row.try_get("opened_at")?,
            resolved_at: row.try_get("resolved_at")?,
            duration_seconds: row.try_get("duration_seconds")?,
        })
    }

    fn row_to_latest_ping(row: sqlx::postgres::PgRow) -> Result<LatestPing, GatewayError> {
        let kind: String = row.try_get("kind")?;
        Ok(LatestPing {
            device_id: DeviceId::from(row.try_get::<String, _>("device_id")?),
            kind: parse_col("kind", &kind)?,
            timestamp: row.try_get("timestamp")?,
            sequence: row.try_get::<i64, _>("sequence")? as u64,
            reachable: row.try_get("reachable")?,
            rtt_avg_ms: row.try_get("rtt_avg_ms")?,
            packet_loss_percent: row.try_get("packet_loss_percent")?,
        })
    }

    fn row_to_alert_rule(row: sqlx::postgres::PgRow) -> Result<AlertRule, GatewayError> {
        let severity: String = row.try_get("severity")?;
        let predicate: Json<Predicate> = row.try_get("predicate")?;
        let scope: Json<Scope> = row.try_get("scope")?;
        Ok(AlertRule {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            severity: parse_col("severity", &severity)?,
            predicate: predicate.0,
            scope: scope.0,
            confirmation_sec: row.try_get("confirmation_sec")?,
            hysteresis_sec: row.try_get("hysteresis_sec")?,
            enabled: row.try_get("enabled")?,
            trigger_stats: TriggerStats {
                last_triggered_at: row.try_get("last_triggered_at")?,
                count_24h: row.try_get::<i32, _>("count_24h")? as u32,
                count_7d: row.try_get::<i32, _>("count_7d")? as u32,
            },
        })
    }
}

#[async_trait]
impl RelationalStore for PostgresRelationalStore {
    async fn upsert_device(&self, device: &Device) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO devices (id, ip, display_name, device_type, branch, region, enabled, \
             snmp_credential_id, monitoring_mode, down_since, flap_state, flap_until) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO UPDATE SET \
             ip = EXCLUDED.ip, display_name = EXCLUDED.display_name, \
             device_type = EXCLUDED.device_type, branch = EXCLUDED.branch, \
             region = EXCLUDED.region, enabled = EXCLUDED.enabled, \
             snmp_credential_id = EXCLUDED.snmp_credential_id, \
             monitoring_mode = EXCLUDED.monitoring_mode",
        )
        .bind(&device.id.0)
        .bind(device.ip.to_string())
        .bind(&device.display_name)
        .bind(&device.device_type)
        .bind(&device.branch)
        .bind(&device.region)
        .bind(device.enabled)
        .bind(&device.snmp_credential_id)
        .bind(format!("{:?}", device.monitoring_mode))
        .bind(device.down_since)
        .bind(format!("{:?}", device.flap_state))
        .bind(device.flap_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, GatewayError> {
        let row = sqlx::query(
            "SELECT id, ip, display_name, device_type, branch, region, enabled, \
             snmp_credential_id, monitoring_mode, down_since, flap_state, flap_until \
             FROM devices WHERE id = $1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_device).transpose()
    }

    async fn get_devices_bulk(&self, ids: &[DeviceId]) -> Result<Vec<Device>, GatewayError> {
        use crate::config::defaults::BULK_READ_CHUNK_SIZE;
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BULK_READ_CHUNK_SIZE) {
            let id_strs: Vec<String> = chunk.iter().map(|id| id.0.clone()).collect();
            let rows = sqlx::query(
                "SELECT id, ip, display_name, device_type, branch, region, enabled, \
                 snmp_credential_id, monitoring_mode, down_since, flap_state, flap_until \
                 FROM devices WHERE id = ANY($1)",
            )
            .bind(&id_strs)
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                out.push(Self::row_to_device(row)?);
            }
        }
        Ok(out)
    }

    async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, ip, display_name, device_type, branch, region, enabled, \
             snmp_credential_id, monitoring_mode, down_since, flap_state, flap_until \
             FROM devices WHERE enabled = true",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_device).collect()
    }

    async fn update_device_state(
        &self,
        id: &DeviceId,
        down_since: Option<DateTime<Utc>>,
        flap_state: FlapState,
        flap_until: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE devices SET down_since = $2, flap_state = $3, flap_until = $4 WHERE id = $1",
        )
        .bind(&id.0)
        .bind(down_since)
        .bind(format!("{flap_state:?}"))
        .bind(flap_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_interfaces(&self, interfaces: &[Interface]) -> Result<(), GatewayError> {
        for iface in interfaces {
            sqlx::query(
                "INSERT INTO interfaces (device_id, if_index, if_name, if_alias, admin_status, \
                 oper_status, link_speed_bps, interface_type, isp_provider, is_critical) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (device_id, if_index) DO UPDATE SET \
                 if_name = EXCLUDED.if_name, if_alias = EXCLUDED.if_alias, \
                 admin_status = EXCLUDED.admin_status, oper_status = EXCLUDED.oper_status, \
                 link_speed_bps = EXCLUDED.link_speed_bps, interface_type = EXCLUDED.interface_type, \
                 isp_provider = EXCLUDED.isp_provider",
            )
            .bind(&iface.device_id.0)
            .bind(iface.if_index)
            .bind(&iface.if_name)
            .bind(&iface.if_alias)
            .bind(format!("{:?}", iface.admin_status))
            .bind(format!("{:?}", iface.oper_status))
            .bind(iface.link_speed_bps.map(|v| v as i64))
            .bind(format!("{:?}", iface.interface_type))
            .bind(&iface.isp_provider)
            .bind(iface.is_critical)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_interfaces(&self, device_id: &DeviceId) -> Result<Vec<Interface>, GatewayError> {
        let rows = sqlx::query(
            "SELECT device_id, if_index, if_name, if_alias, admin_status, oper_status, \
             link_speed_bps, interface_type, isp_provider, is_critical \
             FROM interfaces WHERE device_id = $1",
        )
        .bind(&device_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_interface).collect()
    }

    async fn upsert_alert_instance(&self, instance: &AlertInstance) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO alert_instances (id, rule_id, device_id, severity, status, opened_at, \
             resolved_at, duration_seconds) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, \
             resolved_at = EXCLUDED.resolved_at, duration_seconds = EXCLUDED.duration_seconds",
        )
        .bind(&instance.id)
        .bind(&instance.rule_id)
        .bind(&instance.device_id)
        .bind(format!("{:?}", instance.severity))
        .bind(format!("{:?}", instance.status))
        .bind(instance.opened_at)
        .bind(instance.resolved_at)
        .bind(instance.duration_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_open_alert_instance(
        &self,
        rule_id: &str,
        device_id: &DeviceId,
    ) -> Result<Option<AlertInstance>, GatewayError> {
        let row = sqlx::query(
            "SELECT id, rule_id, device_id, severity, status, opened_at, resolved_at, \
             duration_seconds FROM alert_instances \
             WHERE rule_id = $1 AND device_id = $2 AND status != $3",
        )
        .bind(rule_id)
        .bind(&device_id.0)
        .bind(format!("{:?}", AlertStatus::Resolved))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_alert_instance).transpose()
    }

    async fn list_open_alert_instances(&self) -> Result<Vec<AlertInstance>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, rule_id, device_id, severity, status, opened_at, resolved_at, \
             duration_seconds FROM alert_instances WHERE status != $1",
        )
        .bind(format!("{:?}", AlertStatus::Resolved))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_alert_instance).collect()
    }

    async fn reset_trigger_window(
        &self,
        rule_id: &str,
        reset_24h: bool,
        reset_7d: bool,
    ) -> Result<(), GatewayError> {
        if reset_24h {
            sqlx::query("UPDATE alert_rules SET count_24h = 0 WHERE id = $1")
                .bind(rule_id)
                .execute(&self.pool)
                .await?;
        }
        if reset_7d {
            sqlx::query("UPDATE alert_rules SET count_7d = 0 WHERE id = $1")
                .bind(rule_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn upsert_latest_ping(&self, ping: &LatestPing) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO latest_ping (device_id, kind, timestamp, sequence, reachable, \
             rtt_avg_ms, packet_loss_percent) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (device_id) DO UPDATE SET \
             kind = EXCLUDED.kind, timestamp = EXCLUDED.timestamp, sequence = EXCLUDED.sequence, \
             reachable = EXCLUDED.reachable, rtt_avg_ms = EXCLUDED.rtt_avg_ms, \
             packet_loss_percent = EXCLUDED.packet_loss_percent \
             WHERE (latest_ping.timestamp, latest_ping.sequence) < (EXCLUDED.timestamp, EXCLUDED.sequence)",
        )
        .bind(&ping.device_id.0)
        .bind(format!("{:?}", ping.kind))
        .bind(ping.timestamp)
        .bind(ping.sequence as i64)
        .bind(ping.reachable)
        .bind(ping.rtt_avg_ms)
        .bind(ping.packet_loss_percent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_latest_ping(&self, device_id: &DeviceId) -> Result<Option<LatestPing>, GatewayError> {
        let row = sqlx::query(
            "SELECT device_id, kind, timestamp, sequence, reachable, rtt_avg_ms, \
             packet_loss_percent FROM latest_ping WHERE device_id = $1",
        )
        .bind(&device_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_latest_ping).transpose()
    }

    async fn upsert_alert_rule(&self, rule: &AlertRule) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO alert_rules (id, name, severity, predicate, scope, confirmation_sec, \
             hysteresis_sec, enabled, last_triggered_at, count_24h, count_7d) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, severity = EXCLUDED.severity, predicate = EXCLUDED.predicate, \
             scope = EXCLUDED.scope, confirmation_sec = EXCLUDED.confirmation_sec, \
             hysteresis_sec = EXCLUDED.hysteresis_sec, enabled = EXCLUDED.enabled",
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(format!("{:?}", rule.severity))
        .bind(Json(&rule.predicate))
        .bind(Json(&rule.scope))
        .bind(rule.confirmation_sec)
        .bind(rule.hysteresis_sec)
        .bind(rule.enabled)
        .bind(rule.trigger_stats.last_triggered_at)
        .bind(rule.trigger_stats.count_24h as i32)
        .bind(rule.trigger_stats.count_7d as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_enabled_alert_rules(&self) -> Result<Vec<AlertRule>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, name, severity, predicate, scope, confirmation_sec, hysteresis_sec, \
             enabled, last_triggered_at, count_24h, count_7d FROM alert_rules WHERE enabled = true",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_alert_rule).collect()
    }
}

/// In-memory relational store for tests and small deployments — mirrors
/// the shape of a single-row-per-device table without a database.
pub struct InMemoryRelationalStore {
    devices: RwLock<HashMap<DeviceId, Device>>,
    interfaces: RwLock<HashMap<DeviceId, Vec<Interface>>>,
    alert_instances: RwLock<HashMap<String, AlertInstance>>,
    latest_ping: RwLock<HashMap<DeviceId, LatestPing>>,
    alert_rules: RwLock<HashMap<String, AlertRule>>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            interfaces: RwLock::new(HashMap::new()),
            alert_instances: RwLock::new(HashMap::new()),
            latest_ping: RwLock::new(HashMap::new()),
            alert_rules: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRelationalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn upsert_device(&self, device: &Device) -> Result<(), GatewayError> {
        self.devices
            .write()
            .expect("lock poisoned")
            .insert(device.id.clone(), device.clone());
        Ok(())
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, GatewayError> {
        Ok(self.devices.read().expect("lock poisoned").get(id).cloned())
    }

    async fn get_devices_bulk(&self, ids: &[DeviceId]) -> Result<Vec<Device>, GatewayError> {
        use crate::config::defaults::BULK_READ_CHUNK_SIZE;
        let guard = self.devices.read().expect("lock poisoned");
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BULK_READ_CHUNK_SIZE) {
            for id in chunk {
                if let Some(d) = guard.get(id) {
                    out.push(d.clone());
                }
            }
        }
        Ok(out)
    }

    async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
        Ok(self
            .devices
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|d| d.enabled)
            .cloned()
            .collect())
    }

    async fn update_device_state(
        &self,
        id: &DeviceId,
        down_since: Option<DateTime<Utc>>,
        flap_state: FlapState,
        flap_until: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError> {
        let mut guard = self.devices.write().expect("lock poisoned");
        if let Some(device) = guard.get_mut(id) {
            device.down_since = down_since;
            device.flap_state = flap_state;
            device.flap_until = flap_until;
        }
        Ok(())
    }

    async fn upsert_interfaces(&self, interfaces: &[Interface]) -> Result<(), GatewayError> {
        let mut guard = self.interfaces.write().expect("lock poisoned");
        for iface in interfaces {
            let entry = guard.entry(iface.device_id.clone()).or_default();
            if let Some(existing) = entry.iter_mut().find(|i| i.if_index == iface.if_index) {
                *existing = iface.clone();
            } else {
                entry.push(iface.clone());
            }
        }
        Ok(())
    }

    async fn list_interfaces(&self, device_id: &DeviceId) -> Result<Vec<Interface>, GatewayError> {
        Ok(self
            .interfaces
            .read()
            .expect("lock poisoned")
            .get(device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_alert_instance(&self, instance: &AlertInstance) -> Result<(), GatewayError> {
        self.alert_instances
            .write()
            .expect("lock poisoned")
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn get_open_alert_instance(
        &self,
        rule_id: &str,
        device_id: &DeviceId,
    ) -> Result<Option<AlertInstance>, GatewayError> {
        Ok(self
            .alert_instances
            .read()
            .expect("lock poisoned")
            .values()
            .find(|i| {
                i.rule_id == rule_id
                    && i.device_id == device_id.0
                    && i.status != crate::types::AlertStatus::Resolved
            })
            .cloned())
    }

    async fn list_open_alert_instances(&self) -> Result<Vec<AlertInstance>, GatewayError> {
        Ok(self
            .alert_instances
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|i| i.status != crate::types::AlertStatus::Resolved)
            .cloned()
            .collect())
    }

    async fn reset_trigger_window(
        &self,
        rule_id: &str,
        reset_24h: bool,
        reset_7d: bool,
    ) -> Result<(), GatewayError> {
        let mut guard = self.alert_rules.write().expect("lock poisoned");
        if let Some(rule) = guard.get_mut(rule_id) {
            if reset_24h {
                rule.trigger_stats.count_24h = 0;
            }
            if reset_7d {
                rule.trigger_stats.count_7d = 0;
            }
        }
        Ok(())
    }

    async fn upsert_latest_ping(&self, ping: &LatestPing) -> Result<(), GatewayError> {
        let mut guard = self.latest_ping.write().expect("lock poisoned");
        match guard.get(&ping.device_id) {
            Some(existing) if !ping.is_newer_than(existing.timestamp, existing.sequence) => {}
            _ => {
                guard.insert(ping.device_id.clone(), ping.clone());
            }
        }
        Ok(())
    }

    async fn get_latest_ping(&self, device_id: &DeviceId) -> Result<Option<LatestPing>, GatewayError> {
        Ok(self.latest_ping.read().expect("lock poisoned").get(device_id).cloned())
    }

    async fn upsert_alert_rule(&self, rule: &AlertRule) -> Result<(), GatewayError> {
        self.alert_rules
            .write()
            .expect("lock poisoned")
            .insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn list_enabled_alert_rules(&self) -> Result<Vec<AlertRule>, GatewayError> {
        Ok(self
            .alert_rules
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MonitoringMode;

    fn device(id: &str, last_octet: u8) -> Device {
        Device {
            id: DeviceId::from(id),
            ip: std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, last_octet)),
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

    fn ping(device_id: &str, ts: DateTime<Utc>, seq: u64) -> LatestPing {
        LatestPing {
            device_id: DeviceId::from(device_id),
            kind: ProbeKind::Icmp,
            timestamp: ts,
            sequence: seq,
            reachable: true,
            rtt_avg_ms: Some(5.0),
            packet_loss_percent: 0.0,
        }
    }

    #[tokio::test]
    async fn bulk_read_returns_every_requested_device_across_chunk_boundaries() {
        let store = InMemoryRelationalStore::new();
        let ids: Vec<DeviceId> = (0..130).map(|i| DeviceId::from(format!("d{i}"))).collect();
        for (i, id) in ids.iter().enumerate() {
            store.upsert_device(&device(&id.0, (i % 250) as u8)).await.unwrap();
        }
        let found = store.get_devices_bulk(&ids).await.unwrap();
        assert_eq!(found.len(), 130);
    }

    #[tokio::test]
    async fn update_device_state_is_a_single_row_mutation_not_an_insert() {
        let store = InMemoryRelationalStore::new();
        let d = device("d1", 1);
        store.upsert_device(&d).await.unwrap();

        let now = Utc::now();
        store
            .update_device_state(&d.id, Some(now), FlapState::Suspected, None)
            .await
            .unwrap();

        assert_eq!(store.devices.read().unwrap().len(), 1);
        let updated = store.get_device(&d.id).await.unwrap().unwrap();
        assert_eq!(updated.down_since, Some(now));
        assert_eq!(updated.flap_state, FlapState::Suspected);
    }

    #[tokio::test]
    async fn latest_ping_rejects_a_reordered_write() {
        let store = InMemoryRelationalStore::new();
        let now = Utc::now();
        store.upsert_latest_ping(&ping("d1", now + chrono::Duration::seconds(5), 2)).await.unwrap();
        store.upsert_latest_ping(&ping("d1", now, 1)).await.unwrap();

        let current = store.get_latest_ping(&DeviceId::from("d1")).await.unwrap().unwrap();
        assert_eq!(current.sequence, 2);
    }

    #[tokio::test]
    async fn alert_rule_storage_filters_disabled_rules() {
        let store = InMemoryRelationalStore::new();
        let mut enabled = crate::types::AlertRule {
            id: "r1".into(),
            name: "r1".into(),
            severity: Severity::High,
            predicate: Predicate::IsDown,
            scope: Scope::any(),
            confirmation_sec: 0,
            hysteresis_sec: 0,
            enabled: true,
            trigger_stats: TriggerStats::default(),
        };
        let mut disabled = enabled.clone();
        disabled.id = "r2".into();
        disabled.enabled = false;
        enabled.name = "enabled rule".into();

        store.upsert_alert_rule(&enabled).await.unwrap();
        store.upsert_alert_rule(&disabled).await.unwrap();

        let rules = store.list_enabled_alert_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "r1");
    }
}
