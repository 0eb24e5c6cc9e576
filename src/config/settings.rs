//! The `Settings` struct — one field (or nested struct) per spec §6 option.
//!
//! ## Loading order
//!
//! 1. Built-in defaults (matching spec §6 exactly).
//! 2. `fleetwatch.toml` in the working directory, if present.
//! 3. The file named by `FLEETWATCH_CONFIG`, if set.
//! 4. Individual `FLEETWATCH_*` environment variable overrides.
//!
//! Call `config::init(Settings::load()?)` once at startup, then
//! `config::get()` anywhere.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::defaults as d;
use crate::error::ConfigError;
use crate::types::{AlertRule, Predicate, Scope, Severity, TriggerStats};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub icmp_interval_sec: u64,
    pub snmp_interval_sec: u64,
    pub alert_interval_sec: u64,
    pub interface_discovery_interval_sec: u64,
    pub cleanup_interval_sec: u64,
    pub worker_health_check_interval_sec: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            icmp_interval_sec: d::ICMP_INTERVAL_SEC,
            snmp_interval_sec: d::SNMP_INTERVAL_SEC,
            alert_interval_sec: d::ALERT_INTERVAL_SEC,
            interface_discovery_interval_sec: d::INTERFACE_DISCOVERY_INTERVAL_SEC,
            cleanup_interval_sec: d::CLEANUP_INTERVAL_SEC,
            worker_health_check_interval_sec: d::WORKER_HEALTH_CHECK_INTERVAL_SEC,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub target_count: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_size: d::BATCH_MIN_SIZE,
            max_size: d::BATCH_MAX_SIZE,
            target_count: d::BATCH_TARGET_COUNT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub alerts: usize,
    pub monitoring: usize,
    pub snmp: usize,
    pub maintenance: usize,
    pub tasks_per_child: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            alerts: d::WORKER_POOL_ALERTS,
            monitoring: d::WORKER_POOL_MONITORING,
            snmp: d::WORKER_POOL_SNMP,
            maintenance: d::WORKER_POOL_MAINTENANCE,
            tasks_per_child: d::WORKER_TASKS_PER_CHILD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub icmp_timeout_ms: u64,
    pub snmp_get_timeout_ms: u64,
    pub snmp_walk_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            icmp_timeout_ms: d::ICMP_TIMEOUT_MS,
            snmp_get_timeout_ms: d::SNMP_GET_TIMEOUT_MS,
            snmp_walk_timeout_ms: d::SNMP_WALK_TIMEOUT_MS,
        }
    }
}

impl ProbeConfig {
    pub fn icmp_timeout(&self) -> Duration {
        Duration::from_millis(self.icmp_timeout_ms)
    }
    pub fn snmp_get_timeout(&self) -> Duration {
        Duration::from_millis(self.snmp_get_timeout_ms)
    }
    pub fn snmp_walk_timeout(&self) -> Duration {
        Duration::from_millis(self.snmp_walk_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    pub database_url: String,
    pub pool_size: u32,
    pub overflow: u32,
    pub statement_timeout_ms: u64,
    pub idle_in_tx_timeout_ms: u64,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            pool_size: d::RELATIONAL_POOL_SIZE,
            overflow: d::RELATIONAL_OVERFLOW,
            statement_timeout_ms: d::RELATIONAL_STATEMENT_TIMEOUT_MS,
            idle_in_tx_timeout_ms: d::RELATIONAL_IDLE_IN_TX_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TsdbConfig {
    pub write_url: String,
    pub query_url: String,
    pub write_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

impl Default for TsdbConfig {
    fn default() -> Self {
        Self {
            write_url: String::new(),
            query_url: String::new(),
            write_timeout_ms: d::TSDB_WRITE_TIMEOUT_MS,
            query_timeout_ms: d::TSDB_QUERY_TIMEOUT_MS,
        }
    }
}

impl TsdbConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub device_list_ttl_sec: u64,
    pub device_detail_ttl_sec: u64,
    pub alert_rule_list_ttl_sec: u64,
    pub isp_status_ttl_sec: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            device_list_ttl_sec: d::CACHE_DEVICE_LIST_TTL_SEC,
            device_detail_ttl_sec: d::CACHE_DEVICE_DETAIL_TTL_SEC,
            alert_rule_list_ttl_sec: d::CACHE_ALERT_RULE_LIST_TTL_SEC,
            isp_status_ttl_sec: d::CACHE_ISP_STATUS_TTL_SEC,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub ping_history_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ping_history_days: d::RETENTION_PING_HISTORY_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlapConfig {
    pub window_sec: u64,
    pub transitions: u32,
    pub transitions_isp: u32,
    pub suspend_sec: u64,
}

impl Default for FlapConfig {
    fn default() -> Self {
        Self {
            window_sec: d::FLAP_WINDOW_SEC,
            transitions: d::FLAP_TRANSITIONS,
            transitions_isp: d::FLAP_TRANSITIONS_ISP,
            suspend_sec: d::FLAP_SUSPEND_SEC,
        }
    }
}

/// Bind address for the ambient health/readiness endpoint (not the
/// out-of-scope dashboard API).
fn default_health_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Built-in alert rule set, seeded into the relational store at every
/// startup (spec §4.2). There is no admin API to create rules (the
/// dashboard's business-data API is out of scope) — this is the only
/// source of rules for a fresh deployment. Re-seeding is idempotent:
/// `upsert_alert_rule` never touches `trigger_stats`, so restarting never
/// resets a rule's trigger history.
fn default_alert_rules() -> Vec<AlertRule> {
    vec![
        AlertRule {
            id: "device-down".to_string(),
            name: "Device unreachable".to_string(),
            severity: Severity::Critical,
            predicate: Predicate::IsDownFor { seconds: 60 },
            scope: Scope::any(),
            confirmation_sec: 0,
            hysteresis_sec: 30,
            enabled: true,
            trigger_stats: TriggerStats::default(),
        },
        AlertRule {
            id: "isp-link-down".to_string(),
            name: "ISP link unreachable".to_string(),
            severity: Severity::Critical,
            predicate: Predicate::IsDownFor { seconds: 20 },
            scope: Scope::isp_links_only(),
            confirmation_sec: 0,
            hysteresis_sec: 30,
            enabled: true,
            trigger_stats: TriggerStats::default(),
        },
        AlertRule {
            id: "high-packet-loss".to_string(),
            name: "Sustained packet loss".to_string(),
            severity: Severity::High,
            predicate: Predicate::AvgPacketLossExceeds { threshold_percent: 10.0, window_sec: 300 },
            scope: Scope::any(),
            confirmation_sec: 60,
            hysteresis_sec: 60,
            enabled: true,
            trigger_stats: TriggerStats::default(),
        },
        AlertRule {
            id: "flapping".to_string(),
            name: "Excessive state transitions".to_string(),
            severity: Severity::Medium,
            predicate: Predicate::StateChangesExceed { count: 5, window_sec: 600 },
            scope: Scope::any(),
            confirmation_sec: 0,
            hysteresis_sec: 0,
            enabled: true,
            trigger_stats: TriggerStats::default(),
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cadence: CadenceConfig,
    pub batch: BatchConfig,
    pub worker: WorkerPoolConfig,
    pub probe: ProbeConfig,
    pub relational: RelationalConfig,
    pub tsdb: TsdbConfig,
    pub cache: CacheConfig,
    pub retention: RetentionConfig,
    pub flap: FlapConfig,
    #[serde(default = "default_health_addr")]
    pub health_addr: String,
    #[serde(default = "default_alert_rules")]
    pub alert_rules: Vec<AlertRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cadence: CadenceConfig::default(),
            batch: BatchConfig::default(),
            worker: WorkerPoolConfig::default(),
            probe: ProbeConfig::default(),
            relational: RelationalConfig::default(),
            tsdb: TsdbConfig::default(),
            cache: CacheConfig::default(),
            retention: RetentionConfig::default(),
            flap: FlapConfig::default(),
            health_addr: default_health_addr(),
            alert_rules: default_alert_rules(),
        }
    }
}

impl Settings {
    /// Load settings per the order documented on the module.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        let candidate = explicit_path
            .map(|p| p.to_path_buf())
            .or_else(|| std::env::var("FLEETWATCH_CONFIG").ok().map(Into::into))
            .or_else(|| {
                let cwd = Path::new("fleetwatch.toml");
                cwd.exists().then(|| cwd.to_path_buf())
            });

        if let Some(path) = candidate {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            settings = toml::from_str(&text)?;
        }

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `FLEETWATCH_*` environment variable overrides, file-config
    /// losing to env-config — matches the precedence the teacher's
    /// `HubConfig::from_env` establishes for `DATABASE_URL`.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.relational.database_url = url;
        }
        if let Ok(url) = std::env::var("FLEETWATCH_TSDB_WRITE_URL") {
            self.tsdb.write_url = url;
        }
        if let Ok(url) = std::env::var("FLEETWATCH_TSDB_QUERY_URL") {
            self.tsdb.query_url = url;
        }
        if let Ok(addr) = std::env::var("FLEETWATCH_HEALTH_ADDR") {
            self.health_addr = addr;
        }
    }

    /// Reject an invalid configuration at load time (spec §7, "Configuration
    /// error"). Old configuration remains active — the caller never swaps
    /// in a half-validated `Settings`.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.min_size == 0 || self.batch.min_size > self.batch.max_size {
            return Err(ConfigError::Invalid(format!(
                "batch.min_size ({}) must be nonzero and <= batch.max_size ({})",
                self.batch.min_size, self.batch.max_size
            )));
        }
        if self.batch.target_count == 0 {
            return Err(ConfigError::Invalid(
                "batch.target_count must be nonzero".to_string(),
            ));
        }
        if self.flap.transitions_isp > self.flap.transitions {
            return Err(ConfigError::Invalid(
                "flap.transitions_isp should not exceed flap.transitions".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let s = Settings::default();
        assert_eq!(s.cadence.icmp_interval_sec, 10);
        assert_eq!(s.cadence.snmp_interval_sec, 60);
        assert_eq!(s.batch.min_size, 50);
        assert_eq!(s.batch.max_size, 500);
        assert_eq!(s.worker.alerts, 6);
        assert_eq!(s.worker.monitoring, 15);
        assert_eq!(s.worker.snmp, 10);
        assert_eq!(s.worker.maintenance, 2);
        assert_eq!(s.flap.transitions, 3);
        assert_eq!(s.flap.transitions_isp, 2);
    }

    #[test]
    fn rejects_inverted_batch_bounds() {
        let mut s = Settings::default();
        s.batch.min_size = 600;
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_zero_target_count() {
        let mut s = Settings::default();
        s.batch.target_count = 0;
        assert!(s.validate().is_err());
    }
}
