//! Built-in defaults, matching spec §6's configuration table exactly.

pub const ICMP_INTERVAL_SEC: u64 = 10;
pub const SNMP_INTERVAL_SEC: u64 = 60;
pub const ALERT_INTERVAL_SEC: u64 = 10;
pub const INTERFACE_DISCOVERY_INTERVAL_SEC: u64 = 3_600;
pub const CLEANUP_INTERVAL_SEC: u64 = 86_400;
pub const WORKER_HEALTH_CHECK_INTERVAL_SEC: u64 = 300;

pub const BATCH_MIN_SIZE: usize = 50;
pub const BATCH_MAX_SIZE: usize = 500;
pub const BATCH_TARGET_COUNT: usize = 10;

pub const WORKER_POOL_ALERTS: usize = 6;
pub const WORKER_POOL_MONITORING: usize = 15;
pub const WORKER_POOL_SNMP: usize = 10;
pub const WORKER_POOL_MAINTENANCE: usize = 2;
pub const WORKER_TASKS_PER_CHILD: u64 = 1_000;

pub const ICMP_TIMEOUT_MS: u64 = 10_000;
pub const SNMP_GET_TIMEOUT_MS: u64 = 5_000;
pub const SNMP_WALK_TIMEOUT_MS: u64 = 30_000;

pub const RELATIONAL_POOL_SIZE: u32 = 100;
pub const RELATIONAL_OVERFLOW: u32 = 200;
pub const RELATIONAL_STATEMENT_TIMEOUT_MS: u64 = 30_000;
pub const RELATIONAL_IDLE_IN_TX_TIMEOUT_MS: u64 = 60_000;

pub const TSDB_WRITE_TIMEOUT_MS: u64 = 10_000;
pub const TSDB_QUERY_TIMEOUT_MS: u64 = 2_000;

pub const CACHE_DEVICE_LIST_TTL_SEC: u64 = 30;
pub const CACHE_DEVICE_DETAIL_TTL_SEC: u64 = 30;
pub const CACHE_ALERT_RULE_LIST_TTL_SEC: u64 = 60;
pub const CACHE_ISP_STATUS_TTL_SEC: u64 = 30;

pub const RETENTION_PING_HISTORY_DAYS: u32 = 30;

pub const FLAP_WINDOW_SEC: u64 = 300;
pub const FLAP_TRANSITIONS: u32 = 3;
pub const FLAP_TRANSITIONS_ISP: u32 = 2;
pub const FLAP_SUSPEND_SEC: u64 = 600;

/// Bulk read chunk bound — a hard correctness requirement (spec §4.3), not
/// a tunable.
pub const BULK_READ_CHUNK_SIZE: usize = 50;

/// Local retry budget for store writes before raising a health-check alert
/// (spec §7, "Relational store failure" / "TSDB store failure").
pub const STORE_WRITE_RETRIES: u32 = 3;

/// Drain deadline on shutdown (spec §4.1, "Cancellation and shutdown").
pub const SHUTDOWN_DRAIN_SEC: u64 = 30;

/// Persistent-probe-failure alert threshold (spec §7).
pub const PERSISTENT_FAILURE_ALERT_THRESHOLD: u32 = 10;
