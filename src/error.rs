//! Typed error kinds, one family per component boundary (see spec §7).
//!
//! Worker-level errors are caught at the task boundary and converted to
//! failure `ProbeResult`s — they never propagate past the worker loop.
//! Gateway-level errors are surfaced to callers as the typed failures below.

use thiserror::Error;

/// Errors from Probe Drivers (component A). A probe failure is still a data
/// point, not a dropped task — see `workers::recycle` for how these become
/// `ProbeResult`s with a diagnostic reason code instead of aborting the task.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("transient network failure: {0}")]
    Transient(String),
    #[error("persistent failure ({reason}): {detail}")]
    Persistent { reason: &'static str, detail: String },
    #[error("probe cancelled")]
    Cancelled,
}

/// Errors from the Credential Store (component B).
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential found for device {0}")]
    NotFound(String),
    #[error("credential decryption failed (tamper or wrong key)")]
    DecryptionFailed,
    #[error("more than one default credential configured")]
    MultipleDefaults,
}

/// Errors from the Scheduler (components C+D).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("previous instance of task {task} has not completed within {cadence_multiple}x its cadence")]
    PileUp {
        task: &'static str,
        cadence_multiple: u32,
    },
    #[error("failed to persist last-fire time: {0}")]
    PersistFailed(String),
}

/// Errors from the Priority Queue Broker (component E).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {0} is shutting down, rejecting new enqueues")]
    ShuttingDown(&'static str),
    #[error("durable enqueue failed: {0}")]
    EnqueueFailed(String),
}

/// Errors surfaced by the Alert Evaluator (component H).
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("unknown predicate kind: {0}")]
    UnknownPredicate(String),
    #[error("dependency cycle detected for device {0}")]
    DependencyCycle(String),
    #[error("windowed aggregation unavailable this cycle (TSDB down) — treated as unknown")]
    AggregationUnavailable,
    #[error("gateway error while evaluating a rule: {0}")]
    StoreError(String),
}

/// Errors from the Hybrid Metric Store Gateway (component I).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("relational store error: {0}")]
    Relational(#[from] sqlx::Error),
    #[error("relational store persistently unavailable")]
    RelationalUnavailable,
    #[error("TSDB write failed after retries: {0}")]
    TsdbWriteFailed(String),
    #[error("TSDB query timed out or is unavailable")]
    TsdbUnavailable,
    #[error("TSDB query returned malformed data: {0}")]
    TsdbMalformed(String),
    #[error("relational row did not match the expected shape: {0}")]
    RowMapping(String),
}

/// Errors from the Read Cache (component J). Cache failures are never
/// surfaced to callers — this type exists purely for internal logging.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors — rejected at load time; old configuration remains
/// active (spec §7, "Configuration error").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
