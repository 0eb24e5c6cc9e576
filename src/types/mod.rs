//! Core domain value types (spec §3). Entities are immutable; domain
//! operations return new values rather than mutating in place (spec §9
//! Design Notes — replaces the source's dynamic ORM models).

mod alert;
mod batch;
mod credential;
mod device;
mod interface;
mod probe;

pub use alert::{
    AlertInstance, AlertRule, AlertStatus, DedupKey, Predicate, Scope, Severity, TriggerStats,
};
pub use batch::BatchPlan;
pub use credential::{CredentialSecret, SnmpCredential, SnmpVersion, V3Params};
pub use device::{Device, DeviceId, FlapState, MonitoringMode};
pub use interface::{Interface, InterfaceType, OperStatus};
pub use probe::{FailureReason, LatestPing, ProbeKind, ProbeResult, Varbind};
