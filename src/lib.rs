//! fleetwatch — network monitoring backend for a distributed device fleet
//!
//! Continuously probes every device by ICMP and SNMP, records operational
//! state with millisecond-scale latency, evaluates declarative alert rules,
//! and exposes aggregated state to external collaborators (the dashboard,
//! out of scope here).
//!
//! ## Architecture
//!
//! - **Scheduler + Batch Planner** ([`scheduler`]): turns the device
//!   inventory into a bounded stream of batch tasks on fixed cadences.
//! - **Queue Broker + Worker Pools** ([`queue`], [`workers`]): four
//!   isolated priority queues, each with its own worker pool.
//! - **Probe Drivers** ([`probes`]): stateless ICMP/SNMP execution.
//! - **Credential Store** ([`credentials`]): SNMP v1/v2c/v3 secrets.
//! - **Device State Machine** ([`state_machine`]): authoritative up/down
//!   state and flap classification.
//! - **Alert Evaluator** ([`alerts`]): predicate evaluation, suppression,
//!   deduplication.
//! - **Hybrid Metric Store Gateway** ([`gateway`]): relational current
//!   state + TSDB time series, fronted by a [`gateway::cache`] read cache.

pub mod config;
pub mod error;
pub mod types;
pub mod probes;
pub mod credentials;
pub mod interfaces;
pub mod scheduler;
pub mod queue;
pub mod workers;
pub mod state_machine;
pub mod alerts;
pub mod gateway;
pub mod background;
pub mod shutdown;
pub mod api;

pub use config::Settings;
pub use error::{
    AlertError, CacheError, ConfigError, CredentialError, GatewayError, ProbeError,
    QueueError, SchedulerError,
};
