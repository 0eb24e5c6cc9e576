//! Probe Drivers (component A, spec §2, §6).
//!
//! Stateless: a driver executes one ICMP echo or one SNMP GET/WALK/GETBULK
//! against one device and returns a typed result or typed error. Drivers
//! never hold a store handle — workers acquire/release store handles
//! around driver calls (spec §5, "acquire → read → release → network I/O
//! → acquire → write").

pub mod icmp;
pub mod snmp;

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::credentials::DecryptedCredential;
use crate::error::ProbeError;
use crate::types::Varbind;

/// Outcome of a single ICMP echo.
#[derive(Debug, Clone, Copy)]
pub struct IcmpEcho {
    pub rtt: Duration,
}

/// Execute ICMP echoes against devices. One implementor per process —
/// `surge_ping::Client` owns the raw socket and is shared across tasks.
#[async_trait]
pub trait IcmpDriver: Send + Sync {
    /// Send one echo and await the reply, or time out at `deadline`.
    async fn ping(&self, ip: IpAddr, deadline: Duration) -> Result<IcmpEcho, ProbeError>;
}

/// Execute SNMP GET / GETBULK against devices.
#[async_trait]
pub trait SnmpDriver: Send + Sync {
    /// A single SNMP GET for the given OIDs.
    async fn get(
        &self,
        target: SocketAddr,
        credential: &DecryptedCredential,
        oids: &[&str],
        deadline: Duration,
    ) -> Result<Vec<Varbind>, ProbeError>;

    /// A walk (GETBULK preferred for v2c/v3) over a subtree rooted at
    /// `base_oid`.
    async fn walk(
        &self,
        target: SocketAddr,
        credential: &DecryptedCredential,
        base_oid: &str,
        deadline: Duration,
    ) -> Result<Vec<Varbind>, ProbeError>;
}

/// Required OIDs (spec §6).
pub mod oids {
    pub const IF_DESCR: &str = "1.3.6.1.2.1.2.2.1.2";
    pub const IF_ALIAS: &str = "1.3.6.1.2.1.31.1.1.1.18";
    pub const IF_OPER_STATUS: &str = "1.3.6.1.2.1.2.2.1.8";
    pub const IF_ADMIN_STATUS: &str = "1.3.6.1.2.1.2.2.1.7";
    pub const IF_HIGH_SPEED: &str = "1.3.6.1.2.1.31.1.1.1.15";
    pub const IF_HC_IN_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.6";
    pub const IF_HC_OUT_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.10";
    pub const IF_IN_ERRORS: &str = "1.3.6.1.2.1.2.2.1.14";
    pub const IF_OUT_ERRORS: &str = "1.3.6.1.2.1.2.2.1.20";
    pub const IF_IN_DISCARDS: &str = "1.3.6.1.2.1.2.2.1.13";
    pub const IF_OUT_DISCARDS: &str = "1.3.6.1.2.1.2.2.1.19";
    pub const SYS_DESCR: &str = "1.3.6.1.2.1.1.1.0";
    pub const SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
    pub const SYS_LOCATION: &str = "1.3.6.1.2.1.1.6.0";
}
