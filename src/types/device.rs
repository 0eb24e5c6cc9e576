//! Device entity (spec §3) — represented as an immutable value type.
//!
//! Domain operations never mutate a `Device` in place; the State Machine
//! (component G) is the sole writer of `down_since`/`flap_state`, and it
//! does so by producing a new `Device` value, never by handing out `&mut`
//! references across await points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Opaque, stable device identifier. Never a free-form attribute bag —
/// just the identity a device keeps for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How a device is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    IcmpOnly,
    Snmp,
    Both,
}

impl MonitoringMode {
    pub fn wants_icmp(self) -> bool {
        matches!(self, MonitoringMode::IcmpOnly | MonitoringMode::Both)
    }

    pub fn wants_snmp(self) -> bool {
        matches!(self, MonitoringMode::Snmp | MonitoringMode::Both)
    }
}

impl FromStr for MonitoringMode {
    type Err = String;

    /// Parses the `Debug` spelling the relational store writes
    /// (`upsert_device` binds `format!("{:?}", monitoring_mode)`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IcmpOnly" => Ok(MonitoringMode::IcmpOnly),
            "Snmp" => Ok(MonitoringMode::Snmp),
            "Both" => Ok(MonitoringMode::Both),
            other => Err(format!("unknown monitoring_mode {other:?}")),
        }
    }
}

/// Flap classification state (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlapState {
    Stable,
    Suspected,
    Flapping,
}

impl Default for FlapState {
    fn default() -> Self {
        FlapState::Stable
    }
}

impl FromStr for FlapState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Stable" => Ok(FlapState::Stable),
            "Suspected" => Ok(FlapState::Suspected),
            "Flapping" => Ok(FlapState::Flapping),
            other => Err(format!("unknown flap_state {other:?}")),
        }
    }
}

/// A device in the monitored fleet.
///
/// Invariant: `down_since.is_none()` iff the last probe window ended UP.
/// Invariant: `flap_state == Flapping` implies `flap_until` is set and is
/// in the future relative to the timestamp it was computed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub ip: IpAddr,
    pub display_name: String,
    pub device_type: String,
    pub branch: Option<String>,
    pub region: Option<String>,
    pub enabled: bool,
    pub snmp_credential_id: Option<String>,
    pub monitoring_mode: MonitoringMode,
    pub down_since: Option<DateTime<Utc>>,
    pub flap_state: FlapState,
    pub flap_until: Option<DateTime<Utc>>,
}

impl Device {
    /// `true` iff the device's IPv4 address's last octet is `5` — the
    /// source system's sole ISP-link heuristic (spec §3, §9 Open
    /// Questions: preserved exactly, not supplemented with an explicit
    /// per-device override).
    pub fn is_isp_link(&self) -> bool {
        match self.ip {
            IpAddr::V4(v4) => v4.octets()[3] == 5,
            IpAddr::V6(_) => false,
        }
    }

    pub fn is_up(&self) -> bool {
        self.down_since.is_none()
    }

    pub fn is_flapping_at(&self, now: DateTime<Utc>) -> bool {
        self.flap_state == FlapState::Flapping
            && self.flap_until.is_some_and(|until| until > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_with_ip(ip: &str) -> Device {
        Device {
            id: DeviceId::from("d1"),
            ip: ip.parse().unwrap(),
            display_name: "test".into(),
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

    #[test]
    fn isp_link_heuristic_matches_last_octet_five() {
        assert!(device_with_ip("10.195.31.5").is_isp_link());
        assert!(!device_with_ip("10.195.31.252").is_isp_link());
        assert!(!device_with_ip("10.195.31.253").is_isp_link());
    }

    #[test]
    fn ipv6_never_classified_as_isp_link() {
        assert!(!device_with_ip("::5").is_isp_link());
    }

    #[test]
    fn up_iff_down_since_is_none() {
        let mut d = device_with_ip("10.0.0.1");
        assert!(d.is_up());
        d.down_since = Some(Utc::now());
        assert!(!d.is_up());
    }
}
