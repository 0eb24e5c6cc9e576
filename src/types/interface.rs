//! Interface entity (spec §3), keyed by (device_id, if_index).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::device::DeviceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    Isp,
    Trunk,
    Access,
    Mgmt,
    Loopback,
    Wan,
    Lan,
    Server,
    Unknown,
}

impl FromStr for InterfaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Isp" => Ok(InterfaceType::Isp),
            "Trunk" => Ok(InterfaceType::Trunk),
            "Access" => Ok(InterfaceType::Access),
            "Mgmt" => Ok(InterfaceType::Mgmt),
            "Loopback" => Ok(InterfaceType::Loopback),
            "Wan" => Ok(InterfaceType::Wan),
            "Lan" => Ok(InterfaceType::Lan),
            "Server" => Ok(InterfaceType::Server),
            "Unknown" => Ok(InterfaceType::Unknown),
            other => Err(format!("unknown interface_type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperStatus {
    Up,
    Down,
    Testing,
    Unknown,
}

impl FromStr for OperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Up" => Ok(OperStatus::Up),
            "Down" => Ok(OperStatus::Down),
            "Testing" => Ok(OperStatus::Testing),
            "Unknown" => Ok(OperStatus::Unknown),
            other => Err(format!("unknown oper_status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub device_id: DeviceId,
    pub if_index: i32,
    pub if_name: String,
    pub if_alias: String,
    pub admin_status: OperStatus,
    pub oper_status: OperStatus,
    pub link_speed_bps: Option<u64>,
    pub interface_type: InterfaceType,
    pub isp_provider: Option<String>,
    pub is_critical: bool,
}
