//! Common types used across the intent engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Driver family selected for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Cisco,
    Huawei,
    #[serde(rename = "openconfig")]
    OpenConfig,
    #[serde(rename = "openflow")]
    OpenFlow,
}

impl Vendor {
    pub const ALL: [Vendor; 4] = [
        Vendor::Cisco,
        Vendor::Huawei,
        Vendor::OpenConfig,
        Vendor::OpenFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Cisco => "cisco",
            Vendor::Huawei => "huawei",
            Vendor::OpenConfig => "openconfig",
            Vendor::OpenFlow => "openflow",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cisco" | "ios_xe" | "cisco_ios_xe" => Ok(Vendor::Cisco),
            "huawei" | "huawei_vrp" | "huawei_vrp8" => Ok(Vendor::Huawei),
            "openconfig" => Ok(Vendor::OpenConfig),
            "openflow" => Ok(Vendor::OpenFlow),
            other => Err(Error::UnsupportedVendor(other.to_string())),
        }
    }
}

/// Operating system stored on the device record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OsType {
    CiscoIosXe,
    HuaweiVrp,
    OpenConfig,
    OpenFlow,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::CiscoIosXe => "CISCO_IOS_XE",
            OsType::HuaweiVrp => "HUAWEI_VRP",
            OsType::OpenConfig => "OPEN_CONFIG",
            OsType::OpenFlow => "OPEN_FLOW",
        }
    }

    /// Driver family that speaks this operating system's schema
    pub fn vendor(&self) -> Vendor {
        match self {
            OsType::CiscoIosXe => Vendor::Cisco,
            OsType::HuaweiVrp => Vendor::Huawei,
            OsType::OpenConfig => Vendor::OpenConfig,
            OsType::OpenFlow => Vendor::OpenFlow,
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CISCO_IOS_XE" | "IOS_XE" => Ok(OsType::CiscoIosXe),
            "HUAWEI_VRP" | "HUAWEI_VRP8" => Ok(OsType::HuaweiVrp),
            "OPEN_CONFIG" | "OPENCONFIG" => Ok(OsType::OpenConfig),
            "OPEN_FLOW" | "OPENFLOW" => Ok(OsType::OpenFlow),
            other => Err(Error::UnsupportedVendor(other.to_string())),
        }
    }
}

/// How the device is managed through the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ManagementProtocol {
    #[default]
    Netconf,
    Openflow,
}

impl ManagementProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagementProtocol::Netconf => "NETCONF",
            ManagementProtocol::Openflow => "OPENFLOW",
        }
    }
}

impl fmt::Display for ManagementProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManagementProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NETCONF" => Ok(ManagementProtocol::Netconf),
            "OPENFLOW" => Ok(ManagementProtocol::Openflow),
            other => Err(Error::InvalidParams(format!(
                "unknown management protocol '{}'",
                other
            ))),
        }
    }
}

/// NETCONF session state as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    UnableToConnect,
    #[default]
    NotMounted,
    Timeout,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::UnableToConnect => "unable-to-connect",
            ConnectionStatus::NotMounted => "not-mounted",
            ConnectionStatus::Timeout => "timeout",
        }
    }

    /// Map the controller's `connection-status` leaf. Unknown values are
    /// treated as a failed session rather than a healthy one.
    pub fn from_controller(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "connected" => ConnectionStatus::Connected,
            "connecting" => ConnectionStatus::Connecting,
            "not-mounted" => ConnectionStatus::NotMounted,
            "timeout" => ConnectionStatus::Timeout,
            _ => ConnectionStatus::UnableToConnect,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Whether a poll loop should stop on this status
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected | ConnectionStatus::UnableToConnect
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ConnectionStatus::from_controller(s))
    }
}

/// Reachability flag kept on the device record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "ONLINE",
            DeviceStatus::Offline => "OFFLINE",
        }
    }

    pub fn from_connection(status: ConnectionStatus) -> Self {
        if status.is_connected() {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(DeviceStatus::Online),
            "OFFLINE" => Ok(DeviceStatus::Offline),
            other => Err(Error::InvalidParams(format!("unknown device status '{}'", other))),
        }
    }
}

/// What a driver needs to know about the target device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub node_id: String,
    pub vendor: Vendor,
    #[serde(default)]
    pub os_type: Option<OsType>,
    /// OpenFlow switches only; falls back to `node_id` when unset
    #[serde(default)]
    pub datapath_id: Option<String>,
}

impl DeviceProfile {
    pub fn new(node_id: impl Into<String>, vendor: Vendor) -> Self {
        Self {
            node_id: node_id.into(),
            vendor,
            os_type: None,
            datapath_id: None,
        }
    }

    pub fn with_os_type(mut self, os_type: OsType) -> Self {
        self.os_type = Some(os_type);
        self
    }

    pub fn with_datapath_id(mut self, datapath_id: impl Into<String>) -> Self {
        self.datapath_id = Some(datapath_id.into());
        self
    }
}
