//! Device and interface records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nbi_core::{
    ConnectionStatus, DeviceProfile, DeviceStatus, Error, ManagementProtocol, OsType, Vendor,
};

pub const DEFAULT_NETCONF_PORT: u16 = 830;

/// A managed device as persisted by the surrounding application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Row id, 0 until stored
    pub id: i64,
    pub name: String,
    /// Controller node id; unset until the device is mounted or discovered
    pub node_id: Option<String>,
    pub vendor: Vendor,
    pub os_type: Option<OsType>,
    pub management_protocol: ManagementProtocol,
    pub ip_address: Option<String>,
    pub netconf_host: Option<String>,
    pub netconf_port: u16,
    pub netconf_username: Option<String>,
    pub netconf_password: Option<String>,
    pub datapath_id: Option<String>,
    pub mounted: bool,
    pub connection_status: ConnectionStatus,
    /// Last mount failure, cleared on a successful mount
    pub mount_error: Option<String>,
    pub status: DeviceStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>, vendor: Vendor, protocol: ManagementProtocol) -> Self {
        Self {
            id: 0,
            name: name.into(),
            node_id: None,
            vendor,
            os_type: None,
            management_protocol: protocol,
            ip_address: None,
            netconf_host: None,
            netconf_port: DEFAULT_NETCONF_PORT,
            netconf_username: None,
            netconf_password: None,
            datapath_id: None,
            mounted: false,
            connection_status: ConnectionStatus::NotMounted,
            mount_error: None,
            status: DeviceStatus::Offline,
            last_synced_at: None,
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.netconf_username = Some(username.into());
        self.netconf_password = Some(password.into());
        self
    }

    /// NETCONF host, falling back to the management address
    pub fn host(&self) -> Option<&str> {
        self.netconf_host
            .as_deref()
            .or(self.ip_address.as_deref())
            .filter(|h| !h.is_empty())
    }

    pub fn is_openflow(&self) -> bool {
        self.management_protocol == ManagementProtocol::Openflow
    }

    /// Driver view of the device. Requires a node id.
    pub fn profile(&self) -> Result<DeviceProfile, Error> {
        let node_id = self
            .node_id
            .clone()
            .ok_or_else(|| Error::not_mounted(format!("device '{}' has no node_id", self.name)))?;
        let vendor = self.os_type.map(|os| os.vendor()).unwrap_or(self.vendor);
        let mut profile = DeviceProfile::new(node_id, vendor);
        profile.os_type = self.os_type;
        profile.datapath_id = self.datapath_id.clone();
        Ok(profile)
    }

    /// Apply a live controller status to the record
    pub fn apply_connection(&mut self, status: ConnectionStatus, at: DateTime<Utc>) {
        self.connection_status = status;
        self.status = DeviceStatus::from_connection(status);
        self.mounted = !matches!(status, ConnectionStatus::NotMounted);
        self.last_synced_at = Some(at);
    }
}

/// Switch port or router interface known for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub id: i64,
    pub device_id: i64,
    pub name: String,
    /// OpenFlow port number, assigned by topology sync
    pub port_number: Option<u32>,
    pub mac_address: Option<String>,
    /// Termination point id such as `openflow:1:2`
    pub tp_id: Option<String>,
    /// `UP` | `DOWN`
    pub status: String,
}

impl InterfaceRecord {
    pub fn new(device_id: i64, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            device_id,
            name: name.into(),
            port_number: None,
            mac_address: None,
            tp_id: None,
            status: "UP".to_string(),
        }
    }

    pub fn with_port(mut self, port: u32) -> Self {
        self.port_number = Some(port);
        self
    }
}
