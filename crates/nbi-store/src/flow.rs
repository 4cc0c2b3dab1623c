//! OpenFlow rule lifecycle records
//!
//! Status transitions:
//! `PENDING -> ACTIVE | FAILED`, `ACTIVE -> DELETED`,
//! `FAILED | DELETED -> PENDING` (retry / reactivate).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

pub const DEFAULT_TABLE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowStatus {
    Pending,
    Active,
    Failed,
    Deleted,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Pending => "PENDING",
            FlowStatus::Active => "ACTIVE",
            FlowStatus::Failed => "FAILED",
            FlowStatus::Deleted => "DELETED",
        }
    }

    /// Rows in these states may be removed from storage
    pub fn allows_hard_delete(&self) -> bool {
        matches!(self, FlowStatus::Failed | FlowStatus::Deleted)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(FlowStatus::Pending),
            "ACTIVE" => Ok(FlowStatus::Active),
            "FAILED" => Ok(FlowStatus::Failed),
            "DELETED" => Ok(FlowStatus::Deleted),
            other => Err(StoreError::InvalidRecord(format!("flow status '{}'", other))),
        }
    }
}

/// Half of a bidirectional pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Forward,
    Reverse,
}

impl FlowDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowDirection::Forward => "forward",
            FlowDirection::Reverse => "reverse",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            FlowDirection::Forward => "-forward",
            FlowDirection::Reverse => "-reverse",
        }
    }
}

impl FromStr for FlowDirection {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(FlowDirection::Forward),
            "reverse" => Ok(FlowDirection::Reverse),
            other => Err(StoreError::InvalidRecord(format!("flow direction '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum L4Protocol {
    Tcp,
    Udp,
}

impl L4Protocol {
    /// IANA protocol number
    pub fn ip_proto(&self) -> u8 {
        match self {
            L4Protocol::Tcp => 6,
            L4Protocol::Udp => 17,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            L4Protocol::Tcp => "tcp",
            L4Protocol::Udp => "udp",
        }
    }
}

impl FromStr for L4Protocol {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "6" => Ok(L4Protocol::Tcp),
            "udp" | "17" => Ok(L4Protocol::Udp),
            other => Err(StoreError::InvalidRecord(format!("protocol '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcmpAction {
    Allow,
    Drop,
}

/// Everything needed to rebuild a rule's match and instructions, one
/// variant per flow template. Serialized with a `flow_type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow_type", rename_all = "snake_case")]
pub enum FlowMatchDetails {
    /// ARP to every port
    ArpFlood,
    /// in_port -> out_port, one direction per row
    BaseConnectivity { in_port: u32, out_port: u32 },
    /// L4 destination port steering
    TrafficSteer {
        in_port: u32,
        out_port: u32,
        protocol: L4Protocol,
        dst_port: u16,
    },
    MacSteer {
        in_port: u32,
        out_port: u32,
        #[serde(default)]
        src_mac: Option<String>,
        #[serde(default)]
        dst_mac: Option<String>,
    },
    IpSteer {
        in_port: u32,
        out_port: u32,
        #[serde(default)]
        src_ip: Option<String>,
        #[serde(default)]
        dst_ip: Option<String>,
    },
    /// Destination subnet in CIDR notation
    SubnetSteer {
        in_port: u32,
        out_port: u32,
        subnet: String,
    },
    /// Lowest-priority catch-all towards the gateway port
    DefaultGateway { out_port: u32 },
    AclMacDrop {
        src_mac: String,
        #[serde(default)]
        in_port: Option<u32>,
    },
    AclIpDrop {
        #[serde(default)]
        src_ip: Option<String>,
        #[serde(default)]
        dst_ip: Option<String>,
    },
    AclPortDrop {
        protocol: L4Protocol,
        dst_port: u16,
        #[serde(default)]
        in_port: Option<u32>,
    },
    /// Permit a source ahead of ACL drops; normal forwarding unless a port is given
    Whitelist {
        src_ip: String,
        #[serde(default)]
        dst_ip: Option<String>,
        #[serde(default)]
        out_port: Option<u32>,
    },
    IcmpControl {
        action: IcmpAction,
        #[serde(default)]
        in_port: Option<u32>,
        #[serde(default)]
        out_port: Option<u32>,
    },
}

impl FlowMatchDetails {
    pub fn flow_type(&self) -> &'static str {
        match self {
            FlowMatchDetails::ArpFlood => "arp_flood",
            FlowMatchDetails::BaseConnectivity { .. } => "base_connectivity",
            FlowMatchDetails::TrafficSteer { .. } => "traffic_steer",
            FlowMatchDetails::MacSteer { .. } => "mac_steer",
            FlowMatchDetails::IpSteer { .. } => "ip_steer",
            FlowMatchDetails::SubnetSteer { .. } => "subnet_steer",
            FlowMatchDetails::DefaultGateway { .. } => "default_gateway",
            FlowMatchDetails::AclMacDrop { .. } => "acl_mac_drop",
            FlowMatchDetails::AclIpDrop { .. } => "acl_ip_drop",
            FlowMatchDetails::AclPortDrop { .. } => "acl_port_drop",
            FlowMatchDetails::Whitelist { .. } => "whitelist",
            FlowMatchDetails::IcmpControl { .. } => "icmp_control",
        }
    }

    /// Priority used when the caller does not supply one
    pub fn default_priority(&self) -> u32 {
        match self {
            FlowMatchDetails::ArpFlood => 1000,
            FlowMatchDetails::BaseConnectivity { .. } => 500,
            FlowMatchDetails::TrafficSteer { .. }
            | FlowMatchDetails::MacSteer { .. }
            | FlowMatchDetails::IpSteer { .. }
            | FlowMatchDetails::SubnetSteer { .. } => 600,
            FlowMatchDetails::DefaultGateway { .. } => 100,
            FlowMatchDetails::AclMacDrop { .. }
            | FlowMatchDetails::AclIpDrop { .. }
            | FlowMatchDetails::AclPortDrop { .. } => 2000,
            FlowMatchDetails::Whitelist { .. } => 1500,
            FlowMatchDetails::IcmpControl { .. } => 1200,
        }
    }

    /// Same template with in/out ports swapped, for the reverse half of a pair
    pub fn reversed(&self) -> Option<Self> {
        match self {
            FlowMatchDetails::BaseConnectivity { in_port, out_port } => {
                Some(FlowMatchDetails::BaseConnectivity {
                    in_port: *out_port,
                    out_port: *in_port,
                })
            }
            _ => None,
        }
    }
}

/// Unique identity of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub node_id: String,
    pub flow_id: String,
    pub table_id: u32,
}

impl FlowKey {
    pub fn new(node_id: impl Into<String>, flow_id: impl Into<String>, table_id: u32) -> Self {
        Self {
            node_id: node_id.into(),
            flow_id: flow_id.into(),
            table_id,
        }
    }

    /// The sibling of a paired rule
    pub fn pair(&self, pair_flow_id: &str) -> Self {
        Self::new(self.node_id.clone(), pair_flow_id, self.table_id)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/table={}/flow={}", self.node_id, self.table_id, self.flow_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    pub id: i64,
    pub flow_id: String,
    pub node_id: String,
    pub table_id: u32,
    pub priority: u32,
    pub bidirectional: bool,
    pub pair_flow_id: Option<String>,
    pub direction: Option<FlowDirection>,
    pub match_details: FlowMatchDetails,
    pub status: FlowStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowRule {
    /// New PENDING rule
    pub fn new(key: FlowKey, priority: u32, match_details: FlowMatchDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            flow_id: key.flow_id,
            node_id: key.node_id,
            table_id: key.table_id,
            priority,
            bidirectional: false,
            pair_flow_id: None,
            direction: None,
            match_details,
            status: FlowStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey::new(self.node_id.clone(), self.flow_id.clone(), self.table_id)
    }

    pub fn flow_type(&self) -> &'static str {
        self.match_details.flow_type()
    }

    pub fn paired_with(mut self, pair_flow_id: impl Into<String>, direction: FlowDirection) -> Self {
        self.bidirectional = true;
        self.pair_flow_id = Some(pair_flow_id.into());
        self.direction = Some(direction);
        self
    }
}

/// Row selection for listings; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct FlowFilter {
    pub node_id: Option<String>,
    pub table_id: Option<u32>,
    pub status: Option<FlowStatus>,
}

impl FlowFilter {
    pub fn node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..Self::default()
        }
    }

    pub fn table(mut self, table_id: u32) -> Self {
        self.table_id = Some(table_id);
        self
    }

    pub fn status(mut self, status: FlowStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_match_details_tagging() {
        let details = FlowMatchDetails::TrafficSteer {
            in_port: 1,
            out_port: 2,
            protocol: L4Protocol::Tcp,
            dst_port: 443,
        };
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["flow_type"], "traffic_steer");
        assert_eq!(value["protocol"], "tcp");

        let arp: FlowMatchDetails = serde_json::from_value(json!({"flow_type": "arp_flood"})).unwrap();
        assert_eq!(arp, FlowMatchDetails::ArpFlood);
    }

    #[test]
    fn test_optional_fields_default() {
        let details: FlowMatchDetails =
            serde_json::from_value(json!({"flow_type": "acl_ip_drop", "src_ip": "10.0.0.9"})).unwrap();
        assert_eq!(
            details,
            FlowMatchDetails::AclIpDrop {
                src_ip: Some("10.0.0.9".into()),
                dst_ip: None
            }
        );
    }

    #[test]
    fn test_unknown_flow_type_rejected() {
        let parsed = serde_json::from_value::<FlowMatchDetails>(json!({"flow_type": "qos_mark"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_default_priorities() {
        assert_eq!(FlowMatchDetails::ArpFlood.default_priority(), 1000);
        assert_eq!(FlowMatchDetails::DefaultGateway { out_port: 1 }.default_priority(), 100);
        assert_eq!(
            FlowMatchDetails::IcmpControl { action: IcmpAction::Drop, in_port: None, out_port: None }
                .default_priority(),
            1200
        );
    }

    #[test]
    fn test_reversed_only_for_base_connectivity() {
        let base = FlowMatchDetails::BaseConnectivity { in_port: 1, out_port: 2 };
        assert_eq!(
            base.reversed(),
            Some(FlowMatchDetails::BaseConnectivity { in_port: 2, out_port: 1 })
        );
        assert!(FlowMatchDetails::ArpFlood.reversed().is_none());
    }

    #[test]
    fn test_hard_delete_states() {
        assert!(!FlowStatus::Active.allows_hard_delete());
        assert!(!FlowStatus::Pending.allows_hard_delete());
        assert!(FlowStatus::Failed.allows_hard_delete());
        assert!(FlowStatus::Deleted.allows_hard_delete());
    }
}
