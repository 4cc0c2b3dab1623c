//! Unified response schemas shared by every vendor

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nbi_core::Vendor;

// ============================================================================
// Interfaces
// ============================================================================

/// One interface as reported by `show.interface`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceStatus {
    pub name: String,
    /// `up` | `down`
    pub admin: Option<String>,
    pub oper: Option<String>,
    /// CIDR notation, `10.0.0.1/24`
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub mac_address: Option<String>,
    pub mtu: Option<u64>,
    pub speed: Option<String>,
    pub description: Option<String>,
    pub in_octets: Option<u64>,
    pub out_octets: Option<u64>,
    pub in_errors: Option<u64>,
    pub out_errors: Option<u64>,
    pub vendor: Vendor,
}

impl InterfaceStatus {
    pub fn new(name: impl Into<String>, vendor: Vendor) -> Self {
        Self {
            name: name.into(),
            admin: None,
            oper: None,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            mac_address: None,
            mtu: None,
            speed: None,
            description: None,
            in_octets: None,
            out_octets: None,
            in_errors: None,
            out_errors: None,
            vendor,
        }
    }

    /// Operational state when known, otherwise admin state
    pub fn effective_state(&self) -> Option<&str> {
        self.oper.as_deref().or(self.admin.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceList {
    pub interfaces: Vec<InterfaceStatus>,
    pub total_count: usize,
    pub up_count: usize,
    pub down_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceBriefEntry {
    pub interface: String,
    pub ip_address: Option<String>,
    /// `up` | `down` | `admin-down`
    pub status: String,
    /// Line protocol, `unknown` when the source only carries config
    pub protocol: String,
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceBrief {
    pub device_id: String,
    pub vendor: Vendor,
    pub timestamp: String,
    pub interface_count: usize,
    pub interfaces: Vec<InterfaceBriefEntry>,
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub prefix: String,
    pub next_hop: Option<String>,
    pub interface: Option<String>,
    /// `static` | `connected` | `ospf` | `bgp` | `local` | other
    pub protocol: String,
    pub metric: Option<u64>,
    /// Administrative distance
    pub preference: Option<u64>,
    pub vrf: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub device_id: String,
    pub vendor: Vendor,
    pub timestamp: String,
    pub route_count: usize,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OspfNeighbor {
    pub neighbor_id: String,
    pub neighbor_address: Option<String>,
    /// `FULL`, `2WAY`, `INIT`, ...
    pub state: String,
    pub interface: Option<String>,
    pub area: Option<String>,
    pub priority: Option<u64>,
    pub dr: Option<String>,
    pub bdr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OspfNeighbors {
    pub device_id: String,
    pub vendor: Vendor,
    pub timestamp: String,
    pub neighbor_count: usize,
    pub neighbors: Vec<OspfNeighbor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OspfLsa {
    pub lsa_type: String,
    pub link_state_id: String,
    pub advertising_router: String,
    pub sequence_number: Option<String>,
    pub age: Option<u64>,
    pub area: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OspfDatabase {
    pub device_id: String,
    pub vendor: Vendor,
    pub timestamp: String,
    pub lsa_count: usize,
    pub lsas: Vec<OspfLsa>,
}

// ============================================================================
// System
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub vendor: Vendor,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub software_version: Option<String>,
    pub uptime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningConfig {
    pub vendor: Vendor,
    /// Pretty-printed JSON of the configuration subtree
    pub config_text: String,
}

// ============================================================================
// VLAN / DHCP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vlan {
    pub vlan_id: u32,
    pub name: Option<String>,
    /// `active` | `suspended`
    pub status: String,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VlanList {
    pub vlans: Vec<Vlan>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpPool {
    pub pool_name: String,
    pub gateway: Option<String>,
    pub subnet_mask: Option<String>,
    pub start_ip: Option<String>,
    pub end_ip: Option<String>,
    pub dns_servers: Vec<String>,
    pub lease_days: Option<u64>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpPoolList {
    pub pools: Vec<DhcpPool>,
    pub total_count: usize,
}

// ============================================================================
// Device / OpenFlow
// ============================================================================

/// NETCONF topology node as seen by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub connection_status: String,
    pub host: Option<String>,
    pub port: Option<u64>,
    pub available_capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeList {
    pub devices: Vec<NodeStatus>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub flow_id: String,
    pub table_id: u32,
    pub priority: Option<u64>,
    #[serde(rename = "match")]
    pub flow_match: Value,
    pub instructions: Value,
    pub packet_count: Option<u64>,
    pub byte_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTable {
    pub device_id: String,
    pub timestamp: String,
    pub flow_count: usize,
    pub flows: Vec<FlowEntry>,
}
