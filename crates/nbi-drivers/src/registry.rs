//! Intent Registry
//!
//! Static catalogue of every vendor-neutral operation: its dotted name,
//! category, parameter contract and whether it only reads state. The set is
//! fixed at compile time; there is no runtime registration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nbi_core::Error;

use crate::params::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Interface,
    Routing,
    System,
    Show,
    Vlan,
    /// Reserved. ACL behaviour is expressed through OpenFlow templates.
    Acl,
    Device,
    Dhcp,
    Flow,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Interface => "interface",
            IntentCategory::Routing => "routing",
            IntentCategory::System => "system",
            IntentCategory::Show => "show",
            IntentCategory::Vlan => "vlan",
            IntentCategory::Acl => "acl",
            IntentCategory::Device => "device",
            IntentCategory::Dhcp => "dhcp",
            IntentCategory::Flow => "flow",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! intents {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Every operation the engine understands
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Intent {
            $(#[serde(rename = $name)] $variant),+
        }

        impl Intent {
            pub const ALL: &'static [Intent] = &[$(Intent::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Intent::$variant => $name),+
                }
            }
        }

        impl FromStr for Intent {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Intent::$variant),)+
                    other => Err(Error::unsupported_intent(other)),
                }
            }
        }
    };
}

intents! {
    InterfaceSetIpv4 => "interface.set_ipv4",
    InterfaceRemoveIpv4 => "interface.remove_ipv4",
    InterfaceSetIpv6 => "interface.set_ipv6",
    InterfaceRemoveIpv6 => "interface.remove_ipv6",
    InterfaceEnable => "interface.enable",
    InterfaceDisable => "interface.disable",
    InterfaceSetDescription => "interface.set_description",
    InterfaceSetMtu => "interface.set_mtu",
    InterfaceCreateSubinterface => "interface.create_subinterface",

    ShowInterface => "show.interface",
    ShowInterfaces => "show.interfaces",
    ShowRunningConfig => "show.running_config",
    ShowVersion => "show.version",
    ShowIpRoute => "show.ip_route",
    ShowIpInterfaceBrief => "show.ip_interface_brief",
    ShowOspfNeighbors => "show.ospf.neighbors",
    ShowOspfDatabase => "show.ospf.database",
    ShowVlans => "show.vlans",
    ShowDhcpPools => "show.dhcp_pools",
    ShowFlows => "show.flows",

    RoutingStaticAdd => "routing.static.add",
    RoutingStaticDelete => "routing.static.delete",
    RoutingDefaultAdd => "routing.default.add",
    RoutingDefaultDelete => "routing.default.delete",
    RoutingOspfEnable => "routing.ospf.enable",
    RoutingOspfDisable => "routing.ospf.disable",
    RoutingOspfAddNetwork => "routing.ospf.add_network",
    RoutingOspfRemoveNetwork => "routing.ospf.remove_network",
    RoutingOspfAddNetworkInterface => "routing.ospf.add_network_interface",
    RoutingOspfRemoveNetworkInterface => "routing.ospf.remove_network_interface",
    RoutingOspfSetRouterId => "routing.ospf.set_router_id",
    RoutingOspfSetPassiveInterface => "routing.ospf.set_passive_interface",
    RoutingOspfRemovePassiveInterface => "routing.ospf.remove_passive_interface",

    SystemSetHostname => "system.set_hostname",
    SystemSetBanner => "system.set_banner",
    SystemSetNtp => "system.set_ntp",
    SystemSetDns => "system.set_dns",
    SystemSaveConfig => "system.save_config",

    VlanCreate => "vlan.create",
    VlanDelete => "vlan.delete",
    VlanUpdate => "vlan.update",
    VlanAssignPort => "vlan.assign_port",

    DeviceStatus => "device.status",
    DeviceList => "device.list",

    DhcpCreatePool => "dhcp.create_pool",
    DhcpDeletePool => "dhcp.delete_pool",
    DhcpUpdatePool => "dhcp.update_pool",

    FlowAdd => "flow.add",
    FlowDelete => "flow.delete",
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Intent {
    pub fn category(&self) -> IntentCategory {
        self.definition().category
    }

    pub fn definition(&self) -> &'static IntentDefinition {
        // Every variant has exactly one row in DEFINITIONS; checked by tests.
        DEFINITIONS
            .iter()
            .find(|d| d.intent == *self)
            .unwrap_or(&DEFINITIONS[0])
    }

    /// Dotted prefixes from longest to shortest:
    /// `routing.ospf.enable` yields `routing.ospf.enable`, `routing.ospf`, `routing`.
    pub fn prefixes(&self) -> Vec<&'static str> {
        let name = self.as_str();
        let mut out = vec![name];
        let mut end = name.len();
        while let Some(idx) = name[..end].rfind('.') {
            out.push(&name[..idx]);
            end = idx;
        }
        out
    }
}

/// Parameter contract and metadata for one intent
#[derive(Debug, Clone, Serialize)]
pub struct IntentDefinition {
    #[serde(rename = "name")]
    pub intent: Intent,
    pub category: IntentCategory,
    pub description: &'static str,
    pub required_params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
    pub is_read_only: bool,
    pub needs_normalization: bool,
}

impl IntentDefinition {
    pub fn name(&self) -> &'static str {
        self.intent.as_str()
    }
}

const fn write(
    intent: Intent,
    category: IntentCategory,
    description: &'static str,
    required_params: &'static [&'static str],
    optional_params: &'static [&'static str],
) -> IntentDefinition {
    IntentDefinition {
        intent,
        category,
        description,
        required_params,
        optional_params,
        is_read_only: false,
        needs_normalization: true,
    }
}

const fn read(
    intent: Intent,
    category: IntentCategory,
    description: &'static str,
    required_params: &'static [&'static str],
    optional_params: &'static [&'static str],
) -> IntentDefinition {
    IntentDefinition {
        intent,
        category,
        description,
        required_params,
        optional_params,
        is_read_only: true,
        needs_normalization: true,
    }
}

use IntentCategory as C;

static DEFINITIONS: &[IntentDefinition] = &[
    // ===== INTERFACE =====
    write(Intent::InterfaceSetIpv4, C::Interface, "Set IPv4 address on interface",
        &["interface", "ip"], &["prefix", "mask", "description"]),
    write(Intent::InterfaceRemoveIpv4, C::Interface, "Remove IPv4 address from interface",
        &["interface"], &["ip"]),
    write(Intent::InterfaceSetIpv6, C::Interface, "Set IPv6 address on interface",
        &["interface", "ip"], &["prefix", "mask", "description"]),
    write(Intent::InterfaceRemoveIpv6, C::Interface, "Remove IPv6 address from interface",
        &["interface"], &["ip"]),
    write(Intent::InterfaceEnable, C::Interface, "Enable (no shutdown) an interface",
        &["interface"], &[]),
    write(Intent::InterfaceDisable, C::Interface, "Disable (shutdown) an interface",
        &["interface"], &[]),
    write(Intent::InterfaceSetDescription, C::Interface, "Set description on interface",
        &["interface", "description"], &[]),
    write(Intent::InterfaceSetMtu, C::Interface, "Set MTU size on interface",
        &["interface", "mtu"], &[]),
    write(Intent::InterfaceCreateSubinterface, C::Interface, "Create sub-interface with Dot1Q encapsulation",
        &["interface", "vlan_id"], &["ip", "prefix", "description"]),

    // ===== SHOW =====
    read(Intent::ShowInterface, C::Show, "Show single interface status", &["interface"], &[]),
    read(Intent::ShowInterfaces, C::Show, "Show all interfaces", &[], &[]),
    read(Intent::ShowRunningConfig, C::Show, "Show running configuration", &[], &["section"]),
    read(Intent::ShowVersion, C::Show, "Show device version/system info", &[], &[]),
    read(Intent::ShowIpRoute, C::Show, "Show IP routing table", &[], &["vrf"]),
    read(Intent::ShowIpInterfaceBrief, C::Show, "Show IP interface brief (summary)", &[], &[]),
    read(Intent::ShowOspfNeighbors, C::Show, "Show OSPF neighbor adjacencies", &[], &["process_id"]),
    read(Intent::ShowOspfDatabase, C::Show, "Show OSPF link-state database", &[], &["process_id", "area"]),
    read(Intent::ShowVlans, C::Show, "Show VLANs", &[], &[]),
    read(Intent::ShowDhcpPools, C::Show, "Show DHCP pools", &[], &[]),
    read(Intent::ShowFlows, C::Show, "Show OpenFlow rules", &[], &["table_id"]),

    // ===== ROUTING =====
    write(Intent::RoutingStaticAdd, C::Routing, "Add static route",
        &["prefix", "next_hop"], &["metric", "vrf", "description", "mask"]),
    write(Intent::RoutingStaticDelete, C::Routing, "Delete static route",
        &["prefix"], &["vrf", "mask", "next_hop"]),
    write(Intent::RoutingDefaultAdd, C::Routing, "Add default route (0.0.0.0/0)",
        &["next_hop"], &["metric", "vrf"]),
    write(Intent::RoutingDefaultDelete, C::Routing, "Delete default route", &[], &["vrf", "next_hop"]),
    write(Intent::RoutingOspfEnable, C::Routing, "Enable OSPF process", &["process_id"], &["router_id"]),
    write(Intent::RoutingOspfDisable, C::Routing, "Disable/Remove OSPF process", &["process_id"], &[]),
    write(Intent::RoutingOspfAddNetwork, C::Routing, "Add OSPF network (network <ip> <wildcard> area <area>)",
        &["process_id", "area", "network", "wildcard_mask"], &[]),
    write(Intent::RoutingOspfRemoveNetwork, C::Routing, "Remove OSPF network statement",
        &["process_id", "area", "network", "wildcard_mask"], &[]),
    write(Intent::RoutingOspfAddNetworkInterface, C::Routing, "Add OSPF to interface (ip ospf process-id area area-id)",
        &["process_id", "interface", "area"], &[]),
    write(Intent::RoutingOspfRemoveNetworkInterface, C::Routing, "Remove OSPF from interface",
        &["process_id", "interface"], &["area"]),
    write(Intent::RoutingOspfSetRouterId, C::Routing, "Set OSPF router ID",
        &["process_id", "router_id"], &[]),
    write(Intent::RoutingOspfSetPassiveInterface, C::Routing, "Set interface as passive (no OSPF hello)",
        &["process_id", "interface"], &[]),
    write(Intent::RoutingOspfRemovePassiveInterface, C::Routing, "Remove passive interface setting",
        &["process_id", "interface"], &[]),

    // ===== SYSTEM =====
    write(Intent::SystemSetHostname, C::System, "Set device hostname", &["hostname"], &[]),
    write(Intent::SystemSetBanner, C::System, "Set login banner", &["banner"], &["banner_type"]),
    write(Intent::SystemSetNtp, C::System, "Configure NTP server", &["server"], &["prefer"]),
    write(Intent::SystemSetDns, C::System, "Configure DNS server", &["server"], &["domain"]),
    write(Intent::SystemSaveConfig, C::System, "Save running config to startup", &[], &[]),

    // ===== VLAN =====
    write(Intent::VlanCreate, C::Vlan, "Create VLAN", &["vlan_id"], &["name", "description"]),
    write(Intent::VlanDelete, C::Vlan, "Delete VLAN", &["vlan_id"], &[]),
    write(Intent::VlanUpdate, C::Vlan, "Update VLAN name/description", &["vlan_id"], &["name", "description"]),
    write(Intent::VlanAssignPort, C::Vlan, "Assign interface to VLAN (access or trunk)",
        &["interface", "vlan_id"], &["mode"]),

    // ===== DEVICE =====
    read(Intent::DeviceStatus, C::Device, "Get NETCONF device connection status", &[], &[]),
    read(Intent::DeviceList, C::Device, "List all mounted NETCONF devices", &[], &[]),

    // ===== DHCP =====
    write(Intent::DhcpCreatePool, C::Dhcp, "Create DHCP pool",
        &["pool_name", "gateway", "mask", "start_ip", "end_ip"], &["dns_servers", "lease_days"]),
    write(Intent::DhcpDeletePool, C::Dhcp, "Delete DHCP pool", &["pool_name"], &[]),
    write(Intent::DhcpUpdatePool, C::Dhcp, "Update DHCP pool",
        &["pool_name"], &["gateway", "mask", "start_ip", "end_ip", "dns_servers"]),

    // ===== FLOW =====
    write(Intent::FlowAdd, C::Flow, "Add an OpenFlow rule",
        &["table_id", "flow_id", "priority", "match", "instructions"], &[]),
    write(Intent::FlowDelete, C::Flow, "Delete an OpenFlow rule", &["table_id", "flow_id"], &[]),
];

/// Lookup facade over the static catalogue
pub struct IntentRegistry;

impl IntentRegistry {
    pub fn get(name: &str) -> Option<&'static IntentDefinition> {
        DEFINITIONS.iter().find(|d| d.intent.as_str() == name)
    }

    pub fn exists(name: &str) -> bool {
        Self::get(name).is_some()
    }

    pub fn all() -> &'static [IntentDefinition] {
        DEFINITIONS
    }

    pub fn by_category(category: IntentCategory) -> Vec<&'static IntentDefinition> {
        DEFINITIONS.iter().filter(|d| d.category == category).collect()
    }

    /// Names of required params that are absent or null. An unknown intent
    /// yields a single `Unknown intent: ...` entry.
    pub fn validate_params(name: &str, params: &Params) -> Vec<String> {
        let Some(def) = Self::get(name) else {
            return vec![format!("Unknown intent: {}", name)];
        };

        def.required_params
            .iter()
            .filter(|key| matches!(params.get(**key), None | Some(Value::Null)))
            .map(|key| key.to_string())
            .collect()
    }

    /// Intent names grouped by category
    pub fn supported_intents() -> BTreeMap<&'static str, Vec<&'static str>> {
        let mut out: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
        for def in DEFINITIONS {
            out.entry(def.category.as_str()).or_default().push(def.name());
        }
        out
    }
}
