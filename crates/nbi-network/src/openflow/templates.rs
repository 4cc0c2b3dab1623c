//! Flow templates and their OpenFlow 1.3 encoding
//!
//! A [`FlowTemplate`] is what an operator asks for, naming switch interfaces.
//! Once the engine has resolved those names to port numbers it becomes a
//! [`FlowMatchDetails`], which is what gets persisted and what
//! [`build_flow`] turns into the inventory `match` and `instructions`.

use ipnetwork::Ipv4Network;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::net::Ipv4Addr;

use nbi_core::{Error, Result};
use nbi_drivers::drivers::openflow::flow_payload;
use nbi_store::{FlowMatchDetails, FlowRule, IcmpAction, L4Protocol};

lazy_static! {
    static ref MAC_ADDRESS: Regex =
        Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("mac address regex");
}

const ETH_TYPE_IPV4: u16 = 0x0800;
const ETH_TYPE_ARP: u16 = 0x0806;
const IP_PROTO_ICMP: u8 = 1;

/// Reserved output ports
const PORT_FLOOD: &str = "FLOOD";
const PORT_NORMAL: &str = "NORMAL";

/// Operator-facing rule request, interfaces by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum FlowTemplate {
    ArpFlood,
    BaseConnectivity {
        in_interface: String,
        out_interface: String,
        /// Also install the reverse direction as a paired rule
        #[serde(default)]
        bidirectional: bool,
    },
    TrafficSteer {
        in_interface: String,
        out_interface: String,
        protocol: L4Protocol,
        dst_port: u16,
    },
    MacSteer {
        in_interface: String,
        out_interface: String,
        #[serde(default)]
        src_mac: Option<String>,
        #[serde(default)]
        dst_mac: Option<String>,
    },
    IpSteer {
        in_interface: String,
        out_interface: String,
        #[serde(default)]
        src_ip: Option<String>,
        #[serde(default)]
        dst_ip: Option<String>,
    },
    SubnetSteer {
        in_interface: String,
        out_interface: String,
        subnet: String,
    },
    DefaultGateway {
        out_interface: String,
    },
    AclMacDrop {
        src_mac: String,
        #[serde(default)]
        in_interface: Option<String>,
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
        in_interface: Option<String>,
    },
    Whitelist {
        src_ip: String,
        #[serde(default)]
        dst_ip: Option<String>,
        #[serde(default)]
        out_interface: Option<String>,
    },
    IcmpControl {
        action: IcmpAction,
        #[serde(default)]
        in_interface: Option<String>,
        #[serde(default)]
        out_interface: Option<String>,
    },
}

/// One add request: a template plus where to install it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRequest {
    pub flow_id: String,
    #[serde(default)]
    pub table_id: Option<u32>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(flatten)]
    pub template: FlowTemplate,
}

impl FlowTemplate {
    /// Interface names that must be resolved to switch ports
    pub fn interface_names(&self) -> Vec<&str> {
        let names: [Option<&String>; 2] = match self {
            FlowTemplate::ArpFlood | FlowTemplate::AclIpDrop { .. } => [None, None],
            FlowTemplate::BaseConnectivity { in_interface, out_interface, .. }
            | FlowTemplate::TrafficSteer { in_interface, out_interface, .. }
            | FlowTemplate::MacSteer { in_interface, out_interface, .. }
            | FlowTemplate::IpSteer { in_interface, out_interface, .. }
            | FlowTemplate::SubnetSteer { in_interface, out_interface, .. } => {
                [Some(in_interface), Some(out_interface)]
            }
            FlowTemplate::DefaultGateway { out_interface } => [Some(out_interface), None],
            FlowTemplate::AclMacDrop { in_interface, .. } | FlowTemplate::AclPortDrop { in_interface, .. } => {
                [in_interface.as_ref(), None]
            }
            FlowTemplate::Whitelist { out_interface, .. } => [out_interface.as_ref(), None],
            FlowTemplate::IcmpControl { in_interface, out_interface, .. } => {
                [in_interface.as_ref(), out_interface.as_ref()]
            }
        };
        names.into_iter().flatten().map(String::as_str).collect()
    }

    pub fn is_bidirectional(&self) -> bool {
        matches!(self, FlowTemplate::BaseConnectivity { bidirectional: true, .. })
    }

    /// Swap interface names for resolved port numbers
    pub fn resolve(&self, ports: &HashMap<String, u32>) -> Result<FlowMatchDetails> {
        let port = |name: &str| -> Result<u32> {
            ports
                .get(name)
                .copied()
                .ok_or_else(|| Error::invalid_params(format!("interface '{}' is not resolved", name)))
        };
        let opt_port = |name: &Option<String>| -> Result<Option<u32>> { name.as_deref().map(port).transpose() };

        let details = match self {
            FlowTemplate::ArpFlood => FlowMatchDetails::ArpFlood,
            FlowTemplate::BaseConnectivity { in_interface, out_interface, .. } => {
                FlowMatchDetails::BaseConnectivity {
                    in_port: port(in_interface)?,
                    out_port: port(out_interface)?,
                }
            }
            FlowTemplate::TrafficSteer { in_interface, out_interface, protocol, dst_port } => {
                FlowMatchDetails::TrafficSteer {
                    in_port: port(in_interface)?,
                    out_port: port(out_interface)?,
                    protocol: *protocol,
                    dst_port: *dst_port,
                }
            }
            FlowTemplate::MacSteer { in_interface, out_interface, src_mac, dst_mac } => FlowMatchDetails::MacSteer {
                in_port: port(in_interface)?,
                out_port: port(out_interface)?,
                src_mac: src_mac.clone(),
                dst_mac: dst_mac.clone(),
            },
            FlowTemplate::IpSteer { in_interface, out_interface, src_ip, dst_ip } => FlowMatchDetails::IpSteer {
                in_port: port(in_interface)?,
                out_port: port(out_interface)?,
                src_ip: src_ip.clone(),
                dst_ip: dst_ip.clone(),
            },
            FlowTemplate::SubnetSteer { in_interface, out_interface, subnet } => FlowMatchDetails::SubnetSteer {
                in_port: port(in_interface)?,
                out_port: port(out_interface)?,
                subnet: subnet.clone(),
            },
            FlowTemplate::DefaultGateway { out_interface } => FlowMatchDetails::DefaultGateway {
                out_port: port(out_interface)?,
            },
            FlowTemplate::AclMacDrop { src_mac, in_interface } => FlowMatchDetails::AclMacDrop {
                src_mac: src_mac.clone(),
                in_port: opt_port(in_interface)?,
            },
            FlowTemplate::AclIpDrop { src_ip, dst_ip } => FlowMatchDetails::AclIpDrop {
                src_ip: src_ip.clone(),
                dst_ip: dst_ip.clone(),
            },
            FlowTemplate::AclPortDrop { protocol, dst_port, in_interface } => FlowMatchDetails::AclPortDrop {
                protocol: *protocol,
                dst_port: *dst_port,
                in_port: opt_port(in_interface)?,
            },
            FlowTemplate::Whitelist { src_ip, dst_ip, out_interface } => FlowMatchDetails::Whitelist {
                src_ip: src_ip.clone(),
                dst_ip: dst_ip.clone(),
                out_port: opt_port(out_interface)?,
            },
            FlowTemplate::IcmpControl { action, in_interface, out_interface } => FlowMatchDetails::IcmpControl {
                action: *action,
                in_port: opt_port(in_interface)?,
                out_port: opt_port(out_interface)?,
            },
        };
        Ok(details)
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Builder for the inventory `match` container
#[derive(Default)]
struct Match {
    fields: Map<String, Value>,
    ethernet: Map<String, Value>,
}

impl Match {
    fn in_port(mut self, port: Option<u32>) -> Self {
        if let Some(port) = port {
            self.fields.insert("in-port".into(), json!(port.to_string()));
        }
        self
    }

    fn eth_type(mut self, eth_type: u16) -> Self {
        self.ethernet
            .insert("ethernet-type".into(), json!({"type": eth_type}));
        self
    }

    fn eth_source(mut self, mac: Option<&str>) -> Self {
        if let Some(mac) = mac {
            self.ethernet
                .insert("ethernet-source".into(), json!({"address": mac.to_lowercase()}));
        }
        self
    }

    fn eth_destination(mut self, mac: Option<&str>) -> Self {
        if let Some(mac) = mac {
            self.ethernet
                .insert("ethernet-destination".into(), json!({"address": mac.to_lowercase()}));
        }
        self
    }

    fn ipv4_source(mut self, net: Option<Ipv4Network>) -> Self {
        if let Some(net) = net {
            self.fields.insert("ipv4-source".into(), json!(cidr(net)));
        }
        self
    }

    fn ipv4_destination(mut self, net: Option<Ipv4Network>) -> Self {
        if let Some(net) = net {
            self.fields.insert("ipv4-destination".into(), json!(cidr(net)));
        }
        self
    }

    fn ip_proto(mut self, proto: u8) -> Self {
        self.fields.insert("ip-match".into(), json!({"ip-protocol": proto}));
        self
    }

    fn l4_destination(self, protocol: L4Protocol, port: u16) -> Self {
        let mut out = self.ip_proto(protocol.ip_proto());
        let key = match protocol {
            L4Protocol::Tcp => "tcp-destination-port",
            L4Protocol::Udp => "udp-destination-port",
        };
        out.fields.insert(key.into(), json!(port));
        out
    }

    fn build(mut self) -> Value {
        if !self.ethernet.is_empty() {
            self.fields
                .insert("ethernet-match".into(), Value::Object(self.ethernet));
        }
        Value::Object(self.fields)
    }
}

enum Action {
    Output(String),
    Drop,
}

impl Action {
    fn port(port: u32) -> Self {
        Action::Output(port.to_string())
    }

    fn port_or_normal(port: Option<u32>) -> Self {
        port.map(Action::port)
            .unwrap_or_else(|| Action::Output(PORT_NORMAL.to_string()))
    }

    fn instructions(self) -> Value {
        let action = match self {
            Action::Output(port) => json!({
                "order": 0,
                "output-action": {"output-node-connector": port, "max-length": 65535}
            }),
            Action::Drop => json!({"order": 0, "drop-action": {}}),
        };
        json!({
            "instruction": [{
                "order": 0,
                "apply-actions": {"action": [action]}
            }]
        })
    }
}

fn cidr(net: Ipv4Network) -> String {
    format!("{}/{}", net.network(), net.prefix())
}

fn mac(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if MAC_ADDRESS.is_match(value) {
        Ok(value.to_string())
    } else {
        Err(Error::invalid_params(format!("{} '{}' is not a MAC address", field, value)))
    }
}

fn opt_mac(field: &str, value: &Option<String>) -> Result<Option<String>> {
    value.as_deref().map(|v| mac(field, v)).transpose()
}

/// Host address or CIDR prefix; a bare address matches exactly
fn ipv4(field: &str, value: &str) -> Result<Ipv4Network> {
    let value = value.trim();
    if let Ok(addr) = value.parse::<Ipv4Addr>() {
        return Ipv4Network::new(addr, 32)
            .map_err(|e| Error::invalid_params(format!("{} '{}': {}", field, value, e)));
    }
    value
        .parse::<Ipv4Network>()
        .map_err(|_| Error::invalid_params(format!("{} '{}' is not an IPv4 address or prefix", field, value)))
}

fn opt_ipv4(field: &str, value: &Option<String>) -> Result<Option<Ipv4Network>> {
    value.as_deref().map(|v| ipv4(field, v)).transpose()
}

fn require_any<T>(template: &str, a: &Option<T>, b: &Option<T>, fields: &str) -> Result<()> {
    if a.is_none() && b.is_none() {
        return Err(Error::invalid_params(format!("{} needs at least one of {}", template, fields)));
    }
    Ok(())
}

/// `(match, instructions)` for a resolved template. Rejects malformed
/// addresses before anything is persisted or sent.
pub fn build_flow(details: &FlowMatchDetails) -> Result<(Value, Value)> {
    let (flow_match, action) = match details {
        FlowMatchDetails::ArpFlood => (
            Match::default().eth_type(ETH_TYPE_ARP),
            Action::Output(PORT_FLOOD.to_string()),
        ),
        FlowMatchDetails::BaseConnectivity { in_port, out_port } => {
            (Match::default().in_port(Some(*in_port)), Action::port(*out_port))
        }
        FlowMatchDetails::TrafficSteer { in_port, out_port, protocol, dst_port } => (
            Match::default()
                .in_port(Some(*in_port))
                .eth_type(ETH_TYPE_IPV4)
                .l4_destination(*protocol, *dst_port),
            Action::port(*out_port),
        ),
        FlowMatchDetails::MacSteer { in_port, out_port, src_mac, dst_mac } => {
            require_any("mac_steer", src_mac, dst_mac, "src_mac, dst_mac")?;
            let src = opt_mac("src_mac", src_mac)?;
            let dst = opt_mac("dst_mac", dst_mac)?;
            (
                Match::default()
                    .in_port(Some(*in_port))
                    .eth_source(src.as_deref())
                    .eth_destination(dst.as_deref()),
                Action::port(*out_port),
            )
        }
        FlowMatchDetails::IpSteer { in_port, out_port, src_ip, dst_ip } => {
            require_any("ip_steer", src_ip, dst_ip, "src_ip, dst_ip")?;
            (
                Match::default()
                    .in_port(Some(*in_port))
                    .eth_type(ETH_TYPE_IPV4)
                    .ipv4_source(opt_ipv4("src_ip", src_ip)?)
                    .ipv4_destination(opt_ipv4("dst_ip", dst_ip)?),
                Action::port(*out_port),
            )
        }
        FlowMatchDetails::SubnetSteer { in_port, out_port, subnet } => (
            Match::default()
                .in_port(Some(*in_port))
                .eth_type(ETH_TYPE_IPV4)
                .ipv4_destination(Some(ipv4("subnet", subnet)?)),
            Action::port(*out_port),
        ),
        FlowMatchDetails::DefaultGateway { out_port } => (Match::default(), Action::port(*out_port)),
        FlowMatchDetails::AclMacDrop { src_mac, in_port } => {
            let src = mac("src_mac", src_mac)?;
            (
                Match::default().in_port(*in_port).eth_source(Some(&src)),
                Action::Drop,
            )
        }
        FlowMatchDetails::AclIpDrop { src_ip, dst_ip } => {
            require_any("acl_ip_drop", src_ip, dst_ip, "src_ip, dst_ip")?;
            (
                Match::default()
                    .eth_type(ETH_TYPE_IPV4)
                    .ipv4_source(opt_ipv4("src_ip", src_ip)?)
                    .ipv4_destination(opt_ipv4("dst_ip", dst_ip)?),
                Action::Drop,
            )
        }
        FlowMatchDetails::AclPortDrop { protocol, dst_port, in_port } => (
            Match::default()
                .in_port(*in_port)
                .eth_type(ETH_TYPE_IPV4)
                .l4_destination(*protocol, *dst_port),
            Action::Drop,
        ),
        FlowMatchDetails::Whitelist { src_ip, dst_ip, out_port } => (
            Match::default()
                .eth_type(ETH_TYPE_IPV4)
                .ipv4_source(Some(ipv4("src_ip", src_ip)?))
                .ipv4_destination(opt_ipv4("dst_ip", dst_ip)?),
            Action::port_or_normal(*out_port),
        ),
        FlowMatchDetails::IcmpControl { action, in_port, out_port } => (
            Match::default()
                .in_port(*in_port)
                .eth_type(ETH_TYPE_IPV4)
                .ip_proto(IP_PROTO_ICMP),
            match action {
                IcmpAction::Allow => Action::port_or_normal(*out_port),
                IcmpAction::Drop => Action::Drop,
            },
        ),
    };

    Ok((flow_match.build(), action.instructions()))
}

/// Full inventory body for a stored rule
pub fn flow_body(rule: &FlowRule) -> Result<Value> {
    let (flow_match, instructions) = build_flow(&rule.match_details)?;
    Ok(flow_payload(
        &rule.flow_id,
        rule.table_id,
        rule.priority,
        flow_match,
        instructions,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_port(instructions: &Value) -> Option<&str> {
        instructions["instruction"][0]["apply-actions"]["action"][0]["output-action"]["output-node-connector"].as_str()
    }

    #[test]
    fn test_request_from_json() {
        let request: FlowRequest = serde_json::from_value(json!({
            "flow_id": "web",
            "template": "base_connectivity",
            "in_interface": "eth1",
            "out_interface": "eth2",
            "bidirectional": true
        }))
        .unwrap();
        assert!(request.template.is_bidirectional());
        assert_eq!(request.template.interface_names(), vec!["eth1", "eth2"]);
        assert_eq!(request.table_id, None);
    }

    #[test]
    fn test_resolve_requires_every_port() {
        let template = FlowTemplate::DefaultGateway { out_interface: "uplink".into() };
        assert!(template.resolve(&HashMap::new()).is_err());

        let ports = HashMap::from([("uplink".to_string(), 4)]);
        assert_eq!(
            template.resolve(&ports).unwrap(),
            FlowMatchDetails::DefaultGateway { out_port: 4 }
        );
    }

    #[test]
    fn test_arp_flood() {
        let (m, i) = build_flow(&FlowMatchDetails::ArpFlood).unwrap();
        assert_eq!(m["ethernet-match"]["ethernet-type"]["type"], 2054);
        assert_eq!(output_port(&i), Some("FLOOD"));
    }

    #[test]
    fn test_traffic_steer_udp() {
        let (m, i) = build_flow(&FlowMatchDetails::TrafficSteer {
            in_port: 1,
            out_port: 3,
            protocol: L4Protocol::Udp,
            dst_port: 53,
        })
        .unwrap();
        assert_eq!(m["in-port"], "1");
        assert_eq!(m["ip-match"]["ip-protocol"], 17);
        assert_eq!(m["udp-destination-port"], 53);
        assert_eq!(output_port(&i), Some("3"));
    }

    #[test]
    fn test_acl_drops() {
        let (m, i) = build_flow(&FlowMatchDetails::AclIpDrop {
            src_ip: Some("10.0.0.9".into()),
            dst_ip: None,
        })
        .unwrap();
        assert_eq!(m["ipv4-source"], "10.0.0.9/32");
        assert!(m.get("ipv4-destination").is_none());
        assert!(i["instruction"][0]["apply-actions"]["action"][0].get("drop-action").is_some());

        let (m, _) = build_flow(&FlowMatchDetails::AclMacDrop {
            src_mac: "AA:BB:CC:DD:EE:FF".into(),
            in_port: None,
        })
        .unwrap();
        assert_eq!(m["ethernet-match"]["ethernet-source"]["address"], "aa:bb:cc:dd:ee:ff");
        assert!(m.get("in-port").is_none());
    }

    #[test]
    fn test_subnet_is_normalized() {
        let (m, _) = build_flow(&FlowMatchDetails::SubnetSteer {
            in_port: 1,
            out_port: 2,
            subnet: "192.168.10.7/24".into(),
        })
        .unwrap();
        assert_eq!(m["ipv4-destination"], "192.168.10.0/24");
    }

    #[test]
    fn test_whitelist_defaults_to_normal() {
        let (_, i) = build_flow(&FlowMatchDetails::Whitelist {
            src_ip: "10.1.1.1".into(),
            dst_ip: None,
            out_port: None,
        })
        .unwrap();
        assert_eq!(output_port(&i), Some("NORMAL"));
    }

    #[test]
    fn test_icmp_control() {
        let (m, i) = build_flow(&FlowMatchDetails::IcmpControl {
            action: IcmpAction::Drop,
            in_port: Some(2),
            out_port: None,
        })
        .unwrap();
        assert_eq!(m["ip-match"]["ip-protocol"], 1);
        assert!(i["instruction"][0]["apply-actions"]["action"][0].get("drop-action").is_some());
    }

    #[test]
    fn test_malformed_addresses_rejected() {
        let bad_mac = FlowMatchDetails::MacSteer {
            in_port: 1,
            out_port: 2,
            src_mac: Some("aa:bb:cc".into()),
            dst_mac: None,
        };
        assert!(matches!(build_flow(&bad_mac), Err(Error::InvalidParams(_))));

        let empty = FlowMatchDetails::IpSteer { in_port: 1, out_port: 2, src_ip: None, dst_ip: None };
        assert!(build_flow(&empty).is_err());

        let bad_subnet = FlowMatchDetails::SubnetSteer { in_port: 1, out_port: 2, subnet: "10.0.0.0/40".into() };
        assert!(build_flow(&bad_subnet).is_err());
    }
}
