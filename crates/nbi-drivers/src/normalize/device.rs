//! NETCONF topology node normalizers

use serde_json::Value;

use super::schema::{NodeList, NodeStatus};
use super::{at, get, int, list, text};

const CONNECTION_STATUS: [&str; 2] = ["netconf-node-topology:connection-status", "connection-status"];

fn nodes(raw: &Value) -> Vec<&Value> {
    if let Some(topology) = get(raw, &["network-topology:topology", "topology"]) {
        return list(Some(topology))
            .into_iter()
            .flat_map(|t| list(t.get("node")))
            .collect();
    }
    list(get(raw, &["network-topology:node", "node"]))
}

fn node_entry(node: &Value) -> NodeStatus {
    // newer controllers nest the netconf leaves under a container
    let netconf = get(node, &["netconf-node-topology:netconf-node"]).unwrap_or(node);
    let capabilities = list(at(netconf, &[
        "netconf-node-topology:available-capabilities",
        "available-capability",
    ]))
    .into_iter()
    .chain(list(at(netconf, &["available-capabilities", "available-capability"])))
    .filter_map(|c| match c {
        Value::String(s) => Some(s.clone()),
        other => text(other, &["capability"]),
    })
    .collect();

    NodeStatus {
        node_id: text(node, &["node-id"]).unwrap_or_default(),
        connection_status: text(netconf, &CONNECTION_STATUS).unwrap_or_else(|| "unknown".to_string()),
        host: text(netconf, &["netconf-node-topology:host", "host"]),
        port: int(netconf, &["netconf-node-topology:port", "port"]),
        available_capabilities: capabilities,
    }
}

/// First node of a `device.status` response
pub fn node_status(raw: &Value) -> NodeStatus {
    nodes(raw)
        .first()
        .map(|n| node_entry(n))
        .unwrap_or_else(|| NodeStatus {
            node_id: String::new(),
            connection_status: "not-mounted".to_string(),
            host: None,
            port: None,
            available_capabilities: Vec::new(),
        })
}

pub fn node_list(raw: &Value) -> NodeList {
    let devices: Vec<NodeStatus> = nodes(raw).into_iter().map(node_entry).collect();
    NodeList {
        total: devices.len(),
        devices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_status() {
        let raw = json!({"network-topology:node": [{
            "node-id": "r1",
            "netconf-node-topology:connection-status": "connected",
            "netconf-node-topology:host": "10.0.0.1",
            "netconf-node-topology:port": 830,
            "netconf-node-topology:available-capabilities": {"available-capability": [
                {"capability": "urn:ietf:params:netconf:base:1.1"},
                {"capability": "(http://cisco.com/ns/yang/Cisco-IOS-XE-native?revision=2021-03-01)Cisco-IOS-XE-native"}
            ]}
        }]});
        let status = node_status(&raw);
        assert_eq!(status.node_id, "r1");
        assert_eq!(status.connection_status, "connected");
        assert_eq!(status.port, Some(830));
        assert_eq!(status.available_capabilities.len(), 2);
    }

    #[test]
    fn test_node_list_from_topology() {
        let raw = json!({"network-topology:topology": [{
            "topology-id": "topology-netconf",
            "node": [
                {"node-id": "r1", "netconf-node-topology:connection-status": "connected"},
                {"node-id": "r2", "netconf-node-topology:connection-status": "connecting"}
            ]
        }]});
        let out = node_list(&raw);
        assert_eq!(out.total, 2);
        assert_eq!(out.devices[1].connection_status, "connecting");
    }

    #[test]
    fn test_empty_is_not_mounted() {
        assert_eq!(node_status(&json!({})).connection_status, "not-mounted");
    }
}
