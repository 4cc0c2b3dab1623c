//! OpenFlow inventory flow normalizer

use serde_json::Value;

use super::schema::{FlowEntry, FlowTable};
use super::{get, int, list, text, NormalizeContext};

const TABLE: [&str; 2] = ["flow-node-inventory:table", "table"];
const STATS: [&str; 2] = ["opendaylight-flow-statistics:flow-statistics", "flow-statistics"];

pub fn flow_table(ctx: &NormalizeContext, raw: &Value) -> FlowTable {
    let flows = flow_entries(raw);
    FlowTable {
        device_id: ctx.device_id.clone(),
        timestamp: ctx.stamp(),
        flow_count: flows.len(),
        flows,
    }
}

/// Every flow in an inventory node or table response
pub fn flow_entries(raw: &Value) -> Vec<FlowEntry> {
    let tables: Vec<&Value> = match get(raw, &TABLE) {
        Some(tables) => list(Some(tables)),
        None => list(get(raw, &["opendaylight-inventory:node", "node"]))
            .into_iter()
            .flat_map(|node| list(get(node, &TABLE)))
            .collect(),
    };

    let mut out = Vec::new();
    for table in tables {
        let table_id = int(table, &["id"]).unwrap_or(0) as u32;
        for flow in list(table.get("flow")) {
            let Some(flow_id) = text(flow, &["id"]) else {
                continue;
            };
            let stats = get(flow, &STATS);
            out.push(FlowEntry {
                flow_id,
                table_id: int(flow, &["table_id"]).map(|t| t as u32).unwrap_or(table_id),
                priority: int(flow, &["priority"]),
                flow_match: flow.get("match").cloned().unwrap_or(Value::Null),
                instructions: flow.get("instructions").cloned().unwrap_or(Value::Null),
                packet_count: stats.and_then(|s| int(s, &["packet-count"])),
                byte_count: stats.and_then(|s| int(s, &["byte-count"])),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nbi_core::Vendor;
    use serde_json::json;

    #[test]
    fn test_node_response() {
        let raw = json!({"opendaylight-inventory:node": [{
            "id": "openflow:1",
            "flow-node-inventory:table": [
                {"id": 0, "flow": [{
                    "id": "arp-flood", "priority": 1000,
                    "match": {"ethernet-match": {"ethernet-type": {"type": 2054}}},
                    "instructions": {"instruction": []},
                    "opendaylight-flow-statistics:flow-statistics": {"packet-count": "12", "byte-count": "720"}
                }]},
                {"id": 1}
            ]
        }]});
        let table = flow_table(&NormalizeContext::new("openflow:1", Vendor::OpenFlow, Utc::now()), &raw);
        assert_eq!(table.flow_count, 1);
        let flow = &table.flows[0];
        assert_eq!(flow.flow_id, "arp-flood");
        assert_eq!(flow.priority, Some(1000));
        assert_eq!(flow.packet_count, Some(12));
    }

    #[test]
    fn test_table_response_keeps_table_id() {
        let raw = json!({"flow-node-inventory:table": [{"id": 3, "flow": {"id": "f1"}}]});
        let flows = flow_entries(&raw);
        assert_eq!(flows[0].table_id, 3);
        assert!(flows[0].flow_match.is_null());
    }
}
