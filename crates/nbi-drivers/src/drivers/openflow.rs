//! OpenFlow rules through the controller's `opendaylight-inventory` model
//!
//! Unlike the NETCONF drivers, paths are keyed by the switch datapath id
//! (`openflow:{dpid}`) and the inventory speaks plain `application/json`.

use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::encode_key;

pub(crate) const DRIVER_NAME: &str = "openflow";

pub const INVENTORY_NODES: &str = "/opendaylight-inventory:nodes";

const SUPPORTED: &[Intent] = &[Intent::FlowAdd, Intent::FlowDelete, Intent::ShowFlows];

const DEFAULT_PRIORITY: u32 = 10;

/// Inventory node id for a datapath: `1` and `openflow:1` both give `openflow:1`
pub fn openflow_node_id(datapath_id: &str) -> String {
    let dpid = datapath_id.trim();
    if dpid.starts_with("openflow:") {
        return dpid.to_string();
    }
    match dpid.parse::<u64>() {
        Ok(n) => format!("openflow:{}", n),
        Err(_) => format!("openflow:{}", dpid),
    }
}

pub fn inventory_node_path(datapath_id: &str) -> String {
    format!("{}/node={}", INVENTORY_NODES, openflow_node_id(datapath_id))
}

pub fn table_path(datapath_id: &str, table_id: u32) -> String {
    format!(
        "{}/flow-node-inventory:table={}",
        inventory_node_path(datapath_id),
        table_id
    )
}

pub fn flow_path(datapath_id: &str, table_id: u32, flow_id: &str) -> String {
    format!("{}/flow={}", table_path(datapath_id, table_id), encode_key(flow_id))
}

/// `{"flow-node-inventory:flow": [ ... ]}` body for one rule
pub fn flow_payload(flow_id: &str, table_id: u32, priority: u32, flow_match: Value, instructions: Value) -> Value {
    json!({
        "flow-node-inventory:flow": [{
            "id": flow_id,
            "table_id": table_id,
            "priority": priority,
            "match": flow_match,
            "instructions": instructions
        }]
    })
}

#[derive(Debug, Default)]
pub struct OpenFlowDriver;

impl Driver for OpenFlowDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn vendor(&self) -> Vendor {
        Vendor::OpenFlow
    }

    fn supported_intents(&self) -> &'static [Intent] {
        SUPPORTED
    }

    fn compile(&self, device: &DeviceProfile, intent: Intent, params: &Params) -> Result<RequestSpec> {
        let dpid = device
            .datapath_id
            .as_deref()
            .unwrap_or(device.node_id.as_str());
        if dpid.trim().is_empty() {
            return Err(Error::build(format!(
                "Device {} has no datapath id",
                device.node_id
            )));
        }
        let table_id = params.opt_u32("table_id")?.unwrap_or(0);

        let spec = match intent {
            Intent::FlowAdd => {
                let flow_id = params.required_str("flow_id")?;
                let priority = params.opt_u32("priority")?.unwrap_or(DEFAULT_PRIORITY);
                let flow_match = object_param(params, "match")?;
                let instructions = object_param(params, "instructions")?;
                RequestSpec::put(
                    flow_path(dpid, table_id, &flow_id),
                    flow_payload(&flow_id, table_id, priority, flow_match, instructions),
                )
            }
            Intent::FlowDelete => {
                let flow_id = params.required_str("flow_id")?;
                RequestSpec::delete(flow_path(dpid, table_id, &flow_id))
            }
            Intent::ShowFlows => {
                let path = if params.present("table_id").is_some() {
                    table_path(dpid, table_id)
                } else {
                    inventory_node_path(dpid)
                };
                RequestSpec::get(Datastore::Operational, path)
            }
            other => return Err(Error::unsupported_intent(other.as_str())),
        };
        Ok(spec.plain_json())
    }
}

fn object_param(params: &Params, key: &str) -> Result<Value> {
    match params.present(key) {
        None => Ok(Value::Object(Map::new())),
        Some(v @ Value::Object(_)) => Ok(v.clone()),
        Some(_) => Err(Error::build(format!("{} must be an object", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::request::PLAIN_JSON;
    use nbi_core::HttpMethod;

    fn switch() -> DeviceProfile {
        DeviceProfile::new("sw1", Vendor::OpenFlow).with_datapath_id("1")
    }

    #[test]
    fn test_node_id_prefix() {
        assert_eq!(openflow_node_id("1"), "openflow:1");
        assert_eq!(openflow_node_id("0001"), "openflow:1");
        assert_eq!(openflow_node_id("openflow:7"), "openflow:7");
    }

    #[test]
    fn test_flow_add() {
        let params = json!({
            "table_id": 0,
            "flow_id": "arp-flood",
            "priority": 1000,
            "match": {"ethernet-match": {"ethernet-type": {"type": 2054}}},
            "instructions": {}
        });
        let spec = OpenFlowDriver
            .build(&switch(), Intent::FlowAdd, params.as_object().unwrap())
            .unwrap();
        assert_eq!(spec.method, HttpMethod::Put);
        assert_eq!(
            spec.path,
            "/opendaylight-inventory:nodes/node=openflow:1/flow-node-inventory:table=0/flow=arp-flood"
        );
        assert_eq!(spec.header("Content-Type"), Some(PLAIN_JSON));
        let flow = &spec.payload.unwrap()["flow-node-inventory:flow"][0];
        assert_eq!(flow["priority"], 1000);
        assert_eq!(flow["table_id"], 0);
    }

    #[test]
    fn test_show_flows_scope() {
        let all = OpenFlowDriver
            .build(&switch(), Intent::ShowFlows, &Params::new())
            .unwrap();
        assert!(all.path.ends_with("node=openflow:1"));
        assert_eq!(all.datastore, Datastore::Operational);

        let params = json!({"table_id": 2});
        let one = OpenFlowDriver
            .build(&switch(), Intent::ShowFlows, params.as_object().unwrap())
            .unwrap();
        assert!(one.path.ends_with("flow-node-inventory:table=2"));
    }

    #[test]
    fn test_match_must_be_object() {
        let params = json!({"flow_id": "x", "match": "in_port=1"});
        let err = OpenFlowDriver
            .build(&switch(), Intent::FlowAdd, params.as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::DriverBuild(_)));
    }
}
