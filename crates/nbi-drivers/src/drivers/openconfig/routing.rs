use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::{network_instance, DRIVER_NAME};
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{area_to_dotted, encode_key, parse_ipv4, resolve_prefix, wildcard_to_prefix};

const SUPPORTED: &[Intent] = &[
    Intent::RoutingStaticAdd,
    Intent::RoutingStaticDelete,
    Intent::RoutingDefaultAdd,
    Intent::RoutingDefaultDelete,
    Intent::ShowIpRoute,
    Intent::RoutingOspfEnable,
    Intent::RoutingOspfDisable,
    Intent::RoutingOspfAddNetwork,
    Intent::RoutingOspfRemoveNetwork,
    Intent::RoutingOspfAddNetworkInterface,
    Intent::RoutingOspfRemoveNetworkInterface,
    Intent::RoutingOspfSetRouterId,
    Intent::RoutingOspfSetPassiveInterface,
    Intent::RoutingOspfRemovePassiveInterface,
    Intent::ShowOspfNeighbors,
    Intent::ShowOspfDatabase,
];

const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Protocols under `network-instance=default/protocols/protocol={TYPE},{name}`
#[derive(Debug, Default)]
pub struct OpenConfigRoutingDriver;

impl Driver for OpenConfigRoutingDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn vendor(&self) -> Vendor {
        Vendor::OpenConfig
    }

    fn supported_intents(&self) -> &'static [Intent] {
        SUPPORTED
    }

    fn compile(&self, device: &DeviceProfile, intent: Intent, params: &Params) -> Result<RequestSpec> {
        let node = device.node_id.as_str();

        match intent {
            Intent::RoutingStaticAdd => {
                let prefix = static_prefix(params)?;
                static_put(node, params, &prefix)
            }
            Intent::RoutingDefaultAdd => static_put(node, params, DEFAULT_ROUTE),
            Intent::RoutingStaticDelete => {
                let prefix = static_prefix(params)?;
                Ok(RequestSpec::delete(static_path(node, params, &prefix)))
            }
            Intent::RoutingDefaultDelete => {
                Ok(RequestSpec::delete(static_path(node, params, DEFAULT_ROUTE)))
            }
            Intent::ShowIpRoute => {
                let vrf = params.opt_str("vrf").unwrap_or_else(|| "default".to_string());
                Ok(RequestSpec::get(
                    Datastore::Operational,
                    format!("{}/afts", network_instance(node, &vrf)),
                ))
            }

            Intent::RoutingOspfEnable => {
                let pid = params.required_str("process_id")?;
                let mut global = Map::new();
                if let Some(router_id) = params.opt_str("router_id") {
                    global.insert("router-id".into(), Value::String(parse_ipv4(&router_id)?.to_string()));
                }
                Ok(RequestSpec::put(
                    ospf_path(node, &pid),
                    json!({
                        "openconfig-network-instance:protocol": [{
                            "identifier": "openconfig-policy-types:OSPF",
                            "name": pid,
                            "config": {
                                "identifier": "openconfig-policy-types:OSPF",
                                "name": pid
                            },
                            "ospfv2": { "global": { "config": Value::Object(global) } }
                        }]
                    }),
                ))
            }
            Intent::RoutingOspfDisable => Ok(RequestSpec::delete(ospf_path(
                node,
                &params.required_str("process_id")?,
            ))),
            Intent::RoutingOspfSetRouterId => {
                let pid = params.required_str("process_id")?;
                let router_id = parse_ipv4(&params.required_str("router_id")?)?;
                Ok(RequestSpec::patch(
                    format!("{}/ospfv2/global/config", ospf_path(node, &pid)),
                    json!({ "openconfig-network-instance:config": { "router-id": router_id.to_string() } }),
                ))
            }
            // OpenConfig has no network statements; a covered prefix becomes an
            // area interface keyed by the prefix itself
            Intent::RoutingOspfAddNetwork | Intent::RoutingOspfRemoveNetwork => {
                let network = parse_ipv4(&params.required_str("network")?)?;
                let len = wildcard_to_prefix(&params.required_str("wildcard_mask")?)?;
                let id = format!("{}/{}", network, len);
                let path = area_interface_path(node, params, &id)?;
                if intent == Intent::RoutingOspfRemoveNetwork {
                    return Ok(RequestSpec::delete(path));
                }
                Ok(RequestSpec::put(
                    path,
                    json!({ "openconfig-network-instance:interface": [{ "id": id, "config": { "id": id } }] }),
                ))
            }
            Intent::RoutingOspfAddNetworkInterface => {
                let name = params.required_str("interface")?;
                let path = area_interface_path(node, params, &name)?;
                Ok(RequestSpec::put(
                    path,
                    json!({ "openconfig-network-instance:interface": [{ "id": name, "config": { "id": name } }] }),
                ))
            }
            Intent::RoutingOspfRemoveNetworkInterface => {
                let name = params.required_str("interface")?;
                Ok(RequestSpec::delete(area_interface_path(node, params, &name)?))
            }
            Intent::RoutingOspfSetPassiveInterface | Intent::RoutingOspfRemovePassiveInterface => {
                let name = params.required_str("interface")?;
                let path = format!("{}/config", area_interface_path(node, params, &name)?);
                Ok(RequestSpec::patch(
                    path,
                    json!({
                        "openconfig-network-instance:config": {
                            "id": name,
                            "passive": intent == Intent::RoutingOspfSetPassiveInterface
                        }
                    }),
                ))
            }
            Intent::ShowOspfNeighbors | Intent::ShowOspfDatabase => {
                let pid = params.opt_str("process_id").unwrap_or_else(|| "1".to_string());
                let mut path = format!("{}/ospfv2/areas", ospf_path(node, &pid));
                if let Some(area) = params.opt_str("area") {
                    path = format!("{}/area={}", path, encode_key(&area_to_dotted(&area)?));
                }
                Ok(RequestSpec::get(Datastore::Operational, path))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

fn static_prefix(params: &Params) -> Result<String> {
    let prefix = params.required_str("prefix")?;
    let (ip, len) = resolve_prefix(
        &prefix,
        None,
        Some(params.opt_str("mask").as_deref().unwrap_or("255.255.255.0")),
    )?;
    Ok(format!("{}/{}", ip, len))
}

fn instance(params: &Params) -> String {
    params.opt_str("vrf").unwrap_or_else(|| "default".to_string())
}

fn static_path(node: &str, params: &Params, prefix: &str) -> String {
    format!(
        "{}/protocols/protocol=STATIC,static/static-routes/static={}",
        network_instance(node, &instance(params)),
        encode_key(prefix)
    )
}

fn static_put(node: &str, params: &Params, prefix: &str) -> Result<RequestSpec> {
    let next_hop = parse_ipv4(&params.required_str("next_hop")?)?.to_string();
    let metric = params.opt_u32("metric")?.unwrap_or(1);
    let mut config = Map::new();
    config.insert("prefix".into(), Value::String(prefix.to_string()));
    if let Some(description) = params.opt_str("description") {
        config.insert("description".into(), Value::String(description));
    }

    Ok(RequestSpec::put(
        static_path(node, params, prefix),
        json!({
            "openconfig-network-instance:static": [{
                "prefix": prefix,
                "config": Value::Object(config),
                "next-hops": {
                    "next-hop": [{
                        "index": "0",
                        "config": { "index": "0", "next-hop": next_hop, "metric": metric }
                    }]
                }
            }]
        }),
    ))
}

fn ospf_path(node: &str, pid: &str) -> String {
    format!(
        "{}/protocols/protocol=OSPF,{}",
        network_instance(node, "default"),
        encode_key(pid)
    )
}

fn area_interface_path(node: &str, params: &Params, id: &str) -> Result<String> {
    let pid = params.required_str("process_id")?;
    let area = area_to_dotted(&params.opt_str("area").unwrap_or_else(|| "0".to_string()))?;
    Ok(format!(
        "{}/ospfv2/areas/area={}/interfaces/interface={}",
        ospf_path(node, &pid),
        encode_key(&area),
        encode_key(id)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::HttpMethod;

    fn build(intent: Intent, p: Value) -> Result<RequestSpec> {
        OpenConfigRoutingDriver.build(
            &DeviceProfile::new("oc1", Vendor::OpenConfig),
            intent,
            p.as_object().unwrap(),
        )
    }

    #[test]
    fn test_default_route_key_escaped() {
        let spec = build(Intent::RoutingDefaultAdd, json!({"next_hop": "10.0.0.1"})).unwrap();
        assert!(spec.path.ends_with(
            "network-instance=default/protocols/protocol=STATIC,static/static-routes/static=0.0.0.0%2F0"
        ));
        let payload = spec.payload.unwrap();
        let hop = &payload["openconfig-network-instance:static"][0]["next-hops"]["next-hop"][0];
        assert_eq!(hop["config"]["next-hop"], "10.0.0.1");
        assert_eq!(hop["config"]["metric"], 1);
    }

    #[test]
    fn test_ospf_network_as_area_interface() {
        let spec = build(
            Intent::RoutingOspfAddNetwork,
            json!({"process_id": 1, "area": 0, "network": "10.1.0.0", "wildcard_mask": "0.0.255.255"}),
        )
        .unwrap();
        assert_eq!(spec.method, HttpMethod::Put);
        assert!(spec
            .path
            .ends_with("protocol=OSPF,1/ospfv2/areas/area=0.0.0.0/interfaces/interface=10.1.0.0%2F16"));
    }

    #[test]
    fn test_static_prefix_from_mask() {
        let spec = build(
            Intent::RoutingStaticDelete,
            json!({"prefix": "172.16.0.0", "mask": "255.240.0.0"}),
        )
        .unwrap();
        assert!(spec.path.ends_with("static=172.16.0.0%2F12"));
    }
}
