use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::{native, NativeInterface, DRIVER_NAME};
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{encode_key, mount_base, parse_ipv4, prefix_to_netmask, resolve_prefix};

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

/// Static routes and OSPF. OSPF processes live under `native/router`;
/// per-interface area binding is attached to the interface container.
#[derive(Debug, Default)]
pub struct CiscoRoutingDriver;

impl Driver for CiscoRoutingDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn vendor(&self) -> Vendor {
        Vendor::Cisco
    }

    fn supported_intents(&self) -> &'static [Intent] {
        SUPPORTED
    }

    fn compile(&self, device: &DeviceProfile, intent: Intent, params: &Params) -> Result<RequestSpec> {
        let node = device.node_id.as_str();

        match intent {
            Intent::RoutingStaticAdd => {
                let (net, mask) = destination(params)?;
                static_put(node, params, &net, &mask)
            }
            Intent::RoutingStaticDelete => {
                let (net, mask) = destination(params)?;
                Ok(static_delete(node, params, &net, &mask))
            }
            Intent::RoutingDefaultAdd => static_put(node, params, "0.0.0.0", "0.0.0.0"),
            Intent::RoutingDefaultDelete => Ok(static_delete(node, params, "0.0.0.0", "0.0.0.0")),
            Intent::ShowIpRoute => {
                let path = match params.opt_str("vrf") {
                    Some(vrf) => format!(
                        "{}/ietf-routing:routing-state/routing-instance={}",
                        mount_base(node),
                        encode_key(&vrf)
                    ),
                    None => format!("{}/ietf-routing:routing-state", mount_base(node)),
                };
                Ok(RequestSpec::get(Datastore::Operational, path))
            }

            Intent::RoutingOspfEnable => {
                let mut process = process_entry(params)?;
                if let Some(router_id) = params.opt_str("router_id") {
                    process.insert("router-id".into(), Value::String(router_id));
                }
                Ok(router_patch(node, process))
            }
            Intent::RoutingOspfSetRouterId => {
                let mut process = process_entry(params)?;
                let router_id = params.required_str("router_id")?;
                parse_ipv4(&router_id)?;
                process.insert("router-id".into(), Value::String(router_id));
                Ok(router_patch(node, process))
            }
            Intent::RoutingOspfDisable => Ok(RequestSpec::delete(process_path(
                node,
                params.required_u32("process_id")?,
            ))),
            Intent::RoutingOspfAddNetwork => {
                let mut process = process_entry(params)?;
                let network = params.required_str("network")?;
                let wildcard = params.required_str("wildcard_mask")?;
                process.insert(
                    "network".into(),
                    json!([{
                        "ip": parse_ipv4(&network)?.to_string(),
                        "wildcard": parse_ipv4(&wildcard)?.to_string(),
                        "area": area_value(&params.required_str("area")?),
                    }]),
                );
                Ok(router_patch(node, process))
            }
            Intent::RoutingOspfRemoveNetwork => {
                let pid = params.required_u32("process_id")?;
                let network = parse_ipv4(&params.required_str("network")?)?;
                let wildcard = parse_ipv4(&params.required_str("wildcard_mask")?)?;
                Ok(RequestSpec::delete(format!(
                    "{}/network={},{}",
                    process_path(node, pid),
                    network,
                    wildcard
                )))
            }
            Intent::RoutingOspfAddNetworkInterface => {
                let pid = params.required_u32("process_id")?;
                let iface = NativeInterface::resolve(node, &params.required_str("interface")?)?;
                let area = area_value(&params.required_str("area")?);
                let payload = json!({
                    iface.container(): [{
                        "name": iface.number,
                        "ip": {
                            "Cisco-IOS-XE-ospf:router-ospf": {
                                "ospf": {
                                    "process-id": [{
                                        "id": pid,
                                        "area": [{ "area-id": area }]
                                    }]
                                }
                            }
                        }
                    }]
                });
                Ok(RequestSpec::patch(iface.path.clone(), payload))
            }
            Intent::RoutingOspfRemoveNetworkInterface => {
                let pid = params.required_u32("process_id")?;
                let iface = NativeInterface::resolve(node, &params.required_str("interface")?)?;
                Ok(RequestSpec::delete(format!(
                    "{}/ip/Cisco-IOS-XE-ospf:router-ospf/ospf/process-id={}",
                    iface.path, pid
                )))
            }
            Intent::RoutingOspfSetPassiveInterface => {
                let mut process = process_entry(params)?;
                process.insert(
                    "passive-interface".into(),
                    json!({ "interface": [params.required_str("interface")?] }),
                );
                Ok(router_patch(node, process))
            }
            Intent::RoutingOspfRemovePassiveInterface => {
                let pid = params.required_u32("process_id")?;
                let interface = params.required_str("interface")?;
                Ok(RequestSpec::delete(format!(
                    "{}/passive-interface/interface={}",
                    process_path(node, pid),
                    encode_key(&interface)
                )))
            }
            Intent::ShowOspfNeighbors | Intent::ShowOspfDatabase => Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}/Cisco-IOS-XE-ospf-oper:ospf-oper-data", mount_base(node)),
            )),
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

/// (network, dotted mask) from `prefix` (CIDR or bare) plus optional `mask`
fn destination(params: &Params) -> Result<(String, String)> {
    let prefix = params.required_str("prefix")?;
    let mask = params.opt_str("mask");
    let (ip, len) = if prefix.contains('/') {
        resolve_prefix(&prefix, None, None)?
    } else {
        resolve_prefix(&prefix, None, Some(mask.as_deref().unwrap_or("255.255.255.0")))?
    };
    Ok((ip.to_string(), prefix_to_netmask(len)?))
}

fn route_list_path(node: &str, params: &Params, net: &str, mask: &str) -> String {
    let base = format!("{}/ip/route", native(node));
    match params.opt_str("vrf") {
        Some(vrf) => format!(
            "{}/vrf={}/ip-route-interface-forwarding-list={},{}",
            base,
            encode_key(&vrf),
            net,
            mask
        ),
        None => format!("{}/ip-route-interface-forwarding-list={},{}", base, net, mask),
    }
}

fn static_put(node: &str, params: &Params, net: &str, mask: &str) -> Result<RequestSpec> {
    let next_hop = params.required_str("next_hop")?;
    let mut fwd = Map::new();
    fwd.insert("fwd".into(), Value::String(next_hop));
    if let Some(metric) = params.opt_u32("metric")? {
        fwd.insert("metric".into(), json!(metric));
    }
    if let Some(description) = params.opt_str("description") {
        fwd.insert("name".into(), Value::String(description));
    }

    Ok(RequestSpec::put(
        route_list_path(node, params, net, mask),
        json!({
            "Cisco-IOS-XE-native:ip-route-interface-forwarding-list": {
                "prefix": net,
                "mask": mask,
                "fwd-list": [Value::Object(fwd)]
            }
        }),
    ))
}

/// Whole destination, or a single next hop when one is named
fn static_delete(node: &str, params: &Params, net: &str, mask: &str) -> RequestSpec {
    let path = route_list_path(node, params, net, mask);
    match params.opt_str("next_hop") {
        Some(next_hop) => RequestSpec::delete(format!("{}/fwd-list={}", path, encode_key(&next_hop))),
        None => RequestSpec::delete(path),
    }
}

fn process_path(node: &str, pid: u32) -> String {
    format!(
        "{}/router/Cisco-IOS-XE-ospf:router-ospf/ospf/process-id={}",
        native(node),
        pid
    )
}

fn process_entry(params: &Params) -> Result<Map<String, Value>> {
    let mut entry = Map::new();
    entry.insert("id".into(), json!(params.required_u32("process_id")?));
    Ok(entry)
}

fn router_patch(node: &str, process: Map<String, Value>) -> RequestSpec {
    RequestSpec::patch(
        format!("{}/router", native(node)),
        json!({
            "Cisco-IOS-XE-native:router": {
                "Cisco-IOS-XE-ospf:router-ospf": {
                    "ospf": { "process-id": [Value::Object(process)] }
                }
            }
        }),
    )
}

/// IOS-XE accepts the area as an integer or a dotted quad
fn area_value(area: &str) -> Value {
    match area.trim().parse::<u32>() {
        Ok(id) => json!(id),
        Err(_) => Value::String(area.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::HttpMethod;

    fn build(intent: Intent, p: Value) -> Result<RequestSpec> {
        CiscoRoutingDriver.build(
            &DeviceProfile::new("CSR1", Vendor::Cisco),
            intent,
            p.as_object().unwrap(),
        )
    }

    #[test]
    fn test_static_route_cidr() {
        let spec = build(
            Intent::RoutingStaticAdd,
            json!({"prefix": "10.10.0.0/16", "next_hop": "192.168.1.1", "metric": 5}),
        )
        .unwrap();
        assert_eq!(spec.method, HttpMethod::Put);
        assert!(spec
            .path
            .ends_with("ip/route/ip-route-interface-forwarding-list=10.10.0.0,255.255.0.0"));
        let body = &spec.payload.unwrap()["Cisco-IOS-XE-native:ip-route-interface-forwarding-list"];
        assert_eq!(body["fwd-list"][0]["fwd"], "192.168.1.1");
        assert_eq!(body["fwd-list"][0]["metric"], 5);
    }

    #[test]
    fn test_default_route_in_vrf() {
        let spec = build(
            Intent::RoutingDefaultAdd,
            json!({"next_hop": "10.0.0.254", "vrf": "CUST-A"}),
        )
        .unwrap();
        assert!(spec
            .path
            .ends_with("ip/route/vrf=CUST-A/ip-route-interface-forwarding-list=0.0.0.0,0.0.0.0"));
    }

    #[test]
    fn test_ospf_interface_binding() {
        let spec = build(
            Intent::RoutingOspfAddNetworkInterface,
            json!({"process_id": 1, "interface": "GigabitEthernet1/0/2", "area": "0"}),
        )
        .unwrap();
        assert!(spec.path.ends_with("interface/GigabitEthernet=1%2F0%2F2"));
        let entry = &spec.payload.unwrap()["Cisco-IOS-XE-native:GigabitEthernet"][0];
        let process = &entry["ip"]["Cisco-IOS-XE-ospf:router-ospf"]["ospf"]["process-id"][0];
        assert_eq!(process["id"], 1);
        assert_eq!(process["area"][0]["area-id"], 0);
    }

    #[test]
    fn test_passive_remove_encodes_interface() {
        let spec = build(
            Intent::RoutingOspfRemovePassiveInterface,
            json!({"process_id": "10", "interface": "GigabitEthernet0/1"}),
        )
        .unwrap();
        assert_eq!(spec.method, HttpMethod::Delete);
        assert!(spec
            .path
            .ends_with("process-id=10/passive-interface/interface=GigabitEthernet0%2F1"));
    }

    #[test]
    fn test_router_id_validated() {
        let err = build(
            Intent::RoutingOspfSetRouterId,
            json!({"process_id": 1, "router_id": "not-an-ip"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DriverBuild(_)));
    }
}
