use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::{DRIVER_NAME, PUBLIC_VRF};
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{area_to_dotted, encode_key, mount_base, parse_ipv4, resolve_prefix};

const SUPPORTED: &[Intent] = &[
    Intent::RoutingOspfEnable,
    Intent::RoutingOspfDisable,
    Intent::RoutingOspfAddNetworkInterface,
    Intent::RoutingOspfRemoveNetworkInterface,
    Intent::RoutingOspfSetRouterId,
    Intent::ShowOspfNeighbors,
    Intent::ShowOspfDatabase,
    Intent::RoutingStaticAdd,
    Intent::RoutingStaticDelete,
    Intent::RoutingDefaultAdd,
    Intent::RoutingDefaultDelete,
    Intent::ShowIpRoute,
];

/// OSPF via `huawei-ospfv2` and static routes via `huawei-staticrt`.
///
/// OSPF sites sit below the `ospfv2comm` container, which the model hides
/// from its own naming; paths that skip it get a 409 from the controller.
#[derive(Debug, Default)]
pub struct HuaweiRoutingDriver;

impl Driver for HuaweiRoutingDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn vendor(&self) -> Vendor {
        Vendor::Huawei
    }

    fn supported_intents(&self) -> &'static [Intent] {
        SUPPORTED
    }

    fn compile(&self, device: &DeviceProfile, intent: Intent, params: &Params) -> Result<RequestSpec> {
        let mount = mount_base(&device.node_id);

        match intent {
            Intent::RoutingOspfEnable | Intent::RoutingOspfSetRouterId => {
                let pid = params.required_u32("process_id")?;
                let mut site = Map::new();
                site.insert("processId".into(), json!(pid));
                site.insert("vrfName".into(), Value::String(vrf(params)));
                let router_id = if intent == Intent::RoutingOspfSetRouterId {
                    Some(params.required_str("router_id")?)
                } else {
                    params.opt_str("router_id")
                };
                if let Some(router_id) = router_id {
                    parse_ipv4(&router_id)?;
                    site.insert("routerId".into(), Value::String(router_id));
                }
                Ok(RequestSpec::patch(
                    site_path(&mount, pid),
                    json!({ "huawei-ospfv2:ospfSite": [Value::Object(site)] }),
                ))
            }
            Intent::RoutingOspfDisable => Ok(RequestSpec::delete(site_path(
                &mount,
                params.required_u32("process_id")?,
            ))),
            Intent::RoutingOspfAddNetworkInterface => {
                let if_name = params.required_str("interface")?;
                let path = area_interfaces_path(&mount, params)?;
                Ok(RequestSpec::patch(
                    path,
                    json!({ "huawei-ospfv2:interfaces": { "interface": [{ "ifName": if_name }] } }),
                ))
            }
            Intent::RoutingOspfRemoveNetworkInterface => {
                let if_name = params.required_str("interface")?;
                let path = area_interfaces_path(&mount, params)?;
                Ok(RequestSpec::delete(format!(
                    "{}/interface={}",
                    path,
                    encode_key(&if_name)
                )))
            }
            // OSPF state is only reachable through the config view on VRP8
            Intent::ShowOspfNeighbors | Intent::ShowOspfDatabase => Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}/huawei-ospfv2:ospfv2?content=config", mount),
            )),

            Intent::RoutingStaticAdd => {
                let (prefix, len) = destination(params)?;
                static_add(&mount, params, &prefix, len)
            }
            Intent::RoutingDefaultAdd => static_add(&mount, params, "0.0.0.0", 0),
            Intent::RoutingStaticDelete => {
                let (prefix, len) = destination(params)?;
                Ok(static_delete(&mount, params, &prefix, len))
            }
            Intent::RoutingDefaultDelete => Ok(static_delete(&mount, params, "0.0.0.0", 0)),
            Intent::ShowIpRoute => Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}/huawei-staticrt:staticrt?content=config", mount),
            )),
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

fn vrf(params: &Params) -> String {
    params
        .opt_str("vrf")
        .or_else(|| params.opt_str("vrf_name"))
        .unwrap_or_else(|| PUBLIC_VRF.to_string())
}

fn site_path(mount: &str, pid: u32) -> String {
    format!(
        "{}/huawei-ospfv2:ospfv2/ospfv2comm/ospfSites/ospfSite={}",
        mount, pid
    )
}

/// `.../areas/area={dotted}/interfaces`; area defaults to the backbone
fn area_interfaces_path(mount: &str, params: &Params) -> Result<String> {
    let pid = params.required_u32("process_id")?;
    let area = area_to_dotted(&params.opt_str("area").unwrap_or_else(|| "0".to_string()))?;
    Ok(format!(
        "{}/areas/area={}/interfaces",
        site_path(mount, pid),
        encode_key(&area)
    ))
}

fn destination(params: &Params) -> Result<(String, u8)> {
    let prefix = params.required_str("prefix")?;
    let (ip, len) = resolve_prefix(&prefix, None, params.opt_str("mask").as_deref())?;
    Ok((ip.to_string(), len))
}

fn static_add(mount: &str, params: &Params, prefix: &str, len: u8) -> Result<RequestSpec> {
    let next_hop = parse_ipv4(&params.required_str("next_hop")?)?.to_string();
    let vrf = vrf(params);

    let mut route = Map::new();
    route.insert("vrfName".into(), Value::String(vrf.clone()));
    route.insert("afType".into(), json!("ipv4unicast"));
    route.insert("topologyName".into(), json!("base"));
    route.insert("prefix".into(), Value::String(prefix.to_string()));
    route.insert("maskLength".into(), json!(len));
    route.insert("ifName".into(), json!(""));
    route.insert("nexthop".into(), Value::String(next_hop));
    route.insert("destVrfName".into(), Value::String(vrf));
    if let Some(metric) = params.opt_u32("metric")? {
        route.insert("preference".into(), json!(metric));
    }
    if let Some(description) = params.opt_str("description") {
        route.insert("description".into(), Value::String(description));
    }

    Ok(RequestSpec::patch(
        format!("{}/huawei-staticrt:staticrt/staticrtbase/srRoutes", mount),
        json!({ "huawei-staticrt:srRoutes": { "srRoute": [Value::Object(route)] } }),
    ))
}

/// Keys: vrfName, afType, topologyName, prefix, maskLength, ifName, nexthop, destVrfName
fn static_delete(mount: &str, params: &Params, prefix: &str, len: u8) -> RequestSpec {
    let vrf = encode_key(&vrf(params));
    let next_hop = params.opt_str("next_hop").unwrap_or_default();
    RequestSpec::delete(format!(
        "{}/huawei-staticrt:staticrt/staticrtbase/srRoutes/srRoute={},ipv4unicast,base,{},{},,{},{}",
        mount,
        vrf,
        encode_key(prefix),
        len,
        vrf,
        encode_key(&next_hop)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::HttpMethod;

    fn build(intent: Intent, p: Value) -> Result<RequestSpec> {
        HuaweiRoutingDriver.build(
            &DeviceProfile::new("NE40", Vendor::Huawei),
            intent,
            p.as_object().unwrap(),
        )
    }

    #[test]
    fn test_ospf_site_uses_hidden_container() {
        let spec = build(Intent::RoutingOspfEnable, json!({"process_id": 1, "router_id": "1.1.1.1"})).unwrap();
        assert!(spec
            .path
            .ends_with("huawei-ospfv2:ospfv2/ospfv2comm/ospfSites/ospfSite=1"));
        let site = &spec.payload.unwrap()["huawei-ospfv2:ospfSite"][0];
        assert_eq!(site["vrfName"], "_public_");
        assert_eq!(site["routerId"], "1.1.1.1");
    }

    #[test]
    fn test_integer_area_becomes_dotted() {
        let spec = build(
            Intent::RoutingOspfAddNetworkInterface,
            json!({"process_id": 1, "area": 10, "interface": "Ethernet1/0/4"}),
        )
        .unwrap();
        assert!(spec.path.ends_with("areas/area=0.0.0.10/interfaces"));

        let spec = build(
            Intent::RoutingOspfRemoveNetworkInterface,
            json!({"process_id": 1, "interface": "Ethernet1/0/4"}),
        )
        .unwrap();
        assert_eq!(spec.method, HttpMethod::Delete);
        assert!(spec
            .path
            .ends_with("areas/area=0.0.0.0/interfaces/interface=Ethernet1%2F0%2F4"));
    }

    #[test]
    fn test_static_route_keys() {
        let spec = build(
            Intent::RoutingStaticDelete,
            json!({"prefix": "10.0.0.0/24", "next_hop": "192.168.1.1"}),
        )
        .unwrap();
        assert!(spec
            .path
            .ends_with("srRoute=_public_,ipv4unicast,base,10.0.0.0,24,,_public_,192.168.1.1"));

        let spec = build(Intent::RoutingDefaultAdd, json!({"next_hop": "10.0.0.1"})).unwrap();
        let route = &spec.payload.unwrap()["huawei-staticrt:srRoutes"]["srRoute"][0];
        assert_eq!(route["prefix"], "0.0.0.0");
        assert_eq!(route["maskLength"], 0);
    }
}
