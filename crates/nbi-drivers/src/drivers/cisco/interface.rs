use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, RequestSpec, Result, Vendor};

use super::{native, NativeInterface, DRIVER_NAME};
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{encode_key, prefix_to_netmask, resolve_prefix};

const SUPPORTED: &[Intent] = &[
    Intent::InterfaceSetIpv4,
    Intent::InterfaceRemoveIpv4,
    Intent::InterfaceSetIpv6,
    Intent::InterfaceRemoveIpv6,
    Intent::InterfaceEnable,
    Intent::InterfaceDisable,
    Intent::InterfaceSetDescription,
    Intent::InterfaceSetMtu,
    Intent::InterfaceCreateSubinterface,
    Intent::ShowInterface,
    Intent::ShowInterfaces,
    Intent::ShowIpInterfaceBrief,
];

/// Interface intents against `native/interface/{Type}={Number}`
#[derive(Debug, Default)]
pub struct CiscoInterfaceDriver;

impl Driver for CiscoInterfaceDriver {
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
            Intent::ShowInterfaces | Intent::ShowIpInterfaceBrief => Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}/interface", native(node)),
            )),
            Intent::InterfaceCreateSubinterface => create_subinterface(node, params),
            _ => {
                let iface = NativeInterface::resolve(node, &params.required_str("interface")?)?;
                match intent {
                    Intent::InterfaceSetIpv4 => set_ipv4(&iface, params),
                    Intent::InterfaceRemoveIpv4 => {
                        Ok(RequestSpec::delete(format!("{}/ip/address", iface.path)))
                    }
                    Intent::InterfaceSetIpv6 => set_ipv6(&iface, params),
                    Intent::InterfaceRemoveIpv6 => {
                        Ok(RequestSpec::delete(format!("{}/ipv6/address", iface.path)))
                    }
                    // no shutdown == remove the presence leaf
                    Intent::InterfaceEnable => {
                        Ok(RequestSpec::delete(format!("{}/shutdown", iface.path)))
                    }
                    Intent::InterfaceDisable => {
                        let mut entry = Map::new();
                        entry.insert("shutdown".into(), json!([null]));
                        Ok(merge(&iface, entry))
                    }
                    Intent::InterfaceSetDescription => {
                        let mut entry = Map::new();
                        entry.insert(
                            "description".into(),
                            Value::String(params.required_str("description")?),
                        );
                        Ok(merge(&iface, entry))
                    }
                    Intent::InterfaceSetMtu => {
                        let mut entry = Map::new();
                        entry.insert("mtu".into(), json!(params.required_u32("mtu")?));
                        Ok(merge(&iface, entry))
                    }
                    Intent::ShowInterface => {
                        Ok(RequestSpec::get(Datastore::Operational, iface.path.clone()))
                    }
                    other => Err(nbi_core::Error::unsupported_intent(other.as_str())),
                }
            }
        }
    }
}

/// PATCH one interface entry, wrapping `fields` with the list key
fn merge(iface: &NativeInterface, fields: Map<String, Value>) -> RequestSpec {
    let mut entry = Map::new();
    entry.insert("name".into(), Value::String(iface.number.clone()));
    entry.extend(fields);
    RequestSpec::patch(
        iface.path.clone(),
        json!({ iface.container(): [Value::Object(entry)] }),
    )
}

fn ipv4_block(params: &Params) -> Result<Value> {
    let ip = params.required_str("ip")?;
    let (addr, len) = resolve_prefix(
        &ip,
        params.opt_str("prefix").as_deref(),
        params.opt_str("mask").as_deref(),
    )?;
    Ok(json!({
        "address": {
            "primary": {
                "address": addr.to_string(),
                "mask": prefix_to_netmask(len)?,
            }
        }
    }))
}

fn set_ipv4(iface: &NativeInterface, params: &Params) -> Result<RequestSpec> {
    let mut entry = Map::new();
    entry.insert("ip".into(), ipv4_block(params)?);
    if let Some(description) = params.opt_str("description") {
        entry.insert("description".into(), Value::String(description));
    }
    Ok(merge(iface, entry))
}

fn set_ipv6(iface: &NativeInterface, params: &Params) -> Result<RequestSpec> {
    let ip = params.required_str("ip")?;
    let prefix = if ip.contains('/') {
        ip
    } else {
        let len = params.opt_u32("prefix")?.unwrap_or(64);
        if len > 128 {
            return Err(nbi_core::Error::build(format!("Invalid IPv6 prefix length: {}", len)));
        }
        format!("{}/{}", ip, len)
    };

    let mut entry = Map::new();
    entry.insert(
        "ipv6".into(),
        json!({ "address": { "prefix-list": [{ "prefix": prefix }] } }),
    );
    if let Some(description) = params.opt_str("description") {
        entry.insert("description".into(), Value::String(description));
    }
    Ok(merge(iface, entry))
}

fn create_subinterface(node: &str, params: &Params) -> Result<RequestSpec> {
    let parent = NativeInterface::resolve(node, &params.required_str("interface")?)?;
    let vlan_id = params.required_u32("vlan_id")?;
    let number = format!("{}.{}", parent.number, vlan_id);
    let path = format!(
        "{}/interface/{}={}",
        native(node),
        parent.if_type,
        encode_key(&number)
    );

    let mut entry = Map::new();
    entry.insert("name".into(), Value::String(number));
    entry.insert(
        "encapsulation".into(),
        json!({ "dot1Q": { "vlan-id": vlan_id } }),
    );
    if params.present("ip").is_some() {
        entry.insert("ip".into(), ipv4_block(params)?);
    }
    if let Some(description) = params.opt_str("description") {
        entry.insert("description".into(), Value::String(description));
    }

    Ok(RequestSpec::put(
        path,
        json!({ parent.container(): [Value::Object(entry)] }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::HttpMethod;

    fn device() -> DeviceProfile {
        DeviceProfile::new("CSR1", Vendor::Cisco)
    }

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_ipv4_native() {
        let spec = CiscoInterfaceDriver
            .build(
                &device(),
                Intent::InterfaceSetIpv4,
                &params(json!({"interface": "GigabitEthernet0/0/1", "ip": "10.0.0.1", "prefix": 24})),
            )
            .unwrap();

        assert_eq!(spec.method, HttpMethod::Patch);
        assert!(spec.path.ends_with("interface/GigabitEthernet=0%2F0%2F1"));
        let entry = &spec.payload.unwrap()["Cisco-IOS-XE-native:GigabitEthernet"][0];
        assert_eq!(entry["name"], "0/0/1");
        assert_eq!(entry["ip"]["address"]["primary"]["mask"], "255.255.255.0");
        assert_eq!(spec.driver, "cisco");
    }

    #[test]
    fn test_enable_disable() {
        let p = params(json!({"interface": "Loopback0"}));
        let enable = CiscoInterfaceDriver
            .build(&device(), Intent::InterfaceEnable, &p)
            .unwrap();
        assert_eq!(enable.method, HttpMethod::Delete);
        assert!(enable.path.ends_with("interface/Loopback=0/shutdown"));

        let disable = CiscoInterfaceDriver
            .build(&device(), Intent::InterfaceDisable, &p)
            .unwrap();
        assert_eq!(disable.method, HttpMethod::Patch);
        assert_eq!(
            disable.payload.unwrap()["Cisco-IOS-XE-native:Loopback"][0]["shutdown"],
            json!([null])
        );
    }

    #[test]
    fn test_subinterface_key_is_encoded() {
        let spec = CiscoInterfaceDriver
            .build(
                &device(),
                Intent::InterfaceCreateSubinterface,
                &params(json!({"interface": "GigabitEthernet0/0/1", "vlan_id": "100"})),
            )
            .unwrap();
        assert_eq!(spec.method, HttpMethod::Put);
        assert!(spec.path.ends_with("GigabitEthernet=0%2F0%2F1.100"));
        let entry = &spec.payload.unwrap()["Cisco-IOS-XE-native:GigabitEthernet"][0];
        assert_eq!(entry["encapsulation"]["dot1Q"]["vlan-id"], 100);
    }

    #[test]
    fn test_bad_params() {
        let err = CiscoInterfaceDriver
            .build(&device(), Intent::InterfaceSetMtu, &params(json!({"interface": "Gi1", "mtu": "big"})))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
    }
}
