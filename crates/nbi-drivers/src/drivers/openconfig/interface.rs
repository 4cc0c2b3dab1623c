use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::{interface_path, DRIVER_NAME};
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{encode_key, mount_base, resolve_prefix, vlan_id};

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

/// Addresses live on subinterface 0; admin state, description and MTU on
/// the interface `config` container.
#[derive(Debug, Default)]
pub struct OpenConfigInterfaceDriver;

impl Driver for OpenConfigInterfaceDriver {
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

        if matches!(intent, Intent::ShowInterfaces | Intent::ShowIpInterfaceBrief) {
            return Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}/openconfig-interfaces:interfaces", mount_base(node)),
            ));
        }

        let name = params.required_str("interface")?;
        let base = interface_path(node, &name);
        let sub0 = format!("{}/subinterfaces/subinterface=0", base);

        match intent {
            Intent::ShowInterface => Ok(RequestSpec::get(Datastore::Operational, base)),
            Intent::InterfaceSetIpv4 => {
                let (ip, len) = resolve_prefix(
                    &params.required_str("ip")?,
                    params.opt_str("prefix").as_deref(),
                    params.opt_str("mask").as_deref(),
                )?;
                Ok(RequestSpec::put(
                    format!(
                        "{}/openconfig-if-ip:ipv4/addresses/address={}",
                        sub0,
                        encode_key(&ip.to_string())
                    ),
                    json!({
                        "openconfig-if-ip:address": [{
                            "ip": ip.to_string(),
                            "config": { "ip": ip.to_string(), "prefix-length": len }
                        }]
                    }),
                ))
            }
            Intent::InterfaceRemoveIpv4 => Ok(RequestSpec::delete(match params.opt_str("ip") {
                Some(ip) => {
                    let ip = ip.split('/').next().unwrap_or_default().to_string();
                    format!(
                        "{}/openconfig-if-ip:ipv4/addresses/address={}",
                        sub0,
                        encode_key(&ip)
                    )
                }
                None => format!("{}/openconfig-if-ip:ipv4/addresses", sub0),
            })),
            Intent::InterfaceSetIpv6 => {
                let raw = params.required_str("ip")?;
                let (ip, len) = match raw.split_once('/') {
                    Some((ip, len)) => (
                        ip.to_string(),
                        len.parse::<u32>()
                            .map_err(|_| Error::build(format!("Invalid IPv6 prefix in {}", raw)))?,
                    ),
                    None => (raw.clone(), params.opt_u32("prefix")?.unwrap_or(64)),
                };
                Ok(RequestSpec::put(
                    format!(
                        "{}/openconfig-if-ip:ipv6/addresses/address={}",
                        sub0,
                        encode_key(&ip)
                    ),
                    json!({
                        "openconfig-if-ip:address": [{
                            "ip": ip,
                            "config": { "ip": ip, "prefix-length": len }
                        }]
                    }),
                ))
            }
            Intent::InterfaceRemoveIpv6 => Ok(RequestSpec::delete(format!(
                "{}/openconfig-if-ip:ipv6/addresses",
                sub0
            ))),
            Intent::InterfaceEnable | Intent::InterfaceDisable => Ok(config_patch(
                &base,
                "enabled",
                json!(intent == Intent::InterfaceEnable),
            )),
            Intent::InterfaceSetDescription => Ok(config_patch(
                &base,
                "description",
                Value::String(params.required_str("description")?),
            )),
            Intent::InterfaceSetMtu => Ok(config_patch(
                &base,
                "mtu",
                json!(params.required_u32("mtu")?),
            )),
            Intent::InterfaceCreateSubinterface => {
                let index = vlan_id(params)?;
                let mut config = Map::new();
                config.insert("index".into(), json!(index));
                if let Some(description) = params.opt_str("description") {
                    config.insert("description".into(), Value::String(description));
                }
                let mut sub = Map::new();
                sub.insert("index".into(), json!(index));
                sub.insert("config".into(), Value::Object(config));
                sub.insert(
                    "openconfig-vlan:vlan".into(),
                    json!({ "config": { "vlan-id": index } }),
                );
                if let Some(ip) = params.opt_str("ip") {
                    let (ip, len) = resolve_prefix(&ip, params.opt_str("prefix").as_deref(), None)?;
                    sub.insert(
                        "openconfig-if-ip:ipv4".into(),
                        json!({
                            "addresses": {
                                "address": [{
                                    "ip": ip.to_string(),
                                    "config": { "ip": ip.to_string(), "prefix-length": len }
                                }]
                            }
                        }),
                    );
                }
                Ok(RequestSpec::put(
                    format!("{}/subinterfaces/subinterface={}", base, index),
                    json!({ "openconfig-interfaces:subinterface": [Value::Object(sub)] }),
                ))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

fn config_patch(base: &str, leaf: &str, value: Value) -> RequestSpec {
    let mut config = Map::new();
    config.insert(leaf.to_string(), value);
    RequestSpec::patch(
        format!("{}/config", base),
        json!({ "openconfig-interfaces:config": Value::Object(config) }),
    )
}
