use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::DRIVER_NAME;
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{encode_key, mount_base, prefix_to_netmask, resolve_prefix};

const SUPPORTED: &[Intent] = &[
    Intent::InterfaceSetIpv4,
    Intent::InterfaceRemoveIpv4,
    Intent::InterfaceSetIpv6,
    Intent::InterfaceRemoveIpv6,
    Intent::InterfaceEnable,
    Intent::InterfaceDisable,
    Intent::InterfaceSetDescription,
    Intent::InterfaceSetMtu,
    Intent::ShowInterface,
    Intent::ShowInterfaces,
    Intent::ShowIpInterfaceBrief,
];

/// `huawei-ifm` interface management
#[derive(Debug, Default)]
pub struct HuaweiInterfaceDriver;

impl Driver for HuaweiInterfaceDriver {
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
        let interfaces = format!("{}/huawei-ifm:ifm/interfaces", mount_base(&device.node_id));

        if matches!(intent, Intent::ShowInterfaces | Intent::ShowIpInterfaceBrief) {
            return Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}?content=config", interfaces),
            ));
        }

        let if_name = params.required_str("interface")?;
        let path = format!("{}/interface={}", interfaces, encode_key(&if_name));

        let mut fields = Map::new();
        match intent {
            Intent::ShowInterface => return Ok(RequestSpec::get(Datastore::Operational, path)),
            Intent::InterfaceRemoveIpv4 => {
                return Ok(RequestSpec::delete(format!("{}/ipv4Config/am4CfgAddrs", path)))
            }
            Intent::InterfaceRemoveIpv6 => {
                return Ok(RequestSpec::delete(format!("{}/ipv6Config", path)))
            }
            Intent::InterfaceSetIpv4 => {
                let (addr, len) = resolve_prefix(
                    &params.required_str("ip")?,
                    params.opt_str("prefix").as_deref(),
                    params.opt_str("mask").as_deref(),
                )?;
                fields.insert(
                    "ipv4Config".into(),
                    json!({
                        "addrCfgType": "config",
                        "am4CfgAddrs": {
                            "am4CfgAddr": [{
                                "ifIpAddr": addr.to_string(),
                                "subnetMask": prefix_to_netmask(len)?,
                                "addrType": "main"
                            }]
                        }
                    }),
                );
                if let Some(description) = params.opt_str("description") {
                    fields.insert("ifDescr".into(), Value::String(description));
                }
            }
            Intent::InterfaceSetIpv6 => {
                let ip = params.required_str("ip")?;
                let address = if ip.contains('/') {
                    ip
                } else {
                    format!("{}/{}", ip, params.opt_u32("prefix")?.unwrap_or(64))
                };
                fields.insert(
                    "ipv6Config".into(),
                    json!({
                        "enableFlag": true,
                        "am6CfgAddrs": {
                            "am6CfgAddr": [{ "ifIp6Addr": address, "addrType6": "global" }]
                        }
                    }),
                );
                if let Some(description) = params.opt_str("description") {
                    fields.insert("ifDescr".into(), Value::String(description));
                }
            }
            Intent::InterfaceEnable => {
                fields.insert("ifAdminStatus".into(), json!("up"));
            }
            Intent::InterfaceDisable => {
                fields.insert("ifAdminStatus".into(), json!("down"));
            }
            Intent::InterfaceSetDescription => {
                fields.insert(
                    "ifDescr".into(),
                    Value::String(params.required_str("description")?),
                );
            }
            Intent::InterfaceSetMtu => {
                fields.insert("ifMtu".into(), json!(params.required_u32("mtu")?));
            }
            other => return Err(Error::unsupported_intent(other.as_str())),
        }

        let mut entry = Map::new();
        entry.insert("ifName".into(), Value::String(if_name));
        entry.extend(fields);
        Ok(RequestSpec::patch(
            path,
            json!({ "huawei-ifm:interface": [Value::Object(entry)] }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::HttpMethod;

    fn build(intent: Intent, p: Value) -> Result<RequestSpec> {
        HuaweiInterfaceDriver.build(
            &DeviceProfile::new("NE40", Vendor::Huawei),
            intent,
            p.as_object().unwrap(),
        )
    }

    #[test]
    fn test_set_ipv4_with_mask() {
        let spec = build(
            Intent::InterfaceSetIpv4,
            json!({"interface": "GigabitEthernet0/0/1", "ip": "10.1.1.1", "mask": "255.255.255.252"}),
        )
        .unwrap();
        assert!(spec
            .path
            .ends_with("huawei-ifm:ifm/interfaces/interface=GigabitEthernet0%2F0%2F1"));
        let entry = &spec.payload.unwrap()["huawei-ifm:interface"][0];
        assert_eq!(entry["ifName"], "GigabitEthernet0/0/1");
        let addr = &entry["ipv4Config"]["am4CfgAddrs"]["am4CfgAddr"][0];
        assert_eq!(addr["subnetMask"], "255.255.255.252");
        assert_eq!(addr["addrType"], "main");
    }

    #[test]
    fn test_admin_status() {
        let spec = build(Intent::InterfaceDisable, json!({"interface": "GE1/0/0"})).unwrap();
        assert_eq!(spec.method, HttpMethod::Patch);
        assert_eq!(spec.payload.unwrap()["huawei-ifm:interface"][0]["ifAdminStatus"], "down");
    }

    #[test]
    fn test_subinterface_not_declared() {
        let err = build(
            Intent::InterfaceCreateSubinterface,
            json!({"interface": "GE1/0/0", "vlan_id": 10}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedIntent(_)));
    }
}
