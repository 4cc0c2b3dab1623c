use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::{native, NativeInterface, DRIVER_NAME};
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::vlan_id;

const SUPPORTED: &[Intent] = &[
    Intent::VlanCreate,
    Intent::VlanDelete,
    Intent::VlanUpdate,
    Intent::VlanAssignPort,
    Intent::ShowVlans,
];

#[derive(Debug, Default)]
pub struct CiscoVlanDriver;

impl Driver for CiscoVlanDriver {
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
            Intent::ShowVlans => Ok(RequestSpec::get(
                Datastore::Config,
                format!("{}/vlan", native(node)),
            )),
            Intent::VlanCreate => {
                let id = vlan_id(params)?;
                let name = params
                    .opt_str("name")
                    .unwrap_or_else(|| format!("VLAN{}", id));
                Ok(RequestSpec::put(
                    vlan_path(node, id),
                    json!({ "Cisco-IOS-XE-vlan:vlan-list": { "id": id, "name": name } }),
                ))
            }
            Intent::VlanUpdate => {
                let id = vlan_id(params)?;
                let mut entry = Map::new();
                entry.insert("id".into(), json!(id));
                if let Some(name) = params.opt_str("name") {
                    entry.insert("name".into(), Value::String(name));
                }
                Ok(RequestSpec::patch(
                    vlan_path(node, id),
                    json!({ "Cisco-IOS-XE-vlan:vlan-list": Value::Object(entry) }),
                ))
            }
            Intent::VlanDelete => Ok(RequestSpec::delete(vlan_path(node, vlan_id(params)?))),
            Intent::VlanAssignPort => {
                let id = vlan_id(params)?;
                let iface = NativeInterface::resolve(node, &params.required_str("interface")?)?;
                let switchport = match params.opt_str("mode").as_deref() {
                    Some("trunk") => json!({
                        "Cisco-IOS-XE-switch:mode": { "trunk": {} },
                        "Cisco-IOS-XE-switch:trunk": {
                            "allowed": { "vlan": { "vlans": id.to_string() } }
                        }
                    }),
                    None | Some("access") => json!({
                        "Cisco-IOS-XE-switch:mode": { "access": {} },
                        "Cisco-IOS-XE-switch:access": { "vlan": { "vlan": id } }
                    }),
                    Some(other) => {
                        return Err(Error::build(format!(
                            "mode must be access or trunk, got {}",
                            other
                        )))
                    }
                };
                Ok(RequestSpec::patch(
                    iface.path.clone(),
                    json!({
                        iface.container(): [{ "name": iface.number, "switchport": switchport }]
                    }),
                ))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

fn vlan_path(node: &str, id: u32) -> String {
    format!("{}/vlan/Cisco-IOS-XE-vlan:vlan-list={}", native(node), id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(intent: Intent, p: Value) -> Result<RequestSpec> {
        CiscoVlanDriver.build(
            &DeviceProfile::new("SW1", Vendor::Cisco),
            intent,
            p.as_object().unwrap(),
        )
    }

    #[test]
    fn test_create_default_name() {
        let spec = build(Intent::VlanCreate, json!({"vlan_id": 20})).unwrap();
        assert!(spec.path.ends_with("vlan/Cisco-IOS-XE-vlan:vlan-list=20"));
        assert_eq!(spec.payload.unwrap()["Cisco-IOS-XE-vlan:vlan-list"]["name"], "VLAN20");
    }

    #[test]
    fn test_assign_trunk() {
        let spec = build(
            Intent::VlanAssignPort,
            json!({"interface": "GigabitEthernet1/0/1", "vlan_id": 30, "mode": "trunk"}),
        )
        .unwrap();
        let entry = &spec.payload.unwrap()["Cisco-IOS-XE-native:GigabitEthernet"][0];
        assert_eq!(
            entry["switchport"]["Cisco-IOS-XE-switch:trunk"]["allowed"]["vlan"]["vlans"],
            "30"
        );
    }

    #[test]
    fn test_vlan_range() {
        assert!(build(Intent::VlanDelete, json!({"vlan_id": 4095})).is_err());
        assert!(build(Intent::VlanDelete, json!({"vlan_id": 0})).is_err());
    }
}
