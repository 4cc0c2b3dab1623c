use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::{interface_path, network_instance, DRIVER_NAME};
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
pub struct OpenConfigVlanDriver;

impl Driver for OpenConfigVlanDriver {
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
        let vlans = format!("{}/vlans", network_instance(node, "default"));

        match intent {
            Intent::ShowVlans => Ok(RequestSpec::get(Datastore::Config, vlans)),
            Intent::VlanCreate => {
                let id = vlan_id(params)?;
                let name = params
                    .opt_str("name")
                    .unwrap_or_else(|| format!("VLAN{}", id));
                Ok(RequestSpec::put(
                    format!("{}/vlan={}", vlans, id),
                    json!({
                        "openconfig-network-instance:vlan": [{
                            "vlan-id": id,
                            "config": { "vlan-id": id, "name": name, "status": "ACTIVE" }
                        }]
                    }),
                ))
            }
            Intent::VlanUpdate => {
                let id = vlan_id(params)?;
                let mut config = Map::new();
                config.insert("vlan-id".into(), json!(id));
                if let Some(name) = params.opt_str("name") {
                    config.insert("name".into(), Value::String(name));
                }
                Ok(RequestSpec::patch(
                    format!("{}/vlan={}/config", vlans, id),
                    json!({ "openconfig-network-instance:config": Value::Object(config) }),
                ))
            }
            Intent::VlanDelete => Ok(RequestSpec::delete(format!(
                "{}/vlan={}",
                vlans,
                vlan_id(params)?
            ))),
            Intent::VlanAssignPort => {
                let id = vlan_id(params)?;
                let name = params.required_str("interface")?;
                let config = match params.opt_str("mode").as_deref() {
                    Some("trunk") => json!({ "interface-mode": "TRUNK", "trunk-vlans": [id] }),
                    None | Some("access") => json!({ "interface-mode": "ACCESS", "access-vlan": id }),
                    Some(other) => {
                        return Err(Error::build(format!(
                            "mode must be access or trunk, got {}",
                            other
                        )))
                    }
                };
                Ok(RequestSpec::put(
                    format!(
                        "{}/openconfig-if-ethernet:ethernet/openconfig-vlan:switched-vlan/config",
                        interface_path(node, &name)
                    ),
                    json!({ "openconfig-vlan:config": config }),
                ))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}
