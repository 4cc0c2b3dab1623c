use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::DRIVER_NAME;
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{mount_base, vlan_id};

const SUPPORTED: &[Intent] = &[
    Intent::VlanCreate,
    Intent::VlanDelete,
    Intent::VlanUpdate,
    Intent::ShowVlans,
];

/// `huawei-vlan` VLAN table. Port membership is not modelled here.
#[derive(Debug, Default)]
pub struct HuaweiVlanDriver;

impl Driver for HuaweiVlanDriver {
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
        let vlans = format!("{}/huawei-vlan:vlan/vlans", mount_base(&device.node_id));

        match intent {
            Intent::ShowVlans => Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}?content=config", vlans),
            )),
            Intent::VlanDelete => Ok(RequestSpec::delete(format!(
                "{}/vlan={}",
                vlans,
                vlan_id(params)?
            ))),
            Intent::VlanCreate | Intent::VlanUpdate => {
                let id = vlan_id(params)?;
                let mut entry = Map::new();
                entry.insert("id".into(), json!(id));
                let name = match intent {
                    Intent::VlanCreate => Some(
                        params
                            .opt_str("name")
                            .unwrap_or_else(|| format!("VLAN{}", id)),
                    ),
                    _ => params.opt_str("name"),
                };
                if let Some(name) = name {
                    entry.insert("name".into(), Value::String(name));
                }
                if let Some(description) = params.opt_str("description") {
                    entry.insert("description".into(), Value::String(description));
                }
                Ok(RequestSpec::patch(
                    format!("{}/vlan={}", vlans, id),
                    json!({ "huawei-vlan:vlan": [Value::Object(entry)] }),
                ))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}
