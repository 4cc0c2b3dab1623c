use serde_json::json;

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::DRIVER_NAME;
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::mount_base;

const SUPPORTED: &[Intent] = &[
    Intent::SystemSetHostname,
    Intent::SystemSaveConfig,
    Intent::ShowVersion,
    Intent::ShowRunningConfig,
];

#[derive(Debug, Default)]
pub struct HuaweiSystemDriver;

impl Driver for HuaweiSystemDriver {
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
            Intent::SystemSetHostname => Ok(RequestSpec::patch(
                format!("{}/huawei-system:system", mount),
                json!({
                    "huawei-system:system": {
                        "systemInfo": { "sysName": params.required_str("hostname")? }
                    }
                }),
            )),
            // running -> startup through the standard NETCONF RPC
            Intent::SystemSaveConfig => Ok(RequestSpec::rpc(
                format!("{}/ietf-netconf:copy-config", mount),
                json!({
                    "input": {
                        "target": { "startup": [null] },
                        "source": { "running": [null] }
                    }
                }),
            )),
            Intent::ShowVersion => Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}/huawei-system:system?content=config", mount),
            )),
            Intent::ShowRunningConfig => {
                let module = match params.opt_str("section").as_deref() {
                    Some("interfaces") | Some("interface") => "huawei-ifm:ifm",
                    Some("routing") | Some("route") => "huawei-staticrt:staticrt",
                    Some("ospf") => "huawei-ospfv2:ospfv2",
                    _ => "huawei-system:system",
                };
                Ok(RequestSpec::get(
                    Datastore::Config,
                    format!("{}/{}", mount, module),
                ))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::HttpMethod;
    use serde_json::Value;

    #[test]
    fn test_save_uses_copy_config() {
        let spec = HuaweiSystemDriver
            .build(
                &DeviceProfile::new("NE40", Vendor::Huawei),
                Intent::SystemSaveConfig,
                &Params::new(),
            )
            .unwrap();
        assert_eq!(spec.method, HttpMethod::Post);
        assert_eq!(spec.datastore, Datastore::Operations);
        assert_eq!(spec.payload.unwrap()["input"]["target"]["startup"], json!([Value::Null]));
    }

    #[test]
    fn test_hostname() {
        let params = json!({"hostname": "core-1"});
        let spec = HuaweiSystemDriver
            .build(
                &DeviceProfile::new("NE40", Vendor::Huawei),
                Intent::SystemSetHostname,
                params.as_object().unwrap(),
            )
            .unwrap();
        assert_eq!(
            spec.payload.unwrap()["huawei-system:system"]["systemInfo"]["sysName"],
            "core-1"
        );
    }
}
