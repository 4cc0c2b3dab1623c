use serde_json::json;

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::DRIVER_NAME;
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{encode_key, mount_base};

const SUPPORTED: &[Intent] = &[
    Intent::ShowRunningConfig,
    Intent::ShowVersion,
    Intent::SystemSetHostname,
    Intent::SystemSetNtp,
    Intent::SystemSetDns,
];

#[derive(Debug, Default)]
pub struct OpenConfigSystemDriver;

impl Driver for OpenConfigSystemDriver {
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
        let mount = mount_base(&device.node_id);
        let system = format!("{}/openconfig-system:system", mount);

        match intent {
            Intent::ShowRunningConfig => {
                let path = match params.opt_str("section").as_deref() {
                    Some("interfaces") | Some("interface") => {
                        format!("{}/openconfig-interfaces:interfaces", mount)
                    }
                    Some("system") => system,
                    Some("routing") | Some("route") => {
                        format!("{}/openconfig-network-instance:network-instances", mount)
                    }
                    _ => mount,
                };
                Ok(RequestSpec::get(Datastore::Config, path))
            }
            Intent::ShowVersion => Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}/state", system),
            )),
            Intent::SystemSetHostname => Ok(RequestSpec::patch(
                format!("{}/config", system),
                json!({ "openconfig-system:config": { "hostname": params.required_str("hostname")? } }),
            )),
            Intent::SystemSetNtp => {
                let server = params.required_str("server")?;
                let prefer = params.opt_bool("prefer").unwrap_or(false);
                Ok(RequestSpec::put(
                    format!("{}/ntp/servers/server={}", system, encode_key(&server)),
                    json!({
                        "openconfig-system:server": [{
                            "address": server,
                            "config": { "address": server, "prefer": prefer }
                        }]
                    }),
                ))
            }
            Intent::SystemSetDns => {
                let server = params.required_str("server")?;
                if let Some(domain) = params.opt_str("domain") {
                    return Ok(RequestSpec::patch(
                        format!("{}/dns", system),
                        json!({
                            "openconfig-system:dns": {
                                "config": { "search": [domain] },
                                "servers": {
                                    "server": [{ "address": server, "config": { "address": server } }]
                                }
                            }
                        }),
                    ));
                }
                Ok(RequestSpec::put(
                    format!("{}/dns/servers/server={}", system, encode_key(&server)),
                    json!({
                        "openconfig-system:server": [{
                            "address": server,
                            "config": { "address": server }
                        }]
                    }),
                ))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}
