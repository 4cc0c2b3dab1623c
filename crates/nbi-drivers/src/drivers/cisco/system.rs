use serde_json::json;

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::{native, DRIVER_NAME};
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
    Intent::SystemSetBanner,
    Intent::SystemSaveConfig,
];

const BANNER_TYPES: &[&str] = &["motd", "login", "exec"];

#[derive(Debug, Default)]
pub struct CiscoSystemDriver;

impl Driver for CiscoSystemDriver {
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
        let root = native(&device.node_id);

        match intent {
            Intent::ShowRunningConfig => {
                let path = match params.opt_str("section").as_deref() {
                    Some("interfaces") | Some("interface") => format!("{}/interface", root),
                    Some("routing") | Some("route") => format!("{}/ip/route", root),
                    Some("hostname") => format!("{}/hostname", root),
                    _ => root,
                };
                Ok(RequestSpec::get(Datastore::Config, path))
            }
            Intent::ShowVersion => Ok(RequestSpec::get(
                Datastore::Config,
                format!("{}/version", root),
            )),
            Intent::SystemSetHostname => Ok(RequestSpec::put(
                format!("{}/hostname", root),
                json!({ "Cisco-IOS-XE-native:hostname": params.required_str("hostname")? }),
            )),
            Intent::SystemSetNtp => {
                let server = params.required_str("server")?;
                let mut entry = json!({ "ip-address": server });
                if params.opt_bool("prefer").unwrap_or(false) {
                    entry["prefer"] = json!([null]);
                }
                Ok(RequestSpec::put(
                    format!(
                        "{}/ntp/Cisco-IOS-XE-ntp:server/server-list={}",
                        root,
                        encode_key(&server)
                    ),
                    json!({ "Cisco-IOS-XE-ntp:server-list": [entry] }),
                ))
            }
            Intent::SystemSetDns => {
                let servers = params.str_list("server");
                if servers.is_empty() {
                    return Err(Error::build("params require server"));
                }
                match params.opt_str("domain") {
                    // domain sits beside name-server, so merge at the ip container
                    Some(domain) => Ok(RequestSpec::patch(
                        format!("{}/ip", root),
                        json!({
                            "Cisco-IOS-XE-native:ip": {
                                "name-server": { "no-vrf": servers },
                                "domain": { "name": domain }
                            }
                        }),
                    )),
                    None => Ok(RequestSpec::patch(
                        format!("{}/ip/name-server", root),
                        json!({ "Cisco-IOS-XE-native:name-server": { "no-vrf": servers } }),
                    )),
                }
            }
            Intent::SystemSetBanner => {
                let banner = params.required_str("banner")?;
                let kind = params
                    .opt_str("banner_type")
                    .unwrap_or_else(|| "motd".to_string())
                    .to_ascii_lowercase();
                if !BANNER_TYPES.contains(&kind.as_str()) {
                    return Err(Error::build(format!(
                        "banner_type must be one of {}",
                        BANNER_TYPES.join(", ")
                    )));
                }
                Ok(RequestSpec::patch(
                    format!("{}/banner/{}", root, kind),
                    json!({ format!("Cisco-IOS-XE-native:{}", kind): { "banner": banner } }),
                ))
            }
            Intent::SystemSaveConfig => Ok(RequestSpec::rpc(
                format!("{}/cisco-ia:save-config", mount_base(&device.node_id)),
                json!({ "cisco-ia:input": {} }),
            )),
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbi_core::HttpMethod;
    use serde_json::Value;

    fn build(intent: Intent, p: Value) -> Result<RequestSpec> {
        CiscoSystemDriver.build(
            &DeviceProfile::new("CSR1", Vendor::Cisco),
            intent,
            p.as_object().unwrap(),
        )
    }

    #[test]
    fn test_save_config_is_rpc() {
        let spec = build(Intent::SystemSaveConfig, json!({})).unwrap();
        assert_eq!(spec.method, HttpMethod::Post);
        assert_eq!(spec.datastore, Datastore::Operations);
        assert!(spec.path.ends_with("yang-ext:mount/cisco-ia:save-config"));
    }

    #[test]
    fn test_running_config_sections() {
        let spec = build(Intent::ShowRunningConfig, json!({"section": "routing"})).unwrap();
        assert!(spec.path.ends_with("native/ip/route"));
        let spec = build(Intent::ShowRunningConfig, json!({})).unwrap();
        assert!(spec.path.ends_with("Cisco-IOS-XE-native:native"));
    }

    #[test]
    fn test_banner_type() {
        let spec = build(Intent::SystemSetBanner, json!({"banner": "hi", "banner_type": "login"})).unwrap();
        assert!(spec.path.ends_with("banner/login"));
        assert_eq!(spec.payload.unwrap()["Cisco-IOS-XE-native:login"]["banner"], "hi");
        assert!(build(Intent::SystemSetBanner, json!({"banner": "hi", "banner_type": "x"})).is_err());
    }

    #[test]
    fn test_dns_servers() {
        let spec = build(Intent::SystemSetDns, json!({"server": ["8.8.8.8", "1.1.1.1"]})).unwrap();
        assert_eq!(
            spec.payload.unwrap()["Cisco-IOS-XE-native:name-server"]["no-vrf"],
            json!(["8.8.8.8", "1.1.1.1"])
        );
    }
}
