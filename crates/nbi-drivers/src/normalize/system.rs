//! Version and running-config normalizers

use serde_json::Value;

use nbi_core::Vendor;

use super::schema::{RunningConfig, SystemInfo};
use super::{at, get, root, text, NormalizeContext};

pub fn show_version(ctx: &NormalizeContext, raw: &Value) -> SystemInfo {
    let mut info = SystemInfo {
        hostname: String::new(),
        vendor: ctx.vendor,
        model: None,
        serial_number: None,
        software_version: None,
        uptime: None,
    };

    match ctx.vendor {
        Vendor::Cisco => {
            let native = root(raw, &["Cisco-IOS-XE-native:native", "native"]);
            info.hostname = text(native, &["hostname", "Cisco-IOS-XE-native:hostname"]).unwrap_or_default();
            info.software_version = text(native, &["version", "Cisco-IOS-XE-native:version"]);
            if let Some(udi) = at(native, &["license", "udi"]) {
                info.model = text(udi, &["pid"]);
                info.serial_number = text(udi, &["sn"]);
            }
        }
        Vendor::Huawei => {
            let system = root(raw, &["huawei-system:system", "system"]);
            let base = get(system, &["systemInfo", "system-info"]).unwrap_or(system);
            info.hostname = text(base, &["hostName", "sysName", "host-name"]).unwrap_or_default();
            info.model = text(base, &["productName", "product-name"]);
            info.serial_number = text(base, &["esn"]);
            info.software_version = text(base, &["vrpVersion", "softwareVersion", "software-version"]);
            info.uptime = text(base, &["upTime", "sysUpTime", "up-time"]);
        }
        Vendor::OpenConfig | Vendor::OpenFlow => {
            let state = root(raw, &["openconfig-system:state", "state"]);
            info.hostname = text(state, &["hostname"]).unwrap_or_default();
            info.software_version = text(state, &["software-version"]);
            info.uptime = text(state, &["boot-time", "up-time"]);
            info.model = text(state, &["hardware", "model"]);
        }
    }

    if info.hostname.is_empty() {
        info.hostname = ctx.device_id.clone();
    }
    info
}

pub fn running_config(ctx: &NormalizeContext, raw: &Value) -> RunningConfig {
    let config_text = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
    RunningConfig {
        vendor: ctx.vendor,
        config_text,
    }
}
