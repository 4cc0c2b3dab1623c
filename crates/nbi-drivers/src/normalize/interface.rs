//! Interface normalizers: `show.interface`, `show.interfaces`,
//! `show.ip_interface_brief`

use serde_json::Value;

use nbi_core::Vendor;

use super::schema::{InterfaceBrief, InterfaceBriefEntry, InterfaceList, InterfaceStatus};
use super::{at, get, int, list, root, text, NormalizeContext};
use crate::util::netmask_to_prefix;

const CISCO_NATIVE: &str = "Cisco-IOS-XE-native:";

pub fn show_interface(ctx: &NormalizeContext, raw: &Value) -> InterfaceStatus {
    let parsed = match ctx.vendor {
        Vendor::Cisco => cisco_single(raw).or_else(|| ietf_interfaces(raw).into_iter().next()),
        Vendor::Huawei => {
            let entry = root(raw, &["huawei-ifm:interface", "interface"]);
            list(Some(entry)).first().map(|iface| huawei_entry(iface))
        }
        Vendor::OpenConfig => {
            let entry = root(raw, &["openconfig-interfaces:interface", "interface"]);
            list(Some(entry)).first().map(|iface| openconfig_entry(iface))
        }
        Vendor::OpenFlow => None,
    };
    parsed.unwrap_or_else(|| InterfaceStatus::new("unknown", ctx.vendor))
}

pub fn show_interfaces(ctx: &NormalizeContext, raw: &Value) -> InterfaceList {
    let mut interfaces = parse_all(ctx.vendor, raw);
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));

    let up_count = interfaces
        .iter()
        .filter(|i| i.effective_state() == Some("up"))
        .count();
    InterfaceList {
        total_count: interfaces.len(),
        down_count: interfaces.len() - up_count,
        up_count,
        interfaces,
    }
}

pub fn interface_brief(ctx: &NormalizeContext, raw: &Value) -> InterfaceBrief {
    let mut interfaces: Vec<InterfaceBriefEntry> = parse_all(ctx.vendor, raw)
        .into_iter()
        .map(|iface| {
            let status = match (iface.admin.as_deref(), iface.oper.as_deref()) {
                (Some("down"), _) => "admin-down".to_string(),
                (_, Some("up")) => "up".to_string(),
                (_, Some(_)) => "down".to_string(),
                (Some(admin), None) => admin.to_string(),
                (None, None) => "unknown".to_string(),
            };
            InterfaceBriefEntry {
                ip_address: iface.ipv4.first().cloned(),
                protocol: iface.oper.clone().unwrap_or_else(|| "unknown".to_string()),
                method: Some("manual".to_string()),
                interface: iface.name,
                status,
            }
        })
        .collect();
    interfaces.sort_by(|a, b| a.interface.cmp(&b.interface));

    InterfaceBrief {
        device_id: ctx.device_id.clone(),
        vendor: ctx.vendor,
        timestamp: ctx.stamp(),
        interface_count: interfaces.len(),
        interfaces,
    }
}

fn parse_all(vendor: Vendor, raw: &Value) -> Vec<InterfaceStatus> {
    match vendor {
        Vendor::Cisco => {
            if let Some(by_type) = get(raw, &["Cisco-IOS-XE-native:interface"]) {
                cisco_by_type(by_type)
            } else {
                ietf_interfaces(raw)
            }
        }
        Vendor::Huawei => {
            let container = root(raw, &["huawei-ifm:ifm"]);
            let interfaces = root(container, &["huawei-ifm:interfaces", "interfaces"]);
            list(get(interfaces, &["interface"]))
                .into_iter()
                .map(huawei_entry)
                .collect()
        }
        Vendor::OpenConfig => {
            let interfaces = root(raw, &["openconfig-interfaces:interfaces", "interfaces"]);
            list(get(interfaces, &["interface"]))
                .into_iter()
                .map(openconfig_entry)
                .collect()
        }
        Vendor::OpenFlow => Vec::new(),
    }
}

// ============================================================================
// Cisco native
// ============================================================================

fn cisco_single(raw: &Value) -> Option<InterfaceStatus> {
    let obj = raw.as_object()?;
    obj.iter().find_map(|(key, value)| {
        let if_type = key.strip_prefix(CISCO_NATIVE)?;
        list(Some(value)).first().map(|iface| cisco_entry(if_type, iface))
    })
}

/// `{"GigabitEthernet": [..], "Loopback": {..}}` grouped by type
fn cisco_by_type(by_type: &Value) -> Vec<InterfaceStatus> {
    let Some(groups) = by_type.as_object() else {
        return Vec::new();
    };
    groups
        .iter()
        .flat_map(|(if_type, entries)| {
            let if_type = if_type.strip_prefix(CISCO_NATIVE).unwrap_or(if_type);
            list(Some(entries))
                .into_iter()
                .map(move |iface| cisco_entry(if_type, iface))
        })
        .collect()
}

/// Native entries carry only the number as `name`; `shutdown` present means
/// admin down.
pub fn cisco_entry(if_type: &str, iface: &Value) -> InterfaceStatus {
    let number = text(iface, &["name"]).unwrap_or_default();
    let mut out = InterfaceStatus::new(format!("{}{}", if_type, number), Vendor::Cisco);
    out.admin = Some(if iface.get("shutdown").is_some() { "down" } else { "up" }.to_string());
    out.description = text(iface, &["description"]);
    out.mtu = int(iface, &["mtu"]).or_else(|| at(iface, &["ip", "mtu"]).and_then(Value::as_u64));

    if let Some(address) = at(iface, &["ip", "address"]) {
        if let Some(primary) = address.get("primary") {
            out.ipv4.extend(cidr(primary, "address", "mask"));
        }
        for secondary in list(address.get("secondary")) {
            out.ipv4.extend(cidr(secondary, "address", "mask"));
        }
    }
    for entry in list(at(iface, &["ipv6", "address", "prefix-list"])) {
        if let Some(prefix) = text(entry, &["prefix"]) {
            out.ipv6.push(prefix);
        }
    }
    out
}

fn cidr(entry: &Value, ip_key: &str, mask_key: &str) -> Option<String> {
    let ip = text(entry, &[ip_key])?;
    match text(entry, &[mask_key]) {
        Some(mask) => match netmask_to_prefix(&mask) {
            Ok(len) => Some(format!("{}/{}", ip, len)),
            Err(_) => Some(ip),
        },
        None => Some(ip),
    }
}

/// `ietf-interfaces` config or state tree, used as a fallback for Cisco
fn ietf_interfaces(raw: &Value) -> Vec<InterfaceStatus> {
    let container = root(
        raw,
        &[
            "ietf-interfaces:interfaces-state",
            "ietf-interfaces:interfaces",
            "interfaces-state",
            "interfaces",
        ],
    );
    let entries = match get(container, &["interface", "ietf-interfaces:interface"]) {
        Some(entries) => list(Some(entries)),
        None => Vec::new(),
    };
    entries
        .into_iter()
        .map(|iface| {
            let mut out = InterfaceStatus::new(
                text(iface, &["name"]).unwrap_or_else(|| "unknown".to_string()),
                Vendor::Cisco,
            );
            out.admin = text(iface, &["admin-status"]).or_else(|| {
                iface
                    .get("enabled")
                    .and_then(Value::as_bool)
                    .map(|on| if on { "up" } else { "down" }.to_string())
            });
            out.oper = text(iface, &["oper-status"]);
            out.description = text(iface, &["description"]);
            out.mac_address = text(iface, &["phys-address"]);
            out.speed = text(iface, &["speed"]);
            for addr in list(at(iface, &["ietf-ip:ipv4", "address"])) {
                let ip = text(addr, &["ip"]);
                let len = int(addr, &["prefix-length"]);
                if let Some(ip) = ip {
                    out.ipv4.push(match len {
                        Some(len) => format!("{}/{}", ip, len),
                        None => ip,
                    });
                }
            }
            if let Some(stats) = iface.get("statistics") {
                out.in_octets = int(stats, &["in-octets"]);
                out.out_octets = int(stats, &["out-octets"]);
                out.in_errors = int(stats, &["in-errors"]);
                out.out_errors = int(stats, &["out-errors"]);
            }
            out
        })
        .collect()
}

// ============================================================================
// Huawei
// ============================================================================

pub(crate) fn huawei_entry(iface: &Value) -> InterfaceStatus {
    let name = text(iface, &["ifName", "name"]).unwrap_or_else(|| "unknown".to_string());
    let mut out = InterfaceStatus::new(name, Vendor::Huawei);
    out.admin = text(iface, &["ifAdminStatus", "adminStatus", "admin-status"]).map(|s| s.to_lowercase());
    out.oper = text(iface, &["ifOperStatus", "operStatus"])
        .or_else(|| iface.get("ifDynamicInfo").and_then(|d| text(d, &["ifOperStatus"])))
        .or_else(|| iface.get("dynamic").and_then(|d| text(d, &["operational-status"])))
        .map(|s| s.to_lowercase());
    out.description = text(iface, &["ifDescr", "description", "descr"]);
    out.mtu = int(iface, &["ifMtu", "mtu"]);
    out.mac_address = text(iface, &["ifMac", "macAddress"]);
    out.speed = text(iface, &["ifSpeed"]);

    let ipv4 = root(iface, &["huawei-ip:ipv4Config", "ipv4Config"]);
    for addr in list(at(ipv4, &["am4CfgAddrs", "am4CfgAddr"])) {
        out.ipv4.extend(cidr(addr, "ifIpAddr", "subnetMask"));
    }
    for addr in list(at(iface, &["ipv4", "addresses", "address"])) {
        out.ipv4.extend(cidr(addr, "ip", "mask"));
    }

    let ipv6 = root(iface, &["huawei-ip:ipv6Config", "ipv6Config"]);
    for addr in list(at(ipv6, &["am6CfgAddrs", "am6CfgAddr"])) {
        if let Some(ip) = text(addr, &["ifIp6Addr"]) {
            out.ipv6.push(ip);
        }
    }

    if let Some(stats) = get(iface, &["ifStatistics", "statistics"]) {
        out.in_octets = int(stats, &["receiveByte", "inOctets"]);
        out.out_octets = int(stats, &["sendByte", "outOctets"]);
        out.in_errors = int(stats, &["rcvErrorPacket", "inErrors"]);
        out.out_errors = int(stats, &["sendErrorPacket", "outErrors"]);
    }
    out
}

// ============================================================================
// OpenConfig
// ============================================================================

pub(crate) fn openconfig_entry(iface: &Value) -> InterfaceStatus {
    let name = text(iface, &["name"]).unwrap_or_else(|| "unknown".to_string());
    let mut out = InterfaceStatus::new(name, Vendor::OpenConfig);
    let state = iface.get("state").or_else(|| iface.get("config"));

    if let Some(state) = state {
        out.admin = text(state, &["admin-status"])
            .map(|s| s.to_lowercase())
            .or_else(|| {
                state
                    .get("enabled")
                    .and_then(Value::as_bool)
                    .map(|on| if on { "up" } else { "down" }.to_string())
            });
        out.oper = text(state, &["oper-status"]).map(|s| s.to_lowercase());
        out.description = text(state, &["description"]);
        out.mtu = int(state, &["mtu"]);
        if let Some(counters) = state.get("counters") {
            out.in_octets = int(counters, &["in-octets"]);
            out.out_octets = int(counters, &["out-octets"]);
            out.in_errors = int(counters, &["in-errors"]);
            out.out_errors = int(counters, &["out-errors"]);
        }
    }
    out.mac_address = at(iface, &["openconfig-if-ethernet:ethernet", "state"])
        .and_then(|eth| text(eth, &["mac-address"]));

    for sub in list(at(iface, &["subinterfaces", "subinterface"])) {
        for (family, target) in [
            ("openconfig-if-ip:ipv4", &mut out.ipv4),
            ("openconfig-if-ip:ipv6", &mut out.ipv6),
        ] {
            for addr in list(at(sub, &[family, "addresses", "address"])) {
                let leaf = addr.get("state").or_else(|| addr.get("config")).unwrap_or(addr);
                if let Some(ip) = text(leaf, &["ip"]).or_else(|| text(addr, &["ip"])) {
                    target.push(match int(leaf, &["prefix-length"]) {
                        Some(len) => format!("{}/{}", ip, len),
                        None => ip,
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn ctx(vendor: Vendor) -> NormalizeContext {
        NormalizeContext::new("r1", vendor, Utc::now())
    }

    #[test]
    fn test_cisco_single_object_quirk() {
        let raw = json!({
            "Cisco-IOS-XE-native:GigabitEthernet": {
                "name": "2",
                "shutdown": [null],
                "ip": {"address": {"primary": {"address": "10.0.0.1", "mask": "255.255.255.0"}}}
            }
        });
        let iface = show_interface(&ctx(Vendor::Cisco), &raw);
        assert_eq!(iface.name, "GigabitEthernet2");
        assert_eq!(iface.admin.as_deref(), Some("down"));
        assert_eq!(iface.ipv4, vec!["10.0.0.1/24"]);
    }

    #[test]
    fn test_cisco_list_counts() {
        let raw = json!({
            "Cisco-IOS-XE-native:interface": {
                "GigabitEthernet": [{"name": "1"}, {"name": "2", "shutdown": [null]}],
                "Loopback": {"name": 0, "description": "mgmt"}
            }
        });
        let out = show_interfaces(&ctx(Vendor::Cisco), &raw);
        assert_eq!(out.total_count, 3);
        assert_eq!(out.up_count, 2);
        assert_eq!(out.down_count, 1);
        assert_eq!(out.interfaces[0].name, "GigabitEthernet1");
        assert_eq!(out.interfaces[2].description.as_deref(), Some("mgmt"));
    }

    #[test]
    fn test_huawei_list_and_brief() {
        let raw = json!({
            "huawei-ifm:interfaces": {
                "interface": [{
                    "ifName": "GigabitEthernet0/0/1",
                    "ifAdminStatus": "up",
                    "ifDynamicInfo": {"ifOperStatus": "down"},
                    "ipv4Config": {"am4CfgAddrs": {"am4CfgAddr": {"ifIpAddr": "192.168.1.1", "subnetMask": "255.255.255.0"}}}
                }]
            }
        });
        let brief = interface_brief(&ctx(Vendor::Huawei), &raw);
        assert_eq!(brief.interface_count, 1);
        let entry = &brief.interfaces[0];
        assert_eq!(entry.ip_address.as_deref(), Some("192.168.1.1/24"));
        assert_eq!(entry.status, "down");
        assert_eq!(entry.protocol, "down");
    }

    #[test]
    fn test_openconfig_state() {
        let raw = json!({
            "openconfig-interfaces:interface": [{
                "name": "Ethernet1",
                "state": {"admin-status": "UP", "oper-status": "UP", "mtu": 1500,
                          "counters": {"in-octets": "1024"}},
                "subinterfaces": {"subinterface": [{
                    "index": 0,
                    "openconfig-if-ip:ipv4": {"addresses": {"address": [
                        {"ip": "10.1.1.1", "state": {"ip": "10.1.1.1", "prefix-length": 30}}
                    ]}}
                }]}
            }]
        });
        let iface = show_interface(&ctx(Vendor::OpenConfig), &raw);
        assert_eq!(iface.oper.as_deref(), Some("up"));
        assert_eq!(iface.in_octets, Some(1024));
        assert_eq!(iface.ipv4, vec!["10.1.1.1/30"]);
    }

    #[test]
    fn test_missing_nodes_never_fail() {
        let iface = show_interface(&ctx(Vendor::Huawei), &json!({}));
        assert_eq!(iface.vendor, Vendor::Huawei);
        let list = show_interfaces(&ctx(Vendor::OpenConfig), &json!({"unexpected": 1}));
        assert_eq!(list.total_count, 0);
    }
}
