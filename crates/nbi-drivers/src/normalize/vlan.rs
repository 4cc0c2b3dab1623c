//! VLAN and DHCP pool normalizers

use serde_json::Value;

use nbi_core::Vendor;

use super::schema::{DhcpPool, DhcpPoolList, Vlan, VlanList};
use super::{at, get, int, list, root, strip_module, text, NormalizeContext};

pub fn vlans(ctx: &NormalizeContext, raw: &Value) -> VlanList {
    let entries = match ctx.vendor {
        Vendor::Cisco => {
            let container = root(raw, &["Cisco-IOS-XE-native:vlan", "vlan"]);
            list(get(container, &["Cisco-IOS-XE-vlan:vlan-list", "vlan-list"]))
        }
        Vendor::Huawei => {
            let container = root(raw, &["huawei-vlan:vlans", "vlans"]);
            list(get(container, &["vlan", "huawei-vlan:vlan"]))
        }
        Vendor::OpenConfig | Vendor::OpenFlow => {
            let container = root(raw, &["openconfig-vlan:vlans", "vlans"]);
            list(get(container, &["vlan", "openconfig-vlan:vlan"]))
        }
    };

    let mut vlans: Vec<Vlan> = entries.into_iter().filter_map(vlan_entry).collect();
    vlans.sort_by_key(|v| v.vlan_id);

    VlanList {
        total_count: vlans.len(),
        vlans,
    }
}

fn vlan_entry(entry: &Value) -> Option<Vlan> {
    let config = entry.get("config").unwrap_or(entry);
    let vlan_id = int(entry, &["id", "vlan-id", "vlanId"])
        .or_else(|| int(config, &["vlan-id"]))?;

    let status = text(config, &["status", "adminStatus", "admin-status"])
        .map(|s| strip_module(&s).to_ascii_lowercase())
        .map(|s| match s.as_str() {
            "suspended" | "down" | "suspend" => "suspended".to_string(),
            _ => "active".to_string(),
        })
        .unwrap_or_else(|| "active".to_string());

    let ports = list(at(entry, &["members", "member"]))
        .into_iter()
        .filter_map(|m| text(m, &["interface", "ifName"]))
        .collect();

    Some(Vlan {
        vlan_id: u32::try_from(vlan_id).ok()?,
        name: text(config, &["name"]),
        status,
        ports,
    })
}

/// Huawei `global-pools`; the only vendor with a DHCP pool driver
pub fn dhcp_pools(_ctx: &NormalizeContext, raw: &Value) -> DhcpPoolList {
    let container = root(raw, &["huawei-ip-pool:global-pools", "global-pools"]);
    let entries = list(get(container, &["global-pool", "huawei-ip-pool:global-pool"]));

    let pools: Vec<DhcpPool> = entries
        .into_iter()
        .filter_map(|entry| {
            let pool_name = text(entry, &["pool-name"])?;
            let gateway = entry.get("gateway");
            let section = list(get(entry, &["section", "sections"]))
                .into_iter()
                .next();
            let dns_servers = list(at(entry, &["dns-list", "dns"]))
                .into_iter()
                .filter_map(|d| text(d, &["ip-address"]))
                .collect();
            Some(DhcpPool {
                pool_name,
                gateway: gateway.and_then(|g| text(g, &["ip-address"])),
                subnet_mask: gateway.and_then(|g| text(g, &["mask"])),
                start_ip: section.and_then(|s| text(s, &["start-ip-address", "start-ip"])),
                end_ip: section.and_then(|s| text(s, &["end-ip-address", "end-ip"])),
                dns_servers,
                lease_days: entry.get("lease").and_then(|l| int(l, &["day"])),
                status: "active".to_string(),
            })
        })
        .collect();

    DhcpPoolList {
        total_count: pools.len(),
        pools,
    }
}
