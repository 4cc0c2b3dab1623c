//! Routing table and OSPF normalizers

use std::collections::HashMap;

use serde_json::Value;

use nbi_core::Vendor;

use super::schema::{OspfDatabase, OspfLsa, OspfNeighbor, OspfNeighbors, Route, RoutingTable};
use super::{at, find_objects, get, int, list, strip_module, text, NormalizeContext};
use crate::util::netmask_to_prefix;

pub fn routing_table(ctx: &NormalizeContext, raw: &Value) -> RoutingTable {
    let parsed = match ctx.vendor {
        Vendor::Cisco => ietf_routes(raw).or_else(|| cisco_native_routes(raw)),
        Vendor::Huawei => huawei_static_routes(raw),
        Vendor::OpenConfig => openconfig_aft(raw),
        Vendor::OpenFlow => None,
    };
    let routes = parsed.unwrap_or_else(|| generic_routes(raw));

    RoutingTable {
        device_id: ctx.device_id.clone(),
        vendor: ctx.vendor,
        timestamp: ctx.stamp(),
        route_count: routes.len(),
        routes,
    }
}

/// Collapse `ietf-routing:static`, `openconfig-policy-types:DIRECTLY_CONNECTED`
/// and friends to a short protocol name
pub fn protocol_name(raw: &str) -> String {
    let lower = strip_module(raw).to_ascii_lowercase();
    for (needle, name) in [
        ("static", "static"),
        ("connected", "connected"),
        ("direct", "connected"),
        ("ospf", "ospf"),
        ("bgp", "bgp"),
        ("local", "local"),
    ] {
        if lower.contains(needle) {
            return name.to_string();
        }
    }
    lower
}

// ----------------------------------------------------------------------------
// IETF routing-state (Cisco oper)
// ----------------------------------------------------------------------------

fn ietf_routes(raw: &Value) -> Option<Vec<Route>> {
    let state = get(raw, &["ietf-routing:routing-state", "routing-state"]);
    let instances = match state {
        Some(state) => list(get(state, &["routing-instance"])),
        None => list(Some(get(raw, &["ietf-routing:routing-instance"])?)),
    };

    let mut routes = Vec::new();
    for instance in instances {
        let vrf = text(instance, &["name"]);
        for rib in list(at(instance, &["ribs", "rib"])) {
            for route in list(at(rib, &["routes", "route"])) {
                let Some(prefix) = text(route, &["destination-prefix"]) else {
                    continue;
                };
                let next_hop = route.get("next-hop");
                let address = next_hop.and_then(|nh| {
                    text(nh, &["next-hop-address"]).or_else(|| {
                        list(at(nh, &["next-hop-list", "next-hop"]))
                            .first()
                            .and_then(|first| text(first, &["address", "next-hop-address"]))
                    })
                });
                let interface = next_hop
                    .and_then(|nh| text(nh, &["outgoing-interface"]))
                    .or_else(|| text(route, &["outgoing-interface"]));
                let active = match route.get("active") {
                    Some(Value::Bool(b)) => *b,
                    _ => true,
                };
                routes.push(Route {
                    prefix,
                    next_hop: address,
                    interface,
                    protocol: protocol_name(&text(route, &["source-protocol"]).unwrap_or_default()),
                    metric: int(route, &["metric"]),
                    preference: int(route, &["route-preference", "preference"]),
                    vrf: vrf.clone(),
                    active,
                });
            }
        }
    }
    Some(routes)
}

fn cisco_native_routes(raw: &Value) -> Option<Vec<Route>> {
    let container = get(raw, &["Cisco-IOS-XE-native:route", "route"])
        .or_else(|| at(raw, &["Cisco-IOS-XE-native:ip", "route"]))?;

    let mut routes = Vec::new();
    for entry in list(container.get("ip-route-interface-forwarding-list")) {
        let net = text(entry, &["prefix"]).unwrap_or_else(|| "0.0.0.0".to_string());
        let len = text(entry, &["mask"])
            .and_then(|mask| netmask_to_prefix(&mask).ok())
            .unwrap_or(0);
        for fwd in list(entry.get("fwd-list")) {
            let hop = text(fwd, &["fwd"]);
            let (next_hop, interface) = match hop {
                Some(h) if h.parse::<std::net::Ipv4Addr>().is_ok() => (Some(h), None),
                other => (None, other),
            };
            routes.push(Route {
                prefix: format!("{}/{}", net, len),
                next_hop,
                interface,
                protocol: "static".to_string(),
                metric: int(fwd, &["metric"]),
                preference: int(fwd, &["metric"]),
                vrf: None,
                active: true,
            });
        }
    }
    Some(routes)
}

// ----------------------------------------------------------------------------
// Huawei staticrt
// ----------------------------------------------------------------------------

fn huawei_static_routes(raw: &Value) -> Option<Vec<Route>> {
    let staticrt = get(raw, &["huawei-staticrt:staticrt", "staticrt"])?;
    let entries = list(at(staticrt, &["staticrtbase", "srRoutes", "srRoute"]));

    Some(
        entries
            .into_iter()
            .filter_map(|entry| {
                let prefix = text(entry, &["prefix"])?;
                let len = int(entry, &["maskLength"]).unwrap_or(32);
                Some(Route {
                    prefix: format!("{}/{}", prefix, len),
                    next_hop: text(entry, &["nexthop"]).filter(|nh| nh != "0.0.0.0"),
                    interface: text(entry, &["ifName"]),
                    protocol: "static".to_string(),
                    metric: int(entry, &["cost"]),
                    preference: int(entry, &["preference"]),
                    vrf: text(entry, &["vrfName"]),
                    active: true,
                })
            })
            .collect(),
    )
}

// ----------------------------------------------------------------------------
// OpenConfig AFT
// ----------------------------------------------------------------------------

fn openconfig_aft(raw: &Value) -> Option<Vec<Route>> {
    let afts = get(raw, &["openconfig-network-instance:afts", "afts"])?;

    // next-hop index -> address, next-hop-group id -> first next-hop index
    let mut hops: HashMap<String, (Option<String>, Option<String>)> = HashMap::new();
    for nh in list(at(afts, &["next-hops", "next-hop"])) {
        let Some(index) = text(nh, &["index"]) else {
            continue;
        };
        let state = nh.get("state").unwrap_or(nh);
        let iface = at(nh, &["interface-ref", "state"]).and_then(|r| text(r, &["interface"]));
        hops.insert(index, (text(state, &["ip-address"]), iface));
    }
    let mut groups: HashMap<String, String> = HashMap::new();
    for group in list(at(afts, &["next-hop-groups", "next-hop-group"])) {
        let id = text(group, &["id"]);
        let first = list(at(group, &["next-hops", "next-hop"]))
            .first()
            .and_then(|nh| text(nh, &["index"]));
        if let (Some(id), Some(first)) = (id, first) {
            groups.insert(id, first);
        }
    }

    let entries = list(at(afts, &["ipv4-unicast", "ipv4-entry"]));
    Some(
        entries
            .into_iter()
            .filter_map(|entry| {
                let state = entry.get("state").unwrap_or(entry);
                let prefix = text(entry, &["prefix"]).or_else(|| text(state, &["prefix"]))?;
                let hop = text(state, &["next-hop-group"])
                    .and_then(|g| groups.get(&g))
                    .and_then(|index| hops.get(index));
                Some(Route {
                    prefix,
                    next_hop: hop.and_then(|(ip, _)| ip.clone()),
                    interface: hop.and_then(|(_, iface)| iface.clone()),
                    protocol: protocol_name(&text(state, &["origin-protocol"]).unwrap_or_default()),
                    metric: int(state, &["metric"]),
                    preference: None,
                    vrf: None,
                    active: true,
                })
            })
            .collect(),
    )
}

// ----------------------------------------------------------------------------
// Structural fallback
// ----------------------------------------------------------------------------

fn generic_routes(raw: &Value) -> Vec<Route> {
    let is_route = |o: &Value| {
        get(o, &["destination-prefix", "prefix", "dest"]).is_some()
            && get(o, &["next-hop", "nexthop", "protocol", "interface"]).is_some()
    };
    find_objects(raw, &is_route)
        .into_iter()
        .map(|o| Route {
            prefix: text(o, &["destination-prefix", "prefix", "dest"]).unwrap_or_default(),
            next_hop: text(o, &["next-hop", "nexthop"]),
            interface: text(o, &["interface"]),
            protocol: text(o, &["protocol"])
                .map(|p| protocol_name(&p))
                .unwrap_or_else(|| "unknown".to_string()),
            metric: int(o, &["metric"]),
            preference: int(o, &["preference"]),
            vrf: None,
            active: true,
        })
        .collect()
}

// ============================================================================
// OSPF
// ============================================================================

pub fn ospf_neighbors(ctx: &NormalizeContext, raw: &Value) -> OspfNeighbors {
    let mut neighbors = match ctx.vendor {
        Vendor::Cisco => cisco_neighbors(raw),
        Vendor::OpenConfig => openconfig_neighbors(raw),
        _ => Vec::new(),
    };
    if neighbors.is_empty() {
        neighbors = generic_neighbors(raw);
    }

    OspfNeighbors {
        device_id: ctx.device_id.clone(),
        vendor: ctx.vendor,
        timestamp: ctx.stamp(),
        neighbor_count: neighbors.len(),
        neighbors,
    }
}

/// `ospf-area[] / ospf-interface[] / ospf-neighbor[]` wherever it sits in the
/// oper tree
fn cisco_neighbors(raw: &Value) -> Vec<OspfNeighbor> {
    let areas = find_objects(raw, &|o: &Value| o.get("ospf-interface").is_some());
    let mut out = Vec::new();
    for area in areas {
        let area_id = text(area, &["area-id"]);
        for iface in list(area.get("ospf-interface")) {
            let if_name = text(iface, &["name"]);
            for nbr in list(iface.get("ospf-neighbor")) {
                out.push(OspfNeighbor {
                    neighbor_id: text(nbr, &["neighbor-id"]).unwrap_or_default(),
                    neighbor_address: text(nbr, &["address"]),
                    state: text(nbr, &["state"])
                        .map(|s| adjacency_name(&s))
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                    interface: if_name.clone(),
                    area: area_id.clone(),
                    priority: int(nbr, &["priority"]),
                    dr: text(nbr, &["dr"]),
                    bdr: text(nbr, &["bdr"]),
                });
            }
        }
    }
    out
}

fn openconfig_neighbors(raw: &Value) -> Vec<OspfNeighbor> {
    let mut out = Vec::new();
    let areas = find_objects(raw, &|o: &Value| {
        o.get("identifier").is_some() && o.get("interfaces").is_some()
    });
    for area in areas {
        let area_id = text(area, &["identifier"]);
        for iface in list(at(area, &["interfaces", "interface"])) {
            let if_name = text(iface, &["id"]);
            for nbr in list(at(iface, &["neighbors", "neighbor"])) {
                let state = nbr.get("state").unwrap_or(nbr);
                out.push(OspfNeighbor {
                    neighbor_id: text(nbr, &["router-id"])
                        .or_else(|| text(state, &["router-id"]))
                        .unwrap_or_default(),
                    neighbor_address: text(state, &["neighbor-address", "address"]),
                    state: text(state, &["adjacency-state"])
                        .map(|s| adjacency_name(&s))
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                    interface: if_name.clone(),
                    area: area_id.clone(),
                    priority: int(state, &["priority"]),
                    dr: text(state, &["designated-router"]),
                    bdr: text(state, &["backup-designated-router"]),
                });
            }
        }
    }
    out
}

fn generic_neighbors(raw: &Value) -> Vec<OspfNeighbor> {
    let ids = ["neighbor-id", "neighbor-router-id", "nbrRouterId"];
    find_objects(raw, &|o: &Value| get(o, &ids).is_some())
        .into_iter()
        .map(|o| OspfNeighbor {
            neighbor_id: text(o, &ids).unwrap_or_default(),
            neighbor_address: text(o, &["address", "neighbor-address", "nbrIpAddr"]),
            state: text(o, &["state", "adjacency-state", "nbrState"])
                .map(|s| adjacency_name(&s))
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            interface: text(o, &["interface", "ifName"]),
            area: text(o, &["area", "area-id", "areaId"]),
            priority: int(o, &["priority"]),
            dr: text(o, &["dr"]),
            bdr: text(o, &["bdr"]),
        })
        .collect()
}

/// `ospf-nbr-full`, `openconfig-ospf-types:FULL`, `Full` -> `FULL`
fn adjacency_name(raw: &str) -> String {
    let short = strip_module(raw);
    let short = short.strip_prefix("ospf-nbr-").unwrap_or(short);
    short.replace('-', "").to_ascii_uppercase()
}

pub fn ospf_database(ctx: &NormalizeContext, raw: &Value) -> OspfDatabase {
    let mut lsas = match ctx.vendor {
        Vendor::Cisco => cisco_lsdb(raw),
        _ => Vec::new(),
    };
    if lsas.is_empty() {
        lsas = generic_lsdb(raw);
    }

    OspfDatabase {
        device_id: ctx.device_id.clone(),
        vendor: ctx.vendor,
        timestamp: ctx.stamp(),
        lsa_count: lsas.len(),
        lsas,
    }
}

const CISCO_LSA_LISTS: [&str; 2] = ["link-scope-lsa-id", "area-scope-lsa-id"];

fn cisco_lsdb(raw: &Value) -> Vec<OspfLsa> {
    let scopes = find_objects(raw, &|o: &Value| {
        o.get("lsa-type").is_some() && get(o, &CISCO_LSA_LISTS).is_some()
    });
    let mut out = Vec::new();
    for scope in scopes {
        let lsa_type = text(scope, &["lsa-type"]).unwrap_or_default();
        for lsa in list(get(scope, &CISCO_LSA_LISTS)) {
            out.push(OspfLsa {
                lsa_type: lsa_type.clone(),
                link_state_id: text(lsa, &["link-state-id", "lsa-id"]).unwrap_or_default(),
                advertising_router: text(lsa, &["adv-router", "advertising-router"]).unwrap_or_default(),
                sequence_number: text(lsa, &["seq-num"]),
                age: int(lsa, &["age"]),
                area: text(lsa, &["area-id"]),
            });
        }
    }
    out
}

fn generic_lsdb(raw: &Value) -> Vec<OspfLsa> {
    let ids = ["link-state-id", "lsa-id", "lsaId", "linkStateId"];
    find_objects(raw, &|o: &Value| get(o, &ids).is_some())
        .into_iter()
        .map(|o| {
            let state = o.get("state").unwrap_or(o);
            OspfLsa {
                lsa_type: text(o, &["lsa-type", "type", "lsaType"])
                    .map(|t| strip_module(&t).to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                link_state_id: text(o, &ids).unwrap_or_default(),
                advertising_router: text(o, &["advertising-router", "adv-router", "advRouter"])
                    .unwrap_or_default(),
                sequence_number: text(state, &["sequence-number", "seq-num", "seqNum"]),
                age: int(state, &["age"]),
                area: text(o, &["area-id", "area", "areaId"]),
            }
        })
        .collect()
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
    fn test_ietf_routing_state() {
        let raw = json!({
            "ietf-routing:routing-state": {
                "routing-instance": {
                    "name": "default",
                    "ribs": {"rib": [{"name": "ipv4-default", "routes": {"route": [
                        {"destination-prefix": "0.0.0.0/0", "route-preference": 1,
                         "next-hop": {"next-hop-address": "10.0.0.1"},
                         "source-protocol": "ietf-routing:static"},
                        {"destination-prefix": "10.0.0.0/24",
                         "next-hop": {"outgoing-interface": "GigabitEthernet1"},
                         "source-protocol": "ietf-routing:direct"}
                    ]}}]}
                }
            }
        });
        let table = routing_table(&ctx(Vendor::Cisco), &raw);
        assert_eq!(table.route_count, 2);
        assert_eq!(table.routes[0].next_hop.as_deref(), Some("10.0.0.1"));
        assert_eq!(table.routes[0].protocol, "static");
        assert_eq!(table.routes[0].vrf.as_deref(), Some("default"));
        assert_eq!(table.routes[1].protocol, "connected");
        assert_eq!(table.routes[1].interface.as_deref(), Some("GigabitEthernet1"));
    }

    #[test]
    fn test_huawei_static() {
        let raw = json!({
            "huawei-staticrt:staticrt": {"staticrtbase": {"srRoutes": {"srRoute": {
                "vrfName": "_public_", "prefix": "0.0.0.0", "maskLength": 0,
                "nexthop": "192.168.1.254", "preference": 60
            }}}}
        });
        let table = routing_table(&ctx(Vendor::Huawei), &raw);
        assert_eq!(table.routes.len(), 1);
        assert_eq!(table.routes[0].prefix, "0.0.0.0/0");
        assert_eq!(table.routes[0].preference, Some(60));
    }

    #[test]
    fn test_openconfig_aft_resolves_next_hop() {
        let raw = json!({
            "openconfig-network-instance:afts": {
                "ipv4-unicast": {"ipv4-entry": [{
                    "prefix": "10.9.0.0/16",
                    "state": {"prefix": "10.9.0.0/16", "origin-protocol": "openconfig-policy-types:OSPF",
                              "next-hop-group": "7"}
                }]},
                "next-hop-groups": {"next-hop-group": [{"id": "7", "next-hops": {"next-hop": [{"index": "3"}]}}]},
                "next-hops": {"next-hop": [{"index": "3", "state": {"ip-address": "10.0.0.2"}}]}
            }
        });
        let table = routing_table(&ctx(Vendor::OpenConfig), &raw);
        assert_eq!(table.routes[0].protocol, "ospf");
        assert_eq!(table.routes[0].next_hop.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_cisco_ospf_neighbors() {
        let raw = json!({
            "Cisco-IOS-XE-ospf-oper:ospf-oper-data": {"ospf-state": {"ospf-instance": [{
                "ospf-area": [{"area-id": 0, "ospf-interface": [{
                    "name": "GigabitEthernet2",
                    "ospf-neighbor": {"neighbor-id": "2.2.2.2", "address": "10.0.12.2",
                                      "state": "ospf-nbr-full", "dr": "10.0.12.2"}
                }]}]
            }]}}
        });
        let out = ospf_neighbors(&ctx(Vendor::Cisco), &raw);
        assert_eq!(out.neighbor_count, 1);
        let n = &out.neighbors[0];
        assert_eq!(n.state, "FULL");
        assert_eq!(n.area.as_deref(), Some("0"));
        assert_eq!(n.interface.as_deref(), Some("GigabitEthernet2"));
    }

    #[test]
    fn test_lsdb_generic_fallback() {
        let raw = json!({"lsdb": [{"lsa-type": "router", "link-state-id": "1.1.1.1",
                                    "advertising-router": "1.1.1.1", "age": 30}]});
        let out = ospf_database(&ctx(Vendor::Huawei), &raw);
        assert_eq!(out.lsa_count, 1);
        assert_eq!(out.lsas[0].age, Some(30));
    }

    #[test]
    fn test_unknown_shape_is_empty() {
        let table = routing_table(&ctx(Vendor::Huawei), &json!({"something": "else"}));
        assert_eq!(table.route_count, 0);
    }
}
