use serde_json::{json, Value};

use nbi_core::{DeviceProfile, Error, HttpMethod, Vendor};
use nbi_drivers::util::{netmask_to_prefix, prefix_to_netmask};
use nbi_drivers::{DriverRegistry, Intent, IntentCategory, Params};

const SLASHED: [&str; 4] = ["GigabitEthernet0/0/1", "0/0/1", "10.1.0.0/24", "pool/a"];

fn params_for(intent: Intent) -> Params {
    let prefix = match intent {
        Intent::InterfaceSetIpv6 => json!(64),
        _ if intent.category() == IntentCategory::Interface => json!(24),
        _ => json!("10.1.0.0/24"),
    };
    let ip = match intent {
        Intent::InterfaceSetIpv6 | Intent::InterfaceRemoveIpv6 => "2001:db8::1",
        _ => "10.0.0.1",
    };
    let params = json!({
        "interface": "GigabitEthernet0/0/1",
        "ip": ip,
        "prefix": prefix,
        "description": "uplink",
        "mtu": 1500,
        "vlan_id": 10,
        "name": "users",
        "mode": "access",
        "next_hop": "10.0.0.254",
        "process_id": 1,
        "router_id": "1.1.1.1",
        "area": "0",
        "network": "10.1.0.0",
        "wildcard_mask": "0.0.0.255",
        "hostname": "edge-1",
        "banner": "authorized only",
        "server": "10.0.0.53",
        "pool_name": "pool/a",
        "gateway": "192.168.10.1",
        "mask": "255.255.255.0",
        "start_ip": "192.168.10.10",
        "end_ip": "192.168.10.100",
        "table_id": 0,
        "flow_id": "flow/1",
        "priority": 10,
        "match": {},
        "instructions": {}
    });
    match params {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn device(vendor: Vendor) -> DeviceProfile {
    DeviceProfile::new("node-1", vendor)
}

#[test]
fn test_list_keys_never_carry_raw_slashes() {
    let registry = DriverRegistry::with_defaults();
    let mut built = 0;

    for (vendor, intent) in registry.pairs() {
        match registry.build(&device(vendor), intent, &params_for(intent)) {
            Ok(spec) => {
                built += 1;
                for raw in SLASHED {
                    assert!(
                        !spec.path.contains(raw),
                        "{} {} leaked {:?} into {}",
                        vendor,
                        intent,
                        raw,
                        spec.path
                    );
                }
            }
            Err(Error::DriverBuild(_)) => {}
            Err(other) => panic!("{} {} failed unexpectedly: {}", vendor, intent, other),
        }
    }
    assert!(built > 40, "only {} pairs built", built);
}

#[test]
fn test_every_pair_is_tagged() {
    let registry = DriverRegistry::with_defaults();
    for (vendor, intent) in registry.pairs() {
        if let Ok(spec) = registry.build(&device(vendor), intent, &params_for(intent)) {
            assert_eq!(spec.intent, intent.as_str());
            assert!(!spec.driver.is_empty());
            if intent.definition().is_read_only {
                assert!(spec.method.is_read(), "{} {} is read-only", vendor, intent);
            }
        }
    }
}

#[test]
fn test_cisco_set_ipv4_example() {
    let registry = DriverRegistry::with_defaults();
    let params = json!({"interface": "GigabitEthernet0/0/1", "ip": "10.0.0.1", "prefix": 24});
    let spec = registry
        .build(
            &device(Vendor::Cisco),
            Intent::InterfaceSetIpv4,
            params.as_object().unwrap(),
        )
        .unwrap();

    assert!(spec.path.ends_with("interface/GigabitEthernet=0%2F0%2F1"));
    assert_eq!(spec.method, HttpMethod::Patch);
    assert!(spec.payload.unwrap().to_string().contains("\"255.255.255.0\""));
}

#[test]
fn test_openconfig_default_route_key() {
    let registry = DriverRegistry::with_defaults();
    let params = json!({"next_hop": "10.0.0.254"});
    let spec = registry
        .build(
            &device(Vendor::OpenConfig),
            Intent::RoutingDefaultAdd,
            params.as_object().unwrap(),
        )
        .unwrap();
    assert!(spec.path.contains("0.0.0.0%2F0"));
}

#[test]
fn test_unsupported_pair() {
    let registry = DriverRegistry::with_defaults();
    let err = registry
        .build(&device(Vendor::OpenFlow), Intent::VlanCreate, &Params::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedIntent(_)));
}

#[test]
fn test_cidr_mask_round_trip() {
    for len in 0..=32u8 {
        let mask = prefix_to_netmask(len).unwrap();
        assert_eq!(netmask_to_prefix(&mask).unwrap(), len);
    }
}
