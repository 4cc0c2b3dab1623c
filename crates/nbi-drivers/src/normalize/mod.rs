//! Vendor response normalizers
//!
//! Each normalizer turns the raw controller JSON for one read intent into a
//! unified schema from [`schema`]. They are pure: the caller supplies the
//! vendor (known from the driver that built the request) and the timestamp.
//! Missing optional nodes never fail; they simply leave fields empty.
//!
//! YANG-JSON encodes a one-entry list as either `[{..}]` or `{..}` depending
//! on the controller revision, so every list read goes through [`list`].

pub mod device;
pub mod flows;
pub mod interface;
pub mod routing;
pub mod schema;
pub mod system;
pub mod vlan;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use nbi_core::{Result, Vendor};

use crate::registry::Intent;

/// Who the response came from and when it was read
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub device_id: String,
    pub vendor: Vendor,
    pub timestamp: DateTime<Utc>,
}

impl NormalizeContext {
    pub fn new(device_id: impl Into<String>, vendor: Vendor, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            vendor,
            timestamp,
        }
    }

    pub(crate) fn stamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Normalize the response of `intent`. Intents without a unified schema
/// (writes, and reads flagged `needs_normalization = false`) pass through.
pub fn normalize(intent: Intent, ctx: &NormalizeContext, raw: &Value) -> Result<Value> {
    if !intent.definition().needs_normalization {
        return Ok(raw.clone());
    }

    let out = match intent {
        Intent::ShowInterface => to_json(&interface::show_interface(ctx, raw))?,
        Intent::ShowInterfaces => to_json(&interface::show_interfaces(ctx, raw))?,
        Intent::ShowIpInterfaceBrief => to_json(&interface::interface_brief(ctx, raw))?,
        Intent::ShowIpRoute => to_json(&routing::routing_table(ctx, raw))?,
        Intent::ShowOspfNeighbors => to_json(&routing::ospf_neighbors(ctx, raw))?,
        Intent::ShowOspfDatabase => to_json(&routing::ospf_database(ctx, raw))?,
        Intent::ShowVersion => to_json(&system::show_version(ctx, raw))?,
        Intent::ShowRunningConfig => to_json(&system::running_config(ctx, raw))?,
        Intent::ShowVlans => to_json(&vlan::vlans(ctx, raw))?,
        Intent::ShowDhcpPools => to_json(&vlan::dhcp_pools(ctx, raw))?,
        Intent::DeviceStatus => to_json(&device::node_status(raw))?,
        Intent::DeviceList => to_json(&device::node_list(raw))?,
        Intent::ShowFlows => to_json(&flows::flow_table(ctx, raw))?,
        _ => raw.clone(),
    };
    Ok(out)
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// ============================================================================
// Coercion helpers
// ============================================================================

/// Entries of a YANG list, whether encoded as an array or a bare object
pub fn list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

/// First of `keys` present and not null
pub fn get<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// `get(..)` or the value itself, for optionally module-wrapped roots
pub fn root<'a>(value: &'a Value, keys: &[&str]) -> &'a Value {
    get(value, keys).unwrap_or(value)
}

/// Nested lookup through single keys: `at(v, &["ip", "address", "primary"])`
pub fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |cur, key| cur.get(*key))
}

/// Text of a string, number or bool leaf
pub fn text(value: &Value, keys: &[&str]) -> Option<String> {
    match get(value, keys)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer leaf; YANG 64-bit counters arrive as strings
pub fn int(value: &Value, keys: &[&str]) -> Option<u64> {
    match get(value, keys)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Drop a `module:` prefix from an identity value
pub fn strip_module(value: &str) -> &str {
    value.rsplit(':').next().unwrap_or(value)
}

/// Depth-first collection of objects matching `pred`. Matches are not
/// descended into.
pub fn find_objects<'a>(value: &'a Value, pred: &dyn Fn(&Value) -> bool) -> Vec<&'a Value> {
    let mut out = Vec::new();
    walk(value, pred, &mut out);
    out
}

fn walk<'a>(value: &'a Value, pred: &dyn Fn(&Value) -> bool, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if pred(value) {
                out.push(value);
                return;
            }
            for child in map.values() {
                walk(child, pred, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, pred, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_coerces_single_object() {
        let v = json!({"a": {"id": 1}, "b": [{"id": 1}, {"id": 2}], "c": "x"});
        assert_eq!(list(v.get("a")).len(), 1);
        assert_eq!(list(v.get("b")).len(), 2);
        assert!(list(v.get("c")).is_empty());
        assert!(list(v.get("missing")).is_empty());
    }

    #[test]
    fn test_leaf_helpers() {
        let v = json!({"mtu": "1500", "name": 2, "null": null, "ns:name": "x"});
        assert_eq!(int(&v, &["mtu"]), Some(1500));
        assert_eq!(text(&v, &["name"]).as_deref(), Some("2"));
        assert_eq!(text(&v, &["null", "ns:name"]).as_deref(), Some("x"));
        assert_eq!(strip_module("openconfig-policy-types:STATIC"), "STATIC");
    }

    #[test]
    fn test_find_objects_stops_at_match() {
        let v = json!({"x": [{"neighbor-id": "1.1.1.1", "inner": {"neighbor-id": "2.2.2.2"}}]});
        let found = find_objects(&v, &|o| o.get("neighbor-id").is_some());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_write_intents_pass_through() {
        let ctx = NormalizeContext::new("r1", Vendor::Cisco, Utc::now());
        let raw = json!({"ok": true});
        assert_eq!(normalize(Intent::InterfaceEnable, &ctx, &raw).unwrap(), raw);
    }
}
