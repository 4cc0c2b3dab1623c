use serde_json::{json, Map, Value};

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use super::DRIVER_NAME;
use crate::driver::Driver;
use crate::params::{Params, ParamsExt};
use crate::registry::Intent;
use crate::util::{encode_key, mount_base, netmask_to_prefix, parse_ipv4};

const SUPPORTED: &[Intent] = &[
    Intent::DhcpCreatePool,
    Intent::DhcpDeletePool,
    Intent::DhcpUpdatePool,
    Intent::ShowDhcpPools,
];

/// Global address pools from `huawei-ip-pool`
#[derive(Debug, Default)]
pub struct HuaweiDhcpDriver;

impl Driver for HuaweiDhcpDriver {
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
        let pools = format!(
            "{}/huawei-ip-pool:ip-pool/global-pools",
            mount_base(&device.node_id)
        );

        if intent == Intent::ShowDhcpPools {
            return Ok(RequestSpec::get(
                Datastore::Operational,
                format!("{}?content=config", pools),
            ));
        }

        let pool_name = params.required_str("pool_name")?;
        let path = format!("{}/global-pool={}", pools, encode_key(&pool_name));

        match intent {
            Intent::DhcpDeletePool => Ok(RequestSpec::delete(path)),
            Intent::DhcpCreatePool => {
                let mut pool = Map::new();
                pool.insert("pool-name".into(), Value::String(pool_name));
                pool.insert(
                    "gateway".into(),
                    gateway(&params.required_str("gateway")?, &params.required_str("mask")?)?,
                );
                pool.insert(
                    "section".into(),
                    section(&params.required_str("start_ip")?, &params.required_str("end_ip")?)?,
                );
                insert_dns(&mut pool, params)?;
                pool.insert(
                    "lease".into(),
                    json!({
                        "day": params.opt_u32("lease_days")?.unwrap_or(1),
                        "hour": 0,
                        "minute": 0
                    }),
                );
                Ok(RequestSpec::patch(
                    path,
                    json!({ "huawei-ip-pool:global-pool": [Value::Object(pool)] }),
                ))
            }
            Intent::DhcpUpdatePool => {
                let mut pool = Map::new();
                pool.insert("pool-name".into(), Value::String(pool_name));
                match (params.opt_str("gateway"), params.opt_str("mask")) {
                    (Some(gw), Some(mask)) => {
                        pool.insert("gateway".into(), gateway(&gw, &mask)?);
                    }
                    (None, None) => {}
                    _ => return Err(Error::build("gateway and mask must be updated together")),
                }
                match (params.opt_str("start_ip"), params.opt_str("end_ip")) {
                    (Some(start), Some(end)) => {
                        pool.insert("section".into(), section(&start, &end)?);
                    }
                    (None, None) => {}
                    _ => return Err(Error::build("start_ip and end_ip must be updated together")),
                }
                insert_dns(&mut pool, params)?;
                if pool.len() == 1 {
                    return Err(Error::build("nothing to update"));
                }
                Ok(RequestSpec::patch(
                    path,
                    json!({ "huawei-ip-pool:global-pool": [Value::Object(pool)] }),
                ))
            }
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}

fn gateway(ip: &str, mask: &str) -> Result<Value> {
    netmask_to_prefix(mask)?;
    Ok(json!({ "ip-address": parse_ipv4(ip)?.to_string(), "mask": mask }))
}

fn section(start: &str, end: &str) -> Result<Value> {
    let (start, end) = (parse_ipv4(start)?, parse_ipv4(end)?);
    if u32::from(start) > u32::from(end) {
        return Err(Error::build(format!("start_ip {} is after end_ip {}", start, end)));
    }
    Ok(json!([{
        "section-id": 0,
        "start-ip-address": start.to_string(),
        "end-ip-address": end.to_string()
    }]))
}

fn insert_dns(pool: &mut Map<String, Value>, params: &Params) -> Result<()> {
    let servers = params.str_list("dns_servers");
    if servers.is_empty() {
        return Ok(());
    }
    let dns = servers
        .iter()
        .map(|s| parse_ipv4(s).map(|ip| json!({ "ip-address": ip.to_string() })))
        .collect::<Result<Vec<_>>>()?;
    pool.insert("dns-list".into(), json!({ "dns": dns }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(intent: Intent, p: Value) -> Result<RequestSpec> {
        HuaweiDhcpDriver.build(
            &DeviceProfile::new("AR1", Vendor::Huawei),
            intent,
            p.as_object().unwrap(),
        )
    }

    #[test]
    fn test_create_pool() {
        let spec = build(
            Intent::DhcpCreatePool,
            json!({
                "pool_name": "LAN pool",
                "gateway": "192.168.1.1",
                "mask": "255.255.255.0",
                "start_ip": "192.168.1.10",
                "end_ip": "192.168.1.200",
                "dns_servers": "8.8.8.8"
            }),
        )
        .unwrap();
        assert!(spec.path.ends_with("global-pool=LAN%20pool"));
        let pool = &spec.payload.unwrap()["huawei-ip-pool:global-pool"][0];
        assert_eq!(pool["section"][0]["end-ip-address"], "192.168.1.200");
        assert_eq!(pool["dns-list"]["dns"][0]["ip-address"], "8.8.8.8");
        assert_eq!(pool["lease"]["day"], 1);
    }

    #[test]
    fn test_update_requires_pairs() {
        assert!(build(Intent::DhcpUpdatePool, json!({"pool_name": "p", "gateway": "10.0.0.1"})).is_err());
        assert!(build(Intent::DhcpUpdatePool, json!({"pool_name": "p"})).is_err());
        let spec = build(
            Intent::DhcpUpdatePool,
            json!({"pool_name": "p", "dns_servers": ["1.1.1.1"]}),
        )
        .unwrap();
        assert!(spec.payload.unwrap()["huawei-ip-pool:global-pool"][0].get("gateway").is_none());
    }

    #[test]
    fn test_reversed_range() {
        let err = build(
            Intent::DhcpCreatePool,
            json!({
                "pool_name": "p", "gateway": "10.0.0.1", "mask": "255.255.255.0",
                "start_ip": "10.0.0.50", "end_ip": "10.0.0.10"
            }),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DriverBuild(_)));
    }
}
