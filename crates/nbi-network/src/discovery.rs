//! Interface Discovery Cache
//!
//! Per-node interface inventory with a TTL. Cisco devices merge the native
//! config tree with `Cisco-IOS-XE-interfaces-oper`; when the oper read fails
//! the config view is returned alone. Huawei and OpenConfig come from their
//! `show.interfaces` reads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use nbi_core::{Clock, Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};
use nbi_drivers::normalize::interface::{cisco_entry, show_interfaces};
use nbi_drivers::normalize::schema::InterfaceStatus;
use nbi_drivers::normalize::{at, get, int, list, text};
use nbi_drivers::util::{mount_base, split_interface_name};
use nbi_drivers::{DriverRegistry, Intent, NormalizeContext, Params};

use crate::controller::Controller;

const CISCO_NATIVE: &str = "Cisco-IOS-XE-native:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OspfBinding {
    pub process_id: u64,
    pub area: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredInterface {
    pub name: String,
    pub interface_type: String,
    pub number: String,
    /// `up` | `down` | `unknown`
    pub admin_status: String,
    pub oper_status: String,
    /// CIDR notation
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub description: Option<String>,
    pub mtu: Option<u64>,
    pub mac_address: Option<String>,
    pub speed: Option<String>,
    pub duplex: Option<String>,
    pub auto_negotiate: Option<bool>,
    pub media_type: Option<String>,
    pub last_change: Option<String>,
    pub ospf: Option<OspfBinding>,
}

impl DiscoveredInterface {
    fn from_status(status: InterfaceStatus) -> Self {
        let (interface_type, number) =
            split_interface_name(&status.name).unwrap_or_else(|_| (status.name.clone(), String::new()));
        Self {
            interface_type,
            number,
            admin_status: status.admin.unwrap_or_else(|| "unknown".to_string()),
            oper_status: status.oper.unwrap_or_else(|| "unknown".to_string()),
            ipv4: status.ipv4.into_iter().next(),
            ipv6: status.ipv6.into_iter().next(),
            description: status.description,
            mtu: status.mtu,
            mac_address: status.mac_address,
            speed: status.speed,
            duplex: None,
            auto_negotiate: None,
            media_type: None,
            last_change: None,
            ospf: None,
            name: status.name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    pub node_id: String,
    pub vendor: Vendor,
    pub interfaces: Vec<DiscoveredInterface>,
    pub discovered_at: DateTime<Utc>,
    /// Whether operational data was merged in
    pub oper_merged: bool,
    pub from_cache: bool,
}

pub struct InterfaceDiscovery {
    controller: Arc<dyn Controller>,
    drivers: Arc<DriverRegistry>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: RwLock<HashMap<String, DiscoveryResult>>,
}

impl InterfaceDiscovery {
    pub fn new(
        controller: Arc<dyn Controller>,
        drivers: Arc<DriverRegistry>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            controller,
            drivers,
            clock,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached interfaces for `node_id`, re-read when stale or when `force` is set
    pub async fn discover(&self, node_id: &str, vendor: Vendor, force: bool) -> Result<DiscoveryResult> {
        if !force {
            if let Some(cached) = self.fresh_entry(node_id).await {
                debug!("Interface cache hit for {}", node_id);
                return Ok(cached);
            }
        }

        let profile = DeviceProfile::new(node_id, vendor);
        let (interfaces, oper_merged) = match vendor {
            Vendor::Cisco => self.discover_cisco(&profile).await?,
            Vendor::Huawei | Vendor::OpenConfig => {
                let raw = self.read_config(&profile).await?;
                let ctx = NormalizeContext::new(node_id, vendor, self.clock.now());
                let interfaces = show_interfaces(&ctx, &raw)
                    .interfaces
                    .into_iter()
                    .map(DiscoveredInterface::from_status)
                    .collect();
                (interfaces, false)
            }
            Vendor::OpenFlow => {
                return Err(Error::UnsupportedVendor(
                    "interface discovery is not available for OpenFlow switches; use the topology sync".to_string(),
                ))
            }
        };

        let mut interfaces: Vec<DiscoveredInterface> = interfaces;
        interfaces.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

        let result = DiscoveryResult {
            node_id: node_id.to_string(),
            vendor,
            interfaces,
            discovered_at: self.clock.now(),
            oper_merged,
            from_cache: false,
        };
        info!("Discovered {} interfaces on {}", result.interfaces.len(), node_id);

        let mut cached = result.clone();
        cached.from_cache = true;
        self.cache.write().await.insert(node_id.to_string(), cached);
        Ok(result)
    }

    pub async fn invalidate(&self, node_id: &str) -> bool {
        self.cache.write().await.remove(node_id).is_some()
    }

    pub async fn invalidate_all(&self) -> usize {
        let mut cache = self.cache.write().await;
        let count = cache.len();
        cache.clear();
        count
    }

    async fn fresh_entry(&self, node_id: &str) -> Option<DiscoveryResult> {
        let cache = self.cache.read().await;
        let entry = cache.get(node_id)?;
        let elapsed = (self.clock.now() - entry.discovered_at).to_std().unwrap_or_default();
        (elapsed <= self.ttl).then(|| entry.clone())
    }

    async fn read_config(&self, profile: &DeviceProfile) -> Result<Value> {
        let spec = self
            .drivers
            .build(profile, Intent::ShowInterfaces, &Params::new())?;
        Ok(self.controller.send(&spec).await?)
    }

    async fn discover_cisco(&self, profile: &DeviceProfile) -> Result<(Vec<DiscoveredInterface>, bool)> {
        let config = self.read_config(profile).await?;
        let mut interfaces = cisco_config(&config);

        let oper_spec = RequestSpec::get(
            Datastore::Operational,
            format!("{}/Cisco-IOS-XE-interfaces-oper:interfaces", mount_base(&profile.node_id)),
        )
        .tagged("interface.discover", "cisco");
        match self.controller.send(&oper_spec).await {
            Ok(oper) => {
                merge_cisco_oper(&mut interfaces, &oper);
                Ok((interfaces, true))
            }
            Err(err) => {
                warn!("Oper data unavailable for {}, using config only: {}", profile.node_id, err);
                Ok((interfaces, false))
            }
        }
    }
}

fn cisco_config(raw: &Value) -> Vec<DiscoveredInterface> {
    let Some(groups) = get(raw, &["Cisco-IOS-XE-native:interface", "interface"]).and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (if_type, entries) in groups {
        let if_type = if_type.strip_prefix(CISCO_NATIVE).unwrap_or(if_type);
        for entry in list(Some(entries)) {
            let mut iface = DiscoveredInterface::from_status(cisco_entry(if_type, entry));
            iface.interface_type = if_type.to_string();
            iface.number = text(entry, &["name"]).unwrap_or_default();
            iface.ospf = cisco_ospf(entry);
            out.push(iface);
        }
    }
    out
}

fn cisco_ospf(entry: &Value) -> Option<OspfBinding> {
    let ospf = at(entry, &["ip", "Cisco-IOS-XE-ospf:router-ospf", "ospf"])?;
    let process = list(ospf.get("process-id")).into_iter().next()?;
    let process_id = int(process, &["id"])?;
    let area = list(process.get("area"))
        .into_iter()
        .next()
        .and_then(|a| text(a, &["area-id"]))
        .unwrap_or_else(|| "0".to_string());
    Some(OspfBinding { process_id, area })
}

fn merge_cisco_oper(interfaces: &mut [DiscoveredInterface], raw: &Value) {
    let container = get(raw, &["Cisco-IOS-XE-interfaces-oper:interfaces", "interfaces"]).unwrap_or(raw);
    let by_name: HashMap<String, &Value> = list(container.get("interface"))
        .into_iter()
        .filter_map(|entry| text(entry, &["name"]).map(|name| (name, entry)))
        .collect();

    for iface in interfaces.iter_mut() {
        let Some(oper) = by_name.get(&iface.name) else {
            continue;
        };
        iface.oper_status = text(oper, &["oper-status"])
            .map(|s| oper_status(&s))
            .unwrap_or_else(|| "unknown".to_string());
        iface.mac_address = text(oper, &["phys-address"]).or(iface.mac_address.take());
        iface.speed = int(oper, &["speed"]).map(format_speed);
        iface.last_change = text(oper, &["last-change"]);
        if iface.mtu.is_none() {
            iface.mtu = int(oper, &["mtu"]);
        }
        if let Some(ether) = oper.get("ether-state") {
            iface.duplex = text(ether, &["negotiated-duplex-mode"]).map(|d| duplex(&d));
            iface.auto_negotiate = ether.get("auto-negotiate").and_then(Value::as_bool);
            iface.media_type = text(ether, &["media-type"]).map(|m| media_type(&m));
        }
    }
}

/// `if-oper-state-ready` and `up` read as up
fn oper_status(raw: &str) -> String {
    let raw = raw.to_lowercase();
    if raw.contains("ready") || raw == "up" {
        "up".to_string()
    } else {
        "down".to_string()
    }
}

fn format_speed(bits: u64) -> String {
    let (value, unit) = match bits {
        b if b >= 1_000_000_000 => (b as f64 / 1e9, "Gbps"),
        b if b >= 1_000_000 => (b as f64 / 1e6, "Mbps"),
        b if b >= 1_000 => (b as f64 / 1e3, "Kbps"),
        b => (b as f64, "bps"),
    };
    if value.fract() == 0.0 {
        format!("{:.0}{}", value, unit)
    } else {
        format!("{:.1}{}", value, unit)
    }
}

fn duplex(raw: &str) -> String {
    match raw {
        "full-duplex" => "full",
        "half-duplex" => "half",
        "auto-duplex" => "auto",
        other => other,
    }
    .to_string()
}

fn media_type(raw: &str) -> String {
    raw.strip_prefix("ether-media-type-").unwrap_or(raw).replace('-', " ")
}

fn type_rank(if_type: &str) -> u8 {
    match if_type {
        "GigabitEthernet" => 0,
        "TenGigabitEthernet" => 1,
        "Loopback" | "LoopBack" => 2,
        "Vlan" | "Vlanif" => 3,
        "Tunnel" => 4,
        "Port-channel" | "Eth-Trunk" => 5,
        _ => 99,
    }
}

/// Type order first, then the number compared part by part
fn sort_key(iface: &DiscoveredInterface) -> (u8, Vec<u64>, String) {
    let parts = iface
        .number
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty())
        .filter_map(|p| p.parse().ok())
        .collect();
    (type_rank(&iface.interface_type), parts, iface.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedController;
    use nbi_core::{HttpMethod, ManualClock};
    use serde_json::json;

    const NODE: &str = "csr1";

    fn config_path() -> String {
        format!("{}/Cisco-IOS-XE-native:native/interface", mount_base(NODE))
    }

    fn oper_path() -> String {
        format!("{}/Cisco-IOS-XE-interfaces-oper:interfaces", mount_base(NODE))
    }

    fn cisco_config_body() -> Value {
        json!({"Cisco-IOS-XE-native:interface": {
            "Loopback": [{"name": 0, "ip": {"address": {"primary": {"address": "1.1.1.1", "mask": "255.255.255.255"}}}}],
            "GigabitEthernet": [
                {"name": "2", "shutdown": [null]},
                {"name": "1", "description": "uplink", "mtu": 1500,
                 "ip": {
                    "address": {"primary": {"address": "10.0.0.1", "mask": "255.255.255.0"}},
                    "Cisco-IOS-XE-ospf:router-ospf": {"ospf": {"process-id": [{"id": 10, "area": [{"area-id": 0}]}]}}
                 }}
            ]
        }})
    }

    fn discovery(fake: Arc<ScriptedController>, clock: Arc<ManualClock>) -> InterfaceDiscovery {
        InterfaceDiscovery::new(
            fake,
            Arc::new(DriverRegistry::with_defaults()),
            clock,
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1_000_000_000), "1Gbps");
        assert_eq!(format_speed(2_500_000_000), "2.5Gbps");
        assert_eq!(format_speed(100_000_000), "100Mbps");
        assert_eq!(format_speed(64_000), "64Kbps");
    }

    #[tokio::test]
    async fn test_cisco_merge_and_order() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(HttpMethod::Get, config_path(), cisco_config_body());
        fake.on(
            HttpMethod::Get,
            oper_path(),
            json!({"Cisco-IOS-XE-interfaces-oper:interfaces": {"interface": [{
                "name": "GigabitEthernet1",
                "oper-status": "if-oper-state-ready",
                "phys-address": "00:1e:49:aa:bb:01",
                "speed": "1000000000",
                "last-change": "2024-05-01T10:00:00Z",
                "ether-state": {"negotiated-duplex-mode": "full-duplex", "auto-negotiate": true,
                                "media-type": "ether-media-type-virtual"}
            }]}}),
        );
        let disco = discovery(fake, Arc::new(ManualClock::new(Utc::now())));

        let result = disco.discover(NODE, Vendor::Cisco, false).await.unwrap();
        assert!(result.oper_merged);
        let names: Vec<&str> = result.interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["GigabitEthernet1", "GigabitEthernet2", "Loopback0"]);

        let gi1 = &result.interfaces[0];
        assert_eq!(gi1.ipv4.as_deref(), Some("10.0.0.1/24"));
        assert_eq!(gi1.oper_status, "up");
        assert_eq!(gi1.speed.as_deref(), Some("1Gbps"));
        assert_eq!(gi1.duplex.as_deref(), Some("full"));
        assert_eq!(gi1.media_type.as_deref(), Some("virtual"));
        assert_eq!(gi1.ospf, Some(OspfBinding { process_id: 10, area: "0".into() }));
        assert_eq!(result.interfaces[1].admin_status, "down");
    }

    #[tokio::test]
    async fn test_oper_failure_falls_back_to_config() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(HttpMethod::Get, config_path(), cisco_config_body());
        fake.status(HttpMethod::Get, oper_path(), 500);
        let disco = discovery(fake, Arc::new(ManualClock::new(Utc::now())));

        let result = disco.discover(NODE, Vendor::Cisco, false).await.unwrap();
        assert!(!result.oper_merged);
        assert_eq!(result.interfaces.len(), 3);
        assert_eq!(result.interfaces[0].oper_status, "unknown");
    }

    #[tokio::test]
    async fn test_ttl_and_invalidate() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(HttpMethod::Get, config_path(), cisco_config_body());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let disco = discovery(fake.clone(), clock.clone());

        disco.discover(NODE, Vendor::Cisco, false).await.unwrap();
        let again = disco.discover(NODE, Vendor::Cisco, false).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(fake.count(HttpMethod::Get, &config_path()), 1);

        clock.advance(Duration::from_secs(301));
        let stale = disco.discover(NODE, Vendor::Cisco, false).await.unwrap();
        assert!(!stale.from_cache);
        assert_eq!(fake.count(HttpMethod::Get, &config_path()), 2);

        disco.discover(NODE, Vendor::Cisco, true).await.unwrap();
        assert_eq!(fake.count(HttpMethod::Get, &config_path()), 3);

        assert!(disco.invalidate(NODE).await);
        assert!(!disco.invalidate(NODE).await);
        assert_eq!(disco.invalidate_all().await, 0);
    }

    #[tokio::test]
    async fn test_openflow_is_unsupported() {
        let fake = Arc::new(ScriptedController::new());
        let disco = discovery(fake.clone(), Arc::new(ManualClock::new(Utc::now())));
        let err = disco.discover("openflow:1", Vendor::OpenFlow, false).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedVendor(_)));
        assert!(fake.calls().is_empty());
    }
}
