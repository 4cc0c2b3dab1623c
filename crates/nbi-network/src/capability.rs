//! Device Capability Manager
//!
//! Process-wide cache of the YANG modules each NETCONF node exposes,
//! built from the controller's `topology-netconf` view.
//!
//! - [`CapabilityManager::sync_all`] rebuilds the cache from the full topology,
//!   polling nodes that are still connecting
//! - [`CapabilityManager::is_feature_supported`] gates calls from the cache alone
//! - [`CapabilityManager::diagnose_error`] explains a failed intent with one
//!   short controller read
//!
//! Checks fail closed: an unknown or unconnected node supports nothing.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use nbi_core::{CancelToken, Clock, ConnectionStatus, Error, PollSettings, Poller, Result, Vendor};
use nbi_drivers::normalize::{get, list, text};
use nbi_drivers::{build_list, build_status};
use nbi_store::metrics::set_capability_cache_size;

use crate::controller::Controller;
use crate::error::excerpt;

/// Pseudo node the controller lists for itself
const CONTROLLER_NODE: &str = "controller-config";

const CONNECTION_STATUS: [&str; 2] = ["netconf-node-topology:connection-status", "connection-status"];

/// Module a node advertised but the controller could not load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableCapability {
    pub module: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityEntry {
    /// Bare module names, sorted and unique
    pub available_capabilities: Vec<String>,
    pub unavailable_capabilities: Vec<UnavailableCapability>,
    pub connection_status: ConnectionStatus,
    pub last_sync_time: DateTime<Utc>,
}

impl CapabilityEntry {
    fn timed_out(at: DateTime<Utc>) -> Self {
        Self {
            available_capabilities: Vec::new(),
            unavailable_capabilities: Vec::new(),
            connection_status: ConnectionStatus::Timeout,
            last_sync_time: at,
        }
    }

    pub fn has_module(&self, module: &str) -> bool {
        let needle = module.to_lowercase();
        self.available_capabilities
            .iter()
            .any(|cap| cap.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureCheck {
    pub node_id: String,
    pub capability: String,
    pub supported: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub devices: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub node_id: String,
    pub connection_status: ConnectionStatus,
    pub capability_count: usize,
    pub unavailable_count: usize,
    pub last_sync_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnosis {
    /// Whether the node could be inspected at all
    pub diagnosed: bool,
    pub node_id: String,
    pub intent: String,
    pub odl_error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_status: Option<ConnectionStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_modules: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_modules: Vec<String>,
    pub suggestion: String,
}

/// YANG modules each intent family needs, per vendor. Looked up by the
/// longest matching dotted prefix of the intent name.
const INTENT_MODULES: &[(&str, Vendor, &[&str])] = &[
    ("interface", Vendor::Cisco, &["Cisco-IOS-XE-native"]),
    ("interface", Vendor::Huawei, &["huawei-ifm", "huawei-ip"]),
    ("interface", Vendor::OpenConfig, &["openconfig-interfaces"]),
    ("routing.ospf", Vendor::Cisco, &["Cisco-IOS-XE-ospf"]),
    ("routing.ospf", Vendor::Huawei, &["huawei-ospfv2"]),
    ("routing.ospf", Vendor::OpenConfig, &["openconfig-network-instance"]),
    ("routing.static", Vendor::Cisco, &["Cisco-IOS-XE-native"]),
    ("routing.static", Vendor::Huawei, &["huawei-staticrt"]),
    ("routing.static", Vendor::OpenConfig, &["openconfig-network-instance"]),
    ("routing.default", Vendor::Cisco, &["Cisco-IOS-XE-native"]),
    ("routing.default", Vendor::Huawei, &["huawei-staticrt"]),
    ("routing.default", Vendor::OpenConfig, &["openconfig-network-instance"]),
    ("system", Vendor::Cisco, &["Cisco-IOS-XE-native"]),
    ("system", Vendor::Huawei, &["huawei-system"]),
    ("system", Vendor::OpenConfig, &["openconfig-system"]),
    ("vlan", Vendor::Cisco, &["Cisco-IOS-XE-vlan"]),
    ("vlan", Vendor::Huawei, &["huawei-vlan"]),
    ("vlan", Vendor::OpenConfig, &["openconfig-vlan"]),
    ("dhcp", Vendor::Cisco, &[]),
    ("dhcp", Vendor::Huawei, &["huawei-dhcps"]),
    ("show", Vendor::Cisco, &["Cisco-IOS-XE-native"]),
    ("show", Vendor::Huawei, &["huawei-ifm"]),
    ("show", Vendor::OpenConfig, &["openconfig-interfaces"]),
];

/// Required modules for `intent` on `vendor`; empty when nothing is mapped
pub fn required_modules(intent: &str, vendor: Vendor) -> &'static [&'static str] {
    let mut end = intent.len();
    loop {
        let prefix = &intent[..end];
        if let Some((_, _, modules)) = INTENT_MODULES
            .iter()
            .find(|(p, v, _)| *p == prefix && *v == vendor)
        {
            return *modules;
        }
        // a prefix known for another vendor still ends the search
        if INTENT_MODULES.iter().any(|(p, _, _)| *p == prefix) {
            return &[];
        }
        match prefix.rfind('.') {
            Some(idx) => end = idx,
            None => return &[],
        }
    }
}

/// `(urn:...?revision=...)module-name` gives `module-name`; bare URNs are
/// kept whole
pub fn extract_module_name(capability: &str) -> Option<String> {
    let capability = capability.trim();
    if capability.is_empty() {
        return None;
    }
    let name = match capability.rsplit_once(')') {
        Some((_, module)) => module.trim(),
        None => capability,
    };
    (!name.is_empty()).then(|| name.to_string())
}

pub struct CapabilityManager {
    controller: Arc<dyn Controller>,
    clock: Arc<dyn Clock>,
    poll: PollSettings,
    diagnose_timeout: Duration,
    cancel: Option<CancelToken>,
    cache: RwLock<HashMap<String, CapabilityEntry>>,
}

impl CapabilityManager {
    pub fn new(controller: Arc<dyn Controller>, clock: Arc<dyn Clock>, poll: PollSettings) -> Self {
        Self {
            controller,
            clock,
            poll,
            diagnose_timeout: Duration::from_secs(5),
            cancel: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_diagnose_timeout(mut self, timeout: Duration) -> Self {
        self.diagnose_timeout = timeout;
        self
    }

    /// Cancel poll loops when the token fires
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    // =========================================================================
    // TOPOLOGY SYNC
    // =========================================================================

    /// Rebuild the cache from the full NETCONF topology. Returns the number
    /// of cached nodes.
    pub async fn sync_all(&self) -> Result<usize> {
        info!("Starting full capability sync");
        let raw = self.controller.send(&build_list()).await?;

        let nodes = topology_nodes(&raw);
        info!("Found {} nodes in topology", nodes.len());

        let mut fresh = HashMap::new();
        let mut pending = Vec::new();
        for node in nodes {
            let Some(node_id) = text(node, &["node-id"]) else {
                continue;
            };
            if node_id == CONTROLLER_NODE {
                continue;
            }

            if connection_status(node).is_connected() {
                fresh.insert(node_id, self.parse_node(node));
            } else {
                info!("{}: status={}, starting poll", node_id, connection_status(node));
                pending.push(node_id);
            }
        }

        // Nodes are independent; poll the slow ones side by side
        let polled = join_all(pending.iter().map(|node_id| self.poll_until_connected(node_id))).await;
        for (node_id, entry) in pending.into_iter().zip(polled) {
            fresh.insert(node_id, entry?);
        }
        for (node_id, entry) in &fresh {
            debug!(
                "{}: {} ({} capabilities)",
                node_id,
                entry.connection_status,
                entry.available_capabilities.len()
            );
        }

        let count = fresh.len();
        *self.cache.write().await = fresh;
        set_capability_cache_size(count);
        info!("Capability sync complete, {} devices cached", count);
        Ok(count)
    }

    /// Re-read one node. A node the controller no longer knows is evicted.
    pub async fn refresh(&self, node_id: &str) -> Result<CapabilityEntry> {
        info!("Refreshing capabilities for {}", node_id);

        let raw = match self.controller.send(&build_status(node_id)).await {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => {
                self.evict(node_id).await;
                return Err(Error::device_not_found(format!(
                    "node '{}' not found in controller topology",
                    node_id
                )));
            }
            Err(err) => return Err(err.into()),
        };

        let node = first_node(&raw).ok_or_else(|| {
            Error::internal(format!("unexpected topology response for '{}'", node_id))
        })?;
        let entry = if connection_status(node).is_connected() {
            self.parse_node(node)
        } else {
            self.poll_until_connected(node_id).await?
        };

        self.store(node_id, entry.clone()).await;
        info!(
            "{} refreshed: status={}, capabilities={}",
            node_id,
            entry.connection_status,
            entry.available_capabilities.len()
        );
        Ok(entry)
    }

    /// Bounded wait for a node to finish connecting. Exhaustion caches a
    /// `timeout` entry rather than failing.
    async fn poll_until_connected(&self, node_id: &str) -> Result<CapabilityEntry> {
        let mut poller = Poller::new(self.poll, self.cancel.clone());
        let spec = build_status(node_id);

        while let Some(attempt) = poller.next_attempt().await? {
            debug!("Polling {} (attempt {}/{})", node_id, attempt, self.poll.max_attempts);
            let raw = match self.controller.send(&spec).await {
                Ok(raw) => raw,
                Err(err) => {
                    debug!("Poll {} failed: {}", node_id, err);
                    continue;
                }
            };
            let Some(node) = first_node(&raw) else {
                continue;
            };
            if connection_status(node).is_connected() {
                info!("{} connected after {} polls", node_id, attempt);
                return Ok(self.parse_node(node));
            }
        }

        warn!(
            "{} still not connected after {} polls, caching timeout",
            node_id,
            poller.attempts_made()
        );
        Ok(CapabilityEntry::timed_out(self.clock.now()))
    }

    fn parse_node(&self, node: &Value) -> CapabilityEntry {
        let netconf = get(node, &["netconf-node-topology:netconf-node"]).unwrap_or(node);

        let available: BTreeSet<String> = list(capability_list(
            netconf,
            "available-capabilities",
            "available-capability",
        ))
        .into_iter()
        .filter_map(|cap| match cap {
            Value::String(s) => extract_module_name(s),
            other => text(other, &["capability"]).and_then(|s| extract_module_name(&s)),
        })
        .collect();

        let unavailable = list(capability_list(
            netconf,
            "unavailable-capabilities",
            "unavailable-capability",
        ))
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(UnavailableCapability {
                module: extract_module_name(s).unwrap_or_else(|| s.clone()),
                reason: "unable-to-resolve".to_string(),
            }),
            other => {
                let raw = text(other, &["capability"])?;
                Some(UnavailableCapability {
                    module: extract_module_name(&raw).unwrap_or(raw),
                    reason: text(other, &["failure-reason"]).unwrap_or_else(|| "unknown".to_string()),
                })
            }
        })
        .collect();

        CapabilityEntry {
            available_capabilities: available.into_iter().collect(),
            unavailable_capabilities: unavailable,
            connection_status: connection_status(node),
            last_sync_time: self.clock.now(),
        }
    }

    async fn store(&self, node_id: &str, entry: CapabilityEntry) {
        let mut cache = self.cache.write().await;
        cache.insert(node_id.to_string(), entry);
        set_capability_cache_size(cache.len());
    }

    async fn evict(&self, node_id: &str) {
        let mut cache = self.cache.write().await;
        if cache.remove(node_id).is_some() {
            info!("Evicted {} from capability cache", node_id);
        }
        set_capability_cache_size(cache.len());
    }

    // =========================================================================
    // CAPABILITY GUARD
    // =========================================================================

    /// Cache-only check that `module` is loaded on `node_id`
    pub async fn is_feature_supported(&self, node_id: &str, module: &str) -> FeatureCheck {
        let cache = self.cache.read().await;
        let (supported, reason) = match cache.get(node_id) {
            None => (
                false,
                format!("Device '{}' not cached. Run a capability sync first.", node_id),
            ),
            Some(entry) if !entry.connection_status.is_connected() => (
                false,
                format!(
                    "Device '{}' is not connected (status: {}). Cannot verify capabilities.",
                    node_id, entry.connection_status
                ),
            ),
            Some(entry) if entry.has_module(module) => (
                true,
                format!("Module '{}' is available on '{}'.", module, node_id),
            ),
            Some(entry) => (
                false,
                format!(
                    "Module '{}' is NOT available on '{}'. Device has {} capabilities loaded.",
                    module,
                    node_id,
                    entry.available_capabilities.len()
                ),
            ),
        };

        FeatureCheck {
            node_id: node_id.to_string(),
            capability: module.to_string(),
            supported,
            reason,
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub async fn device_status(&self, node_id: &str) -> Option<CapabilityEntry> {
        self.cache.read().await.get(node_id).cloned()
    }

    pub async fn all_devices(&self) -> BTreeMap<String, CapabilityEntry> {
        self.cache
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn connected_devices(&self) -> Vec<String> {
        let mut connected: Vec<String> = self
            .cache
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.connection_status.is_connected())
            .map(|(node_id, _)| node_id.clone())
            .collect();
        connected.sort();
        connected
    }

    pub async fn summary(&self) -> CapabilitySummary {
        let devices: Vec<DeviceSummary> = self
            .all_devices()
            .await
            .into_iter()
            .map(|(node_id, entry)| DeviceSummary {
                node_id,
                connection_status: entry.connection_status,
                capability_count: entry.available_capabilities.len(),
                unavailable_count: entry.unavailable_capabilities.len(),
                last_sync_time: entry.last_sync_time,
            })
            .collect();

        let mut by_status = BTreeMap::new();
        for device in &devices {
            *by_status
                .entry(device.connection_status.as_str().to_string())
                .or_insert(0) += 1;
        }

        CapabilitySummary {
            total: devices.len(),
            by_status,
            devices,
        }
    }

    // =========================================================================
    // POST-ERROR DIAGNOSIS
    // =========================================================================

    /// Explain a failed intent. One controller read with a short timeout;
    /// every failure is folded into the suggestion.
    pub async fn diagnose_error(&self, node_id: &str, intent: &str, vendor: Vendor, odl_error: &str) -> Diagnosis {
        let mut diagnosis = Diagnosis {
            node_id: node_id.to_string(),
            intent: intent.to_string(),
            odl_error: excerpt(odl_error),
            ..Diagnosis::default()
        };

        let raw = match self
            .controller
            .send_once(&build_status(node_id), self.diagnose_timeout)
            .await
        {
            Ok(raw) => raw,
            Err(crate::ControllerError::Timeout(after)) => {
                diagnosis.suggestion =
                    format!("Diagnosis timed out ({:?}). The controller may be overloaded.", after);
                return diagnosis;
            }
            Err(crate::ControllerError::Status { status, .. }) => {
                diagnosis.suggestion = format!(
                    "Cannot reach device '{}' in the controller (HTTP {}). Check if the device is mounted.",
                    node_id, status
                );
                return diagnosis;
            }
            Err(err) => {
                diagnosis.suggestion = format!("Diagnosis failed: {}", excerpt(&err.to_string()));
                return diagnosis;
            }
        };

        let Some(node) = first_node(&raw) else {
            diagnosis.suggestion = "Unexpected controller response format.".to_string();
            return diagnosis;
        };

        let entry = self.parse_node(node);
        self.store(node_id, entry.clone()).await;

        diagnosis.diagnosed = true;
        diagnosis.connection_status = Some(entry.connection_status);

        if !entry.connection_status.is_connected() {
            diagnosis.suggestion = format!(
                "Device '{}' is not connected (status: {}). The request could not be processed.",
                node_id, entry.connection_status
            );
            return diagnosis;
        }

        let required = required_modules(intent, vendor);
        if required.is_empty() {
            diagnosis.suggestion = format!(
                "Device is connected with {} capabilities, but no module mapping exists for intent '{}'. \
                 The error may be caused by an incorrect payload or path.",
                entry.available_capabilities.len(),
                intent
            );
            return diagnosis;
        }

        diagnosis.required_modules = required.iter().map(|m| m.to_string()).collect();
        diagnosis.missing_modules = required
            .iter()
            .filter(|m| !entry.has_module(m))
            .map(|m| m.to_string())
            .collect();

        diagnosis.suggestion = if diagnosis.missing_modules.is_empty() {
            format!(
                "All required modules ({}) are available. The error is likely caused by an incorrect \
                 payload, path parameters, or device-side rejection.",
                required.join(", ")
            )
        } else {
            format!(
                "Device '{}' is missing YANG module(s): {}. This device may not support '{}', \
                 or the schema was not loaded by the controller.",
                node_id,
                diagnosis.missing_modules.join(", "),
                intent
            )
        };
        diagnosis
    }
}

fn topology_nodes(raw: &Value) -> Vec<&Value> {
    list(get(raw, &["network-topology:topology", "topology"]))
        .into_iter()
        .flat_map(|topology| list(topology.get("node")))
        .collect()
}

fn first_node(raw: &Value) -> Option<&Value> {
    list(get(raw, &["network-topology:node", "node"]))
        .into_iter()
        .next()
}

fn connection_status(node: &Value) -> ConnectionStatus {
    let netconf = get(node, &["netconf-node-topology:netconf-node"]).unwrap_or(node);
    text(netconf, &CONNECTION_STATUS)
        .map(|s| ConnectionStatus::from_controller(&s))
        .unwrap_or(ConnectionStatus::UnableToConnect)
}

fn capability_list<'a>(netconf: &'a Value, container: &str, leaf: &str) -> Option<&'a Value> {
    let prefixed = format!("netconf-node-topology:{}", container);
    get(netconf, &[prefixed.as_str(), container]).and_then(|c| c.get(leaf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedController;
    use nbi_core::{HttpMethod, ManualClock};
    use nbi_drivers::util::{node_path, NETCONF_TOPOLOGY};
    use serde_json::json;

    fn manager(fake: Arc<ScriptedController>) -> CapabilityManager {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        CapabilityManager::new(fake, clock, PollSettings::new(Duration::from_secs(3), 2))
    }

    fn huawei_node(status: &str) -> Value {
        json!({
            "node-id": "NE40E-R1",
            "netconf-node-topology:connection-status": status,
            "netconf-node-topology:available-capabilities": {"available-capability": [
                {"capability": "(urn:huawei:yang:huawei-ospfv2?revision=2021-03-09)huawei-ospfv2"},
                {"capability": "(urn:huawei:yang:huawei-ifm?revision=2020-06-10)huawei-ifm"},
                {"capability": "urn:ietf:params:netconf:base:1.1"}
            ]},
            "netconf-node-topology:unavailable-capabilities": {"unavailable-capability": [
                {"capability": "(urn:huawei:yang:huawei-bgp?revision=2020-01-01)huawei-bgp", "failure-reason": "unable-to-resolve"}
            ]}
        })
    }

    #[test]
    fn test_extract_module_name() {
        assert_eq!(
            extract_module_name("(urn:x?revision=2021-03-09)huawei-ospfv2").as_deref(),
            Some("huawei-ospfv2")
        );
        assert_eq!(
            extract_module_name("urn:ietf:params:netconf:base:1.0").as_deref(),
            Some("urn:ietf:params:netconf:base:1.0")
        );
        assert_eq!(extract_module_name("  "), None);
    }

    #[test]
    fn test_required_modules_longest_prefix() {
        assert_eq!(required_modules("routing.ospf.enable", Vendor::Huawei), &["huawei-ospfv2"]);
        assert_eq!(required_modules("routing.static.add", Vendor::Cisco), &["Cisco-IOS-XE-native"]);
        assert_eq!(required_modules("interface.set_ipv4", Vendor::Huawei), &["huawei-ifm", "huawei-ip"]);
        assert!(required_modules("dhcp.create_pool", Vendor::Cisco).is_empty());
        assert!(required_modules("flow.add", Vendor::OpenFlow).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_node_is_unsupported_without_io() {
        let fake = Arc::new(ScriptedController::new());
        let manager = manager(fake.clone());

        let check = manager.is_feature_supported("unknown-node", "huawei-ospfv2").await;
        assert!(!check.supported);
        assert!(check.reason.contains("not cached"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_parses_connected_nodes() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(
            HttpMethod::Get,
            NETCONF_TOPOLOGY,
            json!({"network-topology:topology": [{
                "topology-id": "topology-netconf",
                "node": [{"node-id": "controller-config"}, huawei_node("connected")]
            }]}),
        );
        let manager = manager(fake.clone());

        assert_eq!(manager.sync_all().await.unwrap(), 1);
        let entry = manager.device_status("NE40E-R1").await.unwrap();
        assert_eq!(entry.connection_status, ConnectionStatus::Connected);
        assert!(entry.available_capabilities.contains(&"huawei-ospfv2".to_string()));
        assert!(!entry.available_capabilities.contains(&"huawei-bgp".to_string()));
        assert_eq!(entry.unavailable_capabilities[0].module, "huawei-bgp");
        assert_eq!(entry.unavailable_capabilities[0].reason, "unable-to-resolve");

        assert!(manager.is_feature_supported("NE40E-R1", "HUAWEI-OSPFV2").await.supported);
        assert!(!manager.is_feature_supported("NE40E-R1", "huawei-bgp").await.supported);
        assert_eq!(manager.connected_devices().await, vec!["NE40E-R1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connecting_node_times_out() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(
            HttpMethod::Get,
            NETCONF_TOPOLOGY,
            json!({"network-topology:topology": [{"node": [huawei_node("connecting")]}]}),
        );
        fake.on(
            HttpMethod::Get,
            node_path("NE40E-R1"),
            json!({"network-topology:node": [huawei_node("connecting")]}),
        );
        let manager = manager(fake.clone());
        let start = tokio::time::Instant::now();

        manager.sync_all().await.unwrap();
        // two polls, each one full interval after the last read
        assert!(start.elapsed() >= Duration::from_secs(6));
        let entry = manager.device_status("NE40E-R1").await.unwrap();
        assert_eq!(entry.connection_status, ConnectionStatus::Timeout);
        assert!(entry.available_capabilities.is_empty());
        assert_eq!(fake.count(HttpMethod::Get, &node_path("NE40E-R1")), 2);

        let check = manager.is_feature_supported("NE40E-R1", "huawei-ifm").await;
        assert!(!check.supported);
        assert!(check.reason.contains("not connected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connecting_node_recovers_while_polling() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(
            HttpMethod::Get,
            NETCONF_TOPOLOGY,
            json!({"network-topology:topology": [{"node": [huawei_node("connecting")]}]}),
        );
        fake.on(HttpMethod::Get, node_path("NE40E-R1"), json!({"network-topology:node": [huawei_node("connecting")]}))
            .on(HttpMethod::Get, node_path("NE40E-R1"), json!({"network-topology:node": [huawei_node("connected")]}));
        let manager = manager(fake);

        manager.sync_all().await.unwrap();
        let entry = manager.device_status("NE40E-R1").await.unwrap();
        assert_eq!(entry.connection_status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_refresh_evicts_missing_node() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(HttpMethod::Get, node_path("NE40E-R1"), json!({"network-topology:node": [huawei_node("connected")]}))
            .status(HttpMethod::Get, node_path("NE40E-R1"), 404);
        let manager = manager(fake);

        manager.refresh("NE40E-R1").await.unwrap();
        assert!(manager.device_status("NE40E-R1").await.is_some());

        let err = manager.refresh("NE40E-R1").await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert!(manager.device_status("NE40E-R1").await.is_none());
    }

    #[tokio::test]
    async fn test_diagnose_missing_module() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(HttpMethod::Get, node_path("NE40E-R1"), json!({"network-topology:node": [huawei_node("connected")]}));
        let manager = manager(fake);

        let diagnosis = manager
            .diagnose_error("NE40E-R1", "vlan.create", Vendor::Huawei, &"e".repeat(500))
            .await;
        assert!(diagnosis.diagnosed);
        assert_eq!(diagnosis.missing_modules, vec!["huawei-vlan".to_string()]);
        assert_eq!(diagnosis.odl_error.len(), 300);

        let diagnosis = manager
            .diagnose_error("NE40E-R1", "routing.ospf.enable", Vendor::Huawei, "bad")
            .await;
        assert!(diagnosis.missing_modules.is_empty());
        assert!(diagnosis.suggestion.contains("All required modules"));
    }

    #[tokio::test]
    async fn test_diagnose_swallows_controller_errors() {
        let fake = Arc::new(ScriptedController::new());
        let manager = manager(fake);

        let diagnosis = manager
            .diagnose_error("ghost", "interface.enable", Vendor::Cisco, "boom")
            .await;
        assert!(!diagnosis.diagnosed);
        assert!(diagnosis.suggestion.contains("HTTP 404"));
    }

    #[tokio::test]
    async fn test_summary_counts_by_status() {
        let fake = Arc::new(ScriptedController::new());
        fake.on(HttpMethod::Get, node_path("NE40E-R1"), json!({"network-topology:node": [huawei_node("connected")]}));
        let manager = manager(fake);
        manager.refresh("NE40E-R1").await.unwrap();

        let summary = manager.summary().await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.by_status.get("connected"), Some(&1));
        assert_eq!(summary.devices[0].capability_count, 3);
    }
}
