//! Intent execution: registry check, device lookup, live mount gate,
//! capability gate, driver build, controller call and normalization for one
//! request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use nbi_core::{Clock, ConnectionStatus, Error, Result, Vendor};
use nbi_drivers::normalize::device::{node_list, node_status};
use nbi_drivers::{
    build_list, build_status, normalize, DriverRegistry, Intent, IntentCategory, IntentRegistry,
    NormalizeContext, Params,
};
use nbi_store::{DeviceRecord, DeviceStore};

use crate::capability::{required_modules, CapabilityManager};
use crate::controller::Controller;
use crate::mount::MountService;

#[derive(Debug, Clone, Deserialize)]
pub struct IntentRequest {
    pub intent: String,
    pub node_id: String,
    #[serde(default)]
    pub params: Params,
}

impl IntentRequest {
    pub fn new(intent: impl Into<String>, node_id: impl Into<String>, params: Params) -> Self {
        Self {
            intent: intent.into(),
            node_id: node_id.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntentResponse {
    pub success: bool,
    pub intent: String,
    pub node_id: String,
    pub driver_used: String,
    pub result: Value,
}

pub struct IntentService {
    controller: Arc<dyn Controller>,
    devices: Arc<dyn DeviceStore>,
    drivers: Arc<DriverRegistry>,
    mounts: Arc<MountService>,
    clock: Arc<dyn Clock>,
    capabilities: Option<Arc<CapabilityManager>>,
}

impl IntentService {
    pub fn new(
        controller: Arc<dyn Controller>,
        devices: Arc<dyn DeviceStore>,
        drivers: Arc<DriverRegistry>,
        mounts: Arc<MountService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            controller,
            devices,
            drivers,
            mounts,
            clock,
            capabilities: None,
        }
    }

    /// Attach a capability manager. Intents needing a YANG module that a
    /// cached, connected node lacks are refused before anything is sent, and
    /// controller failures carry a diagnosis hint.
    pub fn with_capabilities(mut self, capabilities: Arc<CapabilityManager>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub async fn handle(&self, req: &IntentRequest) -> Result<IntentResponse> {
        let intent: Intent = req.intent.parse()?;

        let missing = IntentRegistry::validate_params(&req.intent, &req.params);
        if !missing.is_empty() {
            return Err(Error::invalid_params(format!(
                "Missing params for {}: {}",
                req.intent,
                missing.join(", ")
            )));
        }

        if intent.category() == IntentCategory::Device {
            return self.handle_device_intent(intent, req).await;
        }

        let device = self
            .devices
            .find_device_by_node_id(&req.node_id)
            .await?
            .ok_or_else(|| Error::device_not_found(req.node_id.clone()))?;
        if !device.is_openflow() {
            self.ensure_connected(&req.node_id).await?;
        }

        self.execute(intent, req, &device).await
    }

    async fn ensure_connected(&self, node_id: &str) -> Result<()> {
        let live = self.mounts.connection_status(node_id).await;
        if live.connection_status.is_connected() {
            return Ok(());
        }
        Err(Error::not_mounted(match live.connection_status {
            ConnectionStatus::NotMounted => {
                format!("Device '{}' is not mounted. Mount it first.", node_id)
            }
            ConnectionStatus::Connecting => format!(
                "Device '{}' is still connecting. Please wait and try again.",
                node_id
            ),
            other => format!(
                "Device '{}' is not connected (status: {}). Check device connectivity.",
                node_id, other
            ),
        }))
    }

    /// Only nodes the cache has seen connected are checked; the live mount
    /// gate already covers the rest.
    async fn ensure_capable(&self, intent: Intent, node_id: &str, vendor: Vendor) -> Result<()> {
        let Some(capabilities) = &self.capabilities else {
            return Ok(());
        };
        match capabilities.device_status(node_id).await {
            Some(entry) if entry.connection_status.is_connected() => {}
            _ => return Ok(()),
        }

        for module in required_modules(intent.as_str(), vendor) {
            let check = capabilities.is_feature_supported(node_id, module).await;
            if !check.supported {
                warn!("{} refused on {}: {}", intent, node_id, check.reason);
                return Err(Error::unsupported_intent(format!(
                    "{} on {}: {}",
                    intent, node_id, check.reason
                )));
            }
        }
        Ok(())
    }

    async fn execute(&self, intent: Intent, req: &IntentRequest, device: &DeviceRecord) -> Result<IntentResponse> {
        let profile = device.profile()?;
        self.ensure_capable(intent, &req.node_id, profile.vendor).await?;
        let spec = self.drivers.build(&profile, intent, &req.params)?;
        info!("Intent: {}, Device: {}, Driver: {}", intent, req.node_id, profile.vendor);
        debug!("RequestSpec: {} {}", spec.method, spec.path);

        let raw = match self.controller.send(&spec).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.diagnosed(intent, &req.node_id, profile.vendor, err.into()).await),
        };

        let ctx = NormalizeContext::new(&req.node_id, profile.vendor, self.clock.now());
        let result = normalize(intent, &ctx, &raw)?;

        Ok(IntentResponse {
            success: true,
            intent: req.intent.clone(),
            node_id: req.node_id.clone(),
            driver_used: profile.vendor.to_string(),
            result,
        })
    }

    async fn handle_device_intent(&self, intent: Intent, req: &IntentRequest) -> Result<IntentResponse> {
        let spec = match intent {
            Intent::DeviceStatus => build_status(&req.node_id),
            Intent::DeviceList => build_list(),
            other => return Err(Error::unsupported_intent(other.as_str())),
        };
        info!("Device intent: {}, Node: {}", intent, req.node_id);
        debug!("RequestSpec: {} {}", spec.method, spec.path);

        let raw = self.controller.send(&spec).await?;
        let result = match intent {
            Intent::DeviceStatus => serde_json::to_value(node_status(&raw))?,
            _ => serde_json::to_value(node_list(&raw))?,
        };

        Ok(IntentResponse {
            success: true,
            intent: req.intent.clone(),
            node_id: req.node_id.clone(),
            driver_used: "device".to_string(),
            result,
        })
    }

    async fn diagnosed(&self, intent: Intent, node_id: &str, vendor: Vendor, err: Error) -> Error {
        let Some(capabilities) = &self.capabilities else {
            return err;
        };
        if !matches!(err, Error::Controller { .. }) {
            return err;
        }
        let diagnosis = capabilities
            .diagnose_error(node_id, intent.as_str(), vendor, &err.to_string())
            .await;
        warn!("{} on {} failed: {}", intent, node_id, diagnosis.suggestion);
        err.with_suggestion(diagnosis.suggestion)
    }

    pub fn supported_intents(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        IntentRegistry::supported_intents()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedController;
    use chrono::Utc;
    use nbi_core::{HttpMethod, ManagementProtocol, ManualClock, PollSettings};
    use nbi_drivers::util::{mount_base, node_path};
    use nbi_store::SqliteStore;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        service: IntentService,
        fake: Arc<ScriptedController>,
        capabilities: Arc<CapabilityManager>,
    }

    async fn harness(diagnose: bool) -> Harness {
        let fake = Arc::new(ScriptedController::new());
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let device = DeviceRecord::new("csr1", Vendor::Cisco, ManagementProtocol::Netconf)
            .with_node_id("csr1")
            .with_ip("10.0.0.1")
            .with_credentials("admin", "admin");
        store.create_device(&device).await.unwrap();

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let poll = PollSettings::new(Duration::from_secs(1), 1);
        let mounts = Arc::new(MountService::new(fake.clone(), store.clone(), clock.clone(), poll));
        let mut service = IntentService::new(
            fake.clone(),
            store,
            Arc::new(DriverRegistry::with_defaults()),
            mounts,
            clock.clone(),
        );
        let capabilities = Arc::new(CapabilityManager::new(fake.clone(), clock, poll));
        if diagnose {
            service = service.with_capabilities(capabilities.clone());
        }
        Harness { service, fake, capabilities }
    }

    fn connected(fake: &ScriptedController) {
        connected_with(fake, &[]);
    }

    fn connected_with(fake: &ScriptedController, modules: &[&str]) {
        let available: Vec<Value> = modules
            .iter()
            .map(|m| json!({"capability": format!("(http://cisco.com/ns/yang/{m}?revision=2021-03-01){m}")}))
            .collect();
        fake.on(
            HttpMethod::Get,
            node_path("csr1"),
            json!({"network-topology:node": [{
                "node-id": "csr1",
                "netconf-node-topology:connection-status": "connected",
                "netconf-node-topology:available-capabilities": {"available-capability": available}
            }]}),
        );
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let h = harness(false).await;
        let err = h
            .service
            .handle(&IntentRequest::new("interface.explode", "csr1", Params::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedIntent(_)));
        assert!(h.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_params_rejected_before_io() {
        let h = harness(false).await;
        let err = h
            .service
            .handle(&IntentRequest::new("interface.set_ipv4", "csr1", params(json!({"interface": "GigabitEthernet1"}))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        assert!(err.to_string().contains("ip"));
        assert!(h.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let h = harness(false).await;
        let err = h
            .service
            .handle(&IntentRequest::new("show.interfaces", "nope", Params::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_not_mounted_blocks_the_call() {
        let h = harness(false).await;
        let err = h
            .service
            .handle(&IntentRequest::new("show.interfaces", "csr1", Params::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotMounted(_)));
        assert_eq!(h.fake.count_method(HttpMethod::Get), 1);
    }

    #[tokio::test]
    async fn test_set_ipv4_goes_through_cisco_driver() {
        let h = harness(false).await;
        connected(&h.fake);

        let resp = h
            .service
            .handle(&IntentRequest::new(
                "interface.set_ipv4",
                "csr1",
                params(json!({"interface": "GigabitEthernet0/0/1", "ip": "10.0.0.1", "prefix": 24})),
            ))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.driver_used, "cisco");

        let write = h
            .fake
            .calls()
            .into_iter()
            .find(|c| c.method == HttpMethod::Patch)
            .unwrap();
        assert!(write.path.ends_with("interface/GigabitEthernet=0%2F0%2F1"));
        assert!(write.payload.unwrap().to_string().contains("255.255.255.0"));
    }

    #[tokio::test]
    async fn test_show_interfaces_is_normalized() {
        let h = harness(false).await;
        connected(&h.fake);
        h.fake.on(
            HttpMethod::Get,
            format!("{}/Cisco-IOS-XE-native:native/interface", mount_base("csr1")),
            json!({"Cisco-IOS-XE-native:interface": {"GigabitEthernet": [{"name": "1"}]}}),
        );

        let resp = h
            .service
            .handle(&IntentRequest::new("show.interfaces", "csr1", Params::new()))
            .await
            .unwrap();
        assert_eq!(resp.result["total_count"], 1);
        assert_eq!(resp.result["interfaces"][0]["name"], "GigabitEthernet1");
    }

    #[tokio::test]
    async fn test_device_status_needs_no_record() {
        let h = harness(false).await;
        h.fake.on(
            HttpMethod::Get,
            node_path("ghost"),
            json!({"network-topology:node": [{
                "node-id": "ghost",
                "netconf-node-topology:connection-status": "connecting"
            }]}),
        );

        let resp = h
            .service
            .handle(&IntentRequest::new("device.status", "ghost", Params::new()))
            .await
            .unwrap();
        assert_eq!(resp.driver_used, "device");
        assert_eq!(resp.result["connection_status"], "connecting");
    }

    #[tokio::test]
    async fn test_missing_module_is_refused_before_sending() {
        let h = harness(true).await;
        connected_with(&h.fake, &["Cisco-IOS-XE-ospf"]);
        h.capabilities.refresh("csr1").await.unwrap();

        let err = h
            .service
            .handle(&IntentRequest::new("show.interfaces", "csr1", Params::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedIntent(_)));
        assert!(err.to_string().contains("Cisco-IOS-XE-native"));
        let native = format!("{}/Cisco-IOS-XE-native:native/interface", mount_base("csr1"));
        assert_eq!(h.fake.count(HttpMethod::Get, &native), 0);
    }

    #[tokio::test]
    async fn test_cached_module_lets_the_call_through() {
        let h = harness(true).await;
        connected_with(&h.fake, &["Cisco-IOS-XE-native"]);
        h.capabilities.refresh("csr1").await.unwrap();
        let native = format!("{}/Cisco-IOS-XE-native:native/interface", mount_base("csr1"));
        h.fake.on(HttpMethod::Get, native.clone(), json!({"Cisco-IOS-XE-native:interface": {}}));

        let resp = h
            .service
            .handle(&IntentRequest::new("show.interfaces", "csr1", Params::new()))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(h.fake.count(HttpMethod::Get, &native), 1);
    }

    #[tokio::test]
    async fn test_controller_failure_carries_diagnosis() {
        let h = harness(true).await;
        connected(&h.fake);
        h.fake.status(
            HttpMethod::Get,
            format!("{}/Cisco-IOS-XE-native:native/interface", mount_base("csr1")),
            500,
        );

        let err = h
            .service
            .handle(&IntentRequest::new("show.interfaces", "csr1", Params::new()))
            .await
            .unwrap_err();
        match err {
            Error::Controller { status, suggestion, .. } => {
                assert_eq!(status, Some(500));
                assert!(suggestion.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
