//! OpenFlow rule lifecycle
//!
//! Every write follows the same protocol: persist the rule as PENDING, send
//! it to the controller inventory, then mark it ACTIVE or FAILED. A crash in
//! between leaves a PENDING row that [`FlowEngine::sync`] reports and
//! [`FlowEngine::retry_flow`] repairs.
//!
//! Writers to the same `(node_id, flow_id, table_id)` are serialized inside
//! the process by a per-key async mutex.

use chrono::Duration as ChronoDuration;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use nbi_core::{Clock, Datastore, Error, RequestSpec, Result, Vendor};
use nbi_drivers::drivers::openflow::{flow_path, inventory_node_path, table_path};
use nbi_drivers::normalize::flows::{flow_entries, flow_table};
use nbi_drivers::normalize::schema::FlowTable;
use nbi_drivers::{Intent, NormalizeContext};
use nbi_store::metrics::{record_flow_transition, record_sync_result};
use nbi_store::{
    DeviceRecord, DeviceStore, FlowDirection, FlowFilter, FlowKey, FlowRule, FlowStatus, FlowStore, DEFAULT_TABLE,
};

use super::templates::{flow_body, FlowRequest, FlowTemplate};
use crate::controller::Controller;

const DRIVER: &str = "openflow";

/// PENDING rows untouched for longer than this are reported by sync
const STALE_PENDING_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct FlowSyncReport {
    pub node_id: String,
    pub table_id: u32,
    /// ACTIVE in storage, absent on the controller; now DELETED
    pub zombies: Vec<String>,
    /// On the controller, unknown to storage; reported only
    pub unmanaged: Vec<String>,
    pub stale_pending: Vec<String>,
    pub active_confirmed: usize,
}

pub struct FlowEngine {
    controller: Arc<dyn Controller>,
    devices: Arc<dyn DeviceStore>,
    flows: Arc<dyn FlowStore>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<FlowKey, Arc<AsyncMutex<()>>>>,
}

impl FlowEngine {
    pub fn new(
        controller: Arc<dyn Controller>,
        devices: Arc<dyn DeviceStore>,
        flows: Arc<dyn FlowStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            controller,
            devices,
            flows,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    // =========================================================================
    // ADD
    // =========================================================================

    /// Install a template on a switch. Bidirectional base connectivity
    /// produces two paired rules, `<id>-forward` and `<id>-reverse`.
    pub async fn add_flow(&self, node_id: &str, request: &FlowRequest) -> Result<Vec<FlowRule>> {
        if request.flow_id.trim().is_empty() {
            return Err(Error::invalid_params("flow_id must not be empty"));
        }

        let device = self.openflow_device(node_id).await?;
        let ports = self.resolve_ports(&device, &request.template).await?;
        let details = request.template.resolve(&ports)?;

        let table_id = request.table_id.unwrap_or(DEFAULT_TABLE);
        let priority = request.priority.unwrap_or_else(|| details.default_priority());
        let key = FlowKey::new(node_id, request.flow_id.as_str(), table_id);
        let now = self.clock.now();

        if !request.template.is_bidirectional() {
            let rule = FlowRule::new(key, priority, details, now);
            let _guards = self.lock_keys(&[rule.key()]).await;
            return Ok(vec![self.push(rule).await?]);
        }

        let reverse_details = details
            .reversed()
            .ok_or_else(|| Error::invalid_params(format!("{} cannot be bidirectional", details.flow_type())))?;
        let forward_id = format!("{}{}", request.flow_id, FlowDirection::Forward.suffix());
        let reverse_id = format!("{}{}", request.flow_id, FlowDirection::Reverse.suffix());

        let forward = FlowRule::new(key.pair(&forward_id), priority, details, now)
            .paired_with(reverse_id.as_str(), FlowDirection::Forward);
        let reverse = FlowRule::new(key.pair(&reverse_id), priority, reverse_details, now)
            .paired_with(forward_id.as_str(), FlowDirection::Reverse);
        self.install_pair(forward, reverse).await
    }

    /// Both rows are PENDING before either PUT goes out, so a failure on
    /// one half always leaves the other half stored and FAILED.
    async fn install_pair(&self, forward: FlowRule, reverse: FlowRule) -> Result<Vec<FlowRule>> {
        let _guards = self.lock_keys(&[forward.key(), reverse.key()]).await;

        // both payloads must build before either row is written
        flow_body(&forward)?;
        flow_body(&reverse)?;

        let forward = self.stage(forward).await?;
        let reverse = self.stage(reverse).await?;

        let forward = match self.send_staged(forward).await {
            Ok(forward) => forward,
            Err(err) => {
                self.fail_sibling(&reverse, &err).await;
                return Err(err);
            }
        };
        match self.send_staged(reverse).await {
            Ok(reverse) => Ok(vec![forward, reverse]),
            Err(err) => {
                warn!("Rolling back {} after its pair failed", forward.key());
                if let Err(delete_err) = self.remove_from_controller(&forward.key()).await {
                    warn!("Rollback delete of {} failed: {}", forward.key(), delete_err);
                }
                self.fail_sibling(&forward, &err).await;
                Err(err)
            }
        }
    }

    /// Mark one half FAILED because the other half failed. Best effort.
    async fn fail_sibling(&self, sibling: &FlowRule, cause: &Error) {
        let key = sibling.key();
        let message = format!("pair flow failed: {}", cause);
        match self
            .flows
            .set_flow_status(&key, FlowStatus::Failed, Some(&message), self.clock.now())
            .await
        {
            Ok(()) => record_flow_transition(sibling.status.as_str(), FlowStatus::Failed.as_str()),
            Err(err) => warn!("Could not mark {} failed: {}", key, err),
        }
    }

    /// PENDING, PUT, then ACTIVE or FAILED. Callers hold the key lock.
    async fn push(&self, rule: FlowRule) -> Result<FlowRule> {
        flow_body(&rule)?;
        let staged = self.stage(rule).await?;
        self.send_staged(staged).await
    }

    /// Persist the rule as PENDING
    async fn stage(&self, rule: FlowRule) -> Result<FlowRule> {
        let key = rule.key();
        let previous = self.flows.get_flow(&key).await?.map(|r| r.status);

        let mut pending = rule;
        pending.status = FlowStatus::Pending;
        pending.error_message = None;
        pending.updated_at = self.clock.now();
        let stored = self.flows.upsert_flow(&pending).await?;
        record_flow_transition(previous.map(|s| s.as_str()).unwrap_or("NEW"), FlowStatus::Pending.as_str());
        Ok(stored)
    }

    async fn send_staged(&self, mut stored: FlowRule) -> Result<FlowRule> {
        let body = flow_body(&stored)?;
        let key = stored.key();
        let spec = RequestSpec::put(flow_path(&key.node_id, key.table_id, &key.flow_id), body)
            .plain_json()
            .tagged(Intent::FlowAdd.as_str(), DRIVER);

        match self.controller.send(&spec).await {
            Ok(_) => {
                self.flows
                    .set_flow_status(&key, FlowStatus::Active, None, self.clock.now())
                    .await?;
                record_flow_transition(FlowStatus::Pending.as_str(), FlowStatus::Active.as_str());
                info!("Flow {} ({}) active", key, stored.flow_type());
                stored.status = FlowStatus::Active;
                Ok(stored)
            }
            Err(err) => {
                let message = err.to_string();
                self.flows
                    .set_flow_status(&key, FlowStatus::Failed, Some(&message), self.clock.now())
                    .await?;
                record_flow_transition(FlowStatus::Pending.as_str(), FlowStatus::Failed.as_str());
                warn!("Flow {} failed: {}", key, message);
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Remove a rule (and its pair) from the switch and mark the rows
    /// DELETED. A flow the controller no longer has counts as removed; one
    /// storage has never seen is rejected.
    pub async fn delete_flow(&self, key: &FlowKey) -> Result<Vec<FlowKey>> {
        let rule = self.require_rule(key).await?;
        let mut keys = vec![key.clone()];
        if let Some(pair) = rule.pair_flow_id.as_deref() {
            keys.push(key.pair(pair));
        }

        let _guards = self.lock_keys(&keys).await;
        for k in &keys {
            self.remove_from_controller(k).await?;
            if let Some(existing) = self.flows.get_flow(k).await? {
                if existing.status != FlowStatus::Deleted {
                    self.flows
                        .set_flow_status(k, FlowStatus::Deleted, None, self.clock.now())
                        .await?;
                    record_flow_transition(existing.status.as_str(), FlowStatus::Deleted.as_str());
                }
            }
            info!("Flow {} deleted", k);
        }
        Ok(keys)
    }

    /// Clear a whole table on the switch; every stored row of it becomes DELETED
    pub async fn reset_table(&self, node_id: &str, table_id: u32) -> Result<u64> {
        let spec = RequestSpec::delete(table_path(node_id, table_id))
            .plain_json()
            .tagged(Intent::FlowDelete.as_str(), DRIVER);
        match self.controller.send(&spec).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => debug!("Table {} on {} already empty", table_id, node_id),
            Err(err) => return Err(err.into()),
        }

        let count = self.flows.mark_table_deleted(node_id, table_id, self.clock.now()).await?;
        info!("Reset table {} on {}: {} rules marked deleted", table_id, node_id, count);
        Ok(count)
    }

    /// Drop rows from storage. Only FAILED or DELETED rules qualify; the
    /// pair row goes with them.
    pub async fn hard_delete(&self, key: &FlowKey) -> Result<Vec<FlowKey>> {
        let rule = self.require_rule(key).await?;
        ensure_removable(&rule)?;

        let mut keys = vec![key.clone()];
        if let Some(pair_id) = rule.pair_flow_id.as_deref() {
            if let Some(pair) = self.flows.get_flow(&key.pair(pair_id)).await? {
                ensure_removable(&pair)?;
                keys.push(pair.key());
            }
        }

        let _guards = self.lock_keys(&keys).await;
        for k in &keys {
            self.flows.delete_flow(k).await?;
            info!("Flow {} removed from storage", k);
        }
        Ok(keys)
    }

    async fn remove_from_controller(&self, key: &FlowKey) -> Result<()> {
        let spec = RequestSpec::delete(flow_path(&key.node_id, key.table_id, &key.flow_id))
            .plain_json()
            .tagged(Intent::FlowDelete.as_str(), DRIVER);
        match self.controller.send(&spec).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!("Flow {} not on controller", key);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    // =========================================================================
    // RETRY / REACTIVATE
    // =========================================================================

    /// Push a FAILED or PENDING rule again from its stored match details
    pub async fn retry_flow(&self, key: &FlowKey) -> Result<Vec<FlowRule>> {
        let rule = self.require_rule(key).await?;
        if !matches!(rule.status, FlowStatus::Failed | FlowStatus::Pending) {
            return Err(Error::Conflict(format!(
                "flow {} is {}; only FAILED or PENDING flows can be retried",
                key, rule.status
            )));
        }
        self.repush(rule, &[FlowStatus::Failed, FlowStatus::Pending]).await
    }

    /// Reinstall a DELETED rule
    pub async fn reactivate_flow(&self, key: &FlowKey) -> Result<Vec<FlowRule>> {
        let rule = self.require_rule(key).await?;
        if rule.status != FlowStatus::Deleted {
            return Err(Error::Conflict(format!(
                "flow {} is {}; only DELETED flows can be reactivated",
                key, rule.status
            )));
        }
        self.repush(rule, &[FlowStatus::Deleted]).await
    }

    async fn repush(&self, rule: FlowRule, eligible: &[FlowStatus]) -> Result<Vec<FlowRule>> {
        let pair = match rule.pair_flow_id.as_deref() {
            Some(pair_id) => match self.flows.get_flow(&rule.key().pair(pair_id)).await? {
                Some(pair) => Some(pair).filter(|p| eligible.contains(&p.status)),
                None => Some(self.rebuild_sibling(&rule, pair_id)?),
            },
            None => None,
        };

        match pair {
            Some(pair) if rule.direction == Some(FlowDirection::Reverse) => self.install_pair(pair, rule).await,
            Some(pair) => self.install_pair(rule, pair).await,
            None => {
                let _guards = self.lock_keys(&[rule.key()]).await;
                Ok(vec![self.push(rule).await?])
            }
        }
    }

    /// Recreate a pair half whose row is gone from the surviving half
    fn rebuild_sibling(&self, rule: &FlowRule, pair_id: &str) -> Result<FlowRule> {
        let details = rule.match_details.reversed().ok_or_else(|| {
            Error::invalid_params(format!("{} cannot be bidirectional", rule.flow_type()))
        })?;
        let direction = match rule.direction {
            Some(FlowDirection::Reverse) => FlowDirection::Forward,
            _ => FlowDirection::Reverse,
        };
        warn!("Pair row {} missing for {}, rebuilding it", pair_id, rule.key());
        Ok(
            FlowRule::new(rule.key().pair(pair_id), rule.priority, details, self.clock.now())
                .paired_with(rule.flow_id.as_str(), direction),
        )
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Compare one table on the switch with storage. Zombies are marked
    /// DELETED; unmanaged flows are left alone.
    pub async fn sync(&self, node_id: &str, table_id: u32) -> Result<FlowSyncReport> {
        let live = self.controller_flow_ids(node_id, table_id).await?;
        let rows = self
            .flows
            .list_flows(&FlowFilter::node(node_id).table(table_id))
            .await?;
        let known: HashSet<&str> = rows.iter().map(|r| r.flow_id.as_str()).collect();
        let stale_before = self.clock.now() - ChronoDuration::seconds(STALE_PENDING_SECS);

        let mut report = FlowSyncReport {
            node_id: node_id.to_string(),
            table_id,
            zombies: Vec::new(),
            unmanaged: Vec::new(),
            stale_pending: Vec::new(),
            active_confirmed: 0,
        };

        for rule in &rows {
            match rule.status {
                FlowStatus::Active if live.contains(&rule.flow_id) => report.active_confirmed += 1,
                FlowStatus::Active => {
                    let key = rule.key();
                    let _guards = self.lock_keys(std::slice::from_ref(&key)).await;
                    // an add may have raced the controller read
                    let current = self.flows.get_flow(&key).await?.map(|r| r.status);
                    if current != Some(FlowStatus::Active) {
                        continue;
                    }
                    warn!("Zombie flow {}: active in storage, missing on controller", key);
                    self.flows
                        .set_flow_status(
                            &key,
                            FlowStatus::Deleted,
                            Some("missing on controller during sync"),
                            self.clock.now(),
                        )
                        .await?;
                    record_flow_transition(FlowStatus::Active.as_str(), FlowStatus::Deleted.as_str());
                    report.zombies.push(rule.flow_id.clone());
                }
                FlowStatus::Pending if rule.updated_at < stale_before => {
                    report.stale_pending.push(rule.flow_id.clone());
                }
                _ => {}
            }
        }

        let mut unmanaged: Vec<String> = live
            .iter()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        unmanaged.sort();
        for flow_id in &unmanaged {
            debug!("Unmanaged flow {} on {} table {}", flow_id, node_id, table_id);
        }
        report.unmanaged = unmanaged;

        record_sync_result("zombie", report.zombies.len());
        record_sync_result("unmanaged", report.unmanaged.len());
        record_sync_result("stale_pending", report.stale_pending.len());
        info!(
            "Flow sync {} table {}: {} confirmed, {} zombies, {} unmanaged, {} stale pending",
            node_id,
            table_id,
            report.active_confirmed,
            report.zombies.len(),
            report.unmanaged.len(),
            report.stale_pending.len()
        );
        Ok(report)
    }

    async fn controller_flow_ids(&self, node_id: &str, table_id: u32) -> Result<HashSet<String>> {
        let raw = self.read_inventory(table_path(node_id, table_id)).await?;
        Ok(flow_entries(&raw)
            .into_iter()
            .filter(|f| f.table_id == table_id)
            .map(|f| f.flow_id)
            .collect())
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// What the controller reports as installed, one table or the whole node
    pub async fn get_flows(&self, node_id: &str, table_id: Option<u32>) -> Result<FlowTable> {
        let path = match table_id {
            Some(table_id) => table_path(node_id, table_id),
            None => inventory_node_path(node_id),
        };
        let raw = self.read_inventory(path).await?;
        let ctx = NormalizeContext::new(node_id, Vendor::OpenFlow, self.clock.now());
        Ok(flow_table(&ctx, &raw))
    }

    pub async fn list_rules(&self, filter: &FlowFilter) -> Result<Vec<FlowRule>> {
        Ok(self.flows.list_flows(filter).await?)
    }

    pub async fn get_rule(&self, key: &FlowKey) -> Result<Option<FlowRule>> {
        Ok(self.flows.get_flow(key).await?)
    }

    /// Operational inventory read; a missing node or table is empty
    async fn read_inventory(&self, path: String) -> Result<Value> {
        let spec = RequestSpec::get(Datastore::Operational, path)
            .plain_json()
            .tagged(Intent::ShowFlows.as_str(), DRIVER);
        match self.controller.send(&spec).await {
            Ok(raw) => Ok(raw),
            Err(err) if err.is_not_found() => Ok(Value::Null),
            Err(err) => Err(err.into()),
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn require_rule(&self, key: &FlowKey) -> Result<FlowRule> {
        self.flows
            .get_flow(key)
            .await?
            .ok_or_else(|| Error::invalid_params(format!("flow {} not found", key)))
    }

    async fn openflow_device(&self, node_id: &str) -> Result<DeviceRecord> {
        let device = self
            .devices
            .find_device_by_node_id(node_id)
            .await?
            .ok_or_else(|| Error::device_not_found(node_id))?;
        if !device.is_openflow() {
            return Err(Error::invalid_params(format!(
                "device '{}' is not managed over OpenFlow",
                device.name
            )));
        }
        Ok(device)
    }

    async fn resolve_ports(&self, device: &DeviceRecord, template: &FlowTemplate) -> Result<HashMap<String, u32>> {
        let mut ports = HashMap::new();
        for name in template.interface_names() {
            let interface = self
                .devices
                .find_interface(device.id, name)
                .await?
                .ok_or_else(|| {
                    Error::invalid_params(format!(
                        "interface '{}' not found on '{}'. Sync OpenFlow topology first.",
                        name, device.name
                    ))
                })?;
            let port = interface.port_number.ok_or_else(|| {
                Error::invalid_params(format!(
                    "interface '{}' on '{}' has no port number. Sync OpenFlow topology first.",
                    name, device.name
                ))
            })?;
            ports.insert(name.to_string(), port);
        }
        Ok(ports)
    }

    /// Lock every key, always in the same order
    async fn lock_keys(&self, keys: &[FlowKey]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&FlowKey> = keys.iter().collect();
        sorted.sort_by(|a, b| {
            (&a.node_id, a.table_id, &a.flow_id).cmp(&(&b.node_id, b.table_id, &b.flow_id))
        });
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            let lock = {
                let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
                locks.entry(key.clone()).or_default().clone()
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

fn ensure_removable(rule: &FlowRule) -> Result<()> {
    if rule.status.allows_hard_delete() {
        return Ok(());
    }
    Err(Error::Conflict(format!(
        "flow {} is {}; delete it from the switch before removing the record",
        rule.key(),
        rule.status
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedController;
    use chrono::Utc;
    use nbi_core::{HttpMethod, ManagementProtocol, ManualClock};
    use nbi_store::{FlowMatchDetails, InterfaceRecord, SqliteStore};
    use serde_json::json;
    use std::time::Duration;

    const NODE: &str = "openflow:1";

    struct Harness {
        engine: FlowEngine,
        fake: Arc<ScriptedController>,
        store: Arc<SqliteStore>,
        clock: Arc<ManualClock>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let switch = DeviceRecord::new("s1", Vendor::OpenFlow, ManagementProtocol::Openflow).with_node_id(NODE);
        let switch = store.create_device(&switch).await.unwrap();
        for (name, port) in [("eth1", 1), ("eth2", 2)] {
            store
                .upsert_interface(&InterfaceRecord::new(switch.id, name).with_port(port))
                .await
                .unwrap();
        }
        store
            .upsert_interface(&InterfaceRecord::new(switch.id, "eth9"))
            .await
            .unwrap();

        let fake = Arc::new(ScriptedController::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = FlowEngine::new(fake.clone(), store.clone(), store.clone(), clock.clone());
        Harness { engine, fake, store, clock }
    }

    fn base(flow_id: &str, bidirectional: bool) -> FlowRequest {
        FlowRequest {
            flow_id: flow_id.to_string(),
            table_id: None,
            priority: None,
            template: FlowTemplate::BaseConnectivity {
                in_interface: "eth1".into(),
                out_interface: "eth2".into(),
                bidirectional,
            },
        }
    }

    fn key(flow_id: &str) -> FlowKey {
        FlowKey::new(NODE, flow_id, 0)
    }

    #[tokio::test]
    async fn test_add_flow_active() {
        let h = harness().await;
        let rules = h.engine.add_flow(NODE, &base("web", false)).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].status, FlowStatus::Active);
        assert_eq!(rules[0].priority, 500);

        let put = &h.fake.calls()[0];
        assert_eq!(put.path, flow_path(NODE, 0, "web"));
        assert_eq!(put.header("Content-Type"), Some("application/json"));
        let flow = &put.payload.as_ref().unwrap()["flow-node-inventory:flow"][0];
        assert_eq!(flow["match"]["in-port"], "1");
    }

    #[tokio::test]
    async fn test_same_key_twice_keeps_one_row() {
        let h = harness().await;
        h.fake
            .on(HttpMethod::Put, flow_path(NODE, 0, "web"), json!({}))
            .status(HttpMethod::Put, flow_path(NODE, 0, "web"), 500);

        h.engine.add_flow(NODE, &base("web", false)).await.unwrap();
        assert!(h.engine.add_flow(NODE, &base("web", false)).await.is_err());

        let rows = h.engine.list_rules(&FlowFilter::node(NODE)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, FlowStatus::Failed);
        assert!(rows[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_bidirectional_pair_and_delete() {
        let h = harness().await;
        let rules = h.engine.add_flow(NODE, &base("web", true)).await.unwrap();
        assert_eq!(rules.len(), 2);

        let forward = h.engine.get_rule(&key("web-forward")).await.unwrap().unwrap();
        let reverse = h.engine.get_rule(&key("web-reverse")).await.unwrap().unwrap();
        assert_eq!(forward.match_details, FlowMatchDetails::BaseConnectivity { in_port: 1, out_port: 2 });
        assert_eq!(reverse.match_details, FlowMatchDetails::BaseConnectivity { in_port: 2, out_port: 1 });
        assert_eq!(forward.pair_flow_id.as_deref(), Some("web-reverse"));
        assert_eq!(reverse.pair_flow_id.as_deref(), Some("web-forward"));
        assert_eq!(forward.status, FlowStatus::Active);
        assert_eq!(reverse.status, FlowStatus::Active);

        let deleted = h.engine.delete_flow(&key("web-reverse")).await.unwrap();
        assert_eq!(deleted.len(), 2);
        for id in ["web-forward", "web-reverse"] {
            let rule = h.engine.get_rule(&key(id)).await.unwrap().unwrap();
            assert_eq!(rule.status, FlowStatus::Deleted);
        }
        assert_eq!(h.fake.count_method(HttpMethod::Delete), 2);
    }

    #[tokio::test]
    async fn test_reverse_failure_rolls_back_forward() {
        let h = harness().await;
        h.fake.status(HttpMethod::Put, flow_path(NODE, 0, "web-reverse"), 400);

        assert!(h.engine.add_flow(NODE, &base("web", true)).await.is_err());
        let forward = h.engine.get_rule(&key("web-forward")).await.unwrap().unwrap();
        assert_eq!(forward.status, FlowStatus::Failed);
        assert_eq!(h.fake.count(HttpMethod::Delete, &flow_path(NODE, 0, "web-forward")), 1);
    }

    #[tokio::test]
    async fn test_forward_failure_keeps_reverse_row_for_retry() {
        let h = harness().await;
        h.fake
            .status(HttpMethod::Put, flow_path(NODE, 0, "web-forward"), 500)
            .on(HttpMethod::Put, flow_path(NODE, 0, "web-forward"), json!({}));

        assert!(h.engine.add_flow(NODE, &base("web", true)).await.is_err());
        let reverse = h.engine.get_rule(&key("web-reverse")).await.unwrap().unwrap();
        assert_eq!(reverse.status, FlowStatus::Failed);
        assert!(reverse.error_message.unwrap().contains("pair flow failed"));
        assert_eq!(h.fake.count(HttpMethod::Put, &flow_path(NODE, 0, "web-reverse")), 0);

        let rules = h.engine.retry_flow(&key("web-forward")).await.unwrap();
        assert_eq!(rules.len(), 2);
        for id in ["web-forward", "web-reverse"] {
            let rule = h.engine.get_rule(&key(id)).await.unwrap().unwrap();
            assert_eq!(rule.status, FlowStatus::Active);
        }
    }

    #[tokio::test]
    async fn test_retry_rebuilds_missing_pair_row() {
        let h = harness().await;
        let orphan = FlowRule::new(
            key("web-forward"),
            500,
            FlowMatchDetails::BaseConnectivity { in_port: 1, out_port: 2 },
            h.clock.now(),
        )
        .paired_with("web-reverse", FlowDirection::Forward);
        h.store.upsert_flow(&orphan).await.unwrap();
        h.store
            .set_flow_status(&orphan.key(), FlowStatus::Failed, Some("HTTP 500"), h.clock.now())
            .await
            .unwrap();

        let rules = h.engine.retry_flow(&key("web-forward")).await.unwrap();
        assert_eq!(rules.len(), 2);
        let reverse = h.engine.get_rule(&key("web-reverse")).await.unwrap().unwrap();
        assert_eq!(reverse.status, FlowStatus::Active);
        assert_eq!(reverse.direction, Some(FlowDirection::Reverse));
        assert_eq!(reverse.pair_flow_id.as_deref(), Some("web-forward"));
        assert_eq!(reverse.match_details, FlowMatchDetails::BaseConnectivity { in_port: 2, out_port: 1 });
    }

    #[tokio::test]
    async fn test_delete_unknown_flow_is_rejected() {
        let h = harness().await;
        let err = h.engine.delete_flow(&key("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        assert!(h.fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_changes_use_engine_clock() {
        let h = harness().await;
        h.engine.add_flow(NODE, &base("a", false)).await.unwrap();
        h.clock.advance(Duration::from_secs(3600));
        h.engine.delete_flow(&key("a")).await.unwrap();

        let rule = h.engine.get_rule(&key("a")).await.unwrap().unwrap();
        assert_eq!(rule.updated_at.timestamp(), h.clock.now().timestamp());
    }

    #[tokio::test]
    async fn test_add_rejects_unresolved_ports() {
        let h = harness().await;
        let mut request = base("web", false);
        request.template = FlowTemplate::DefaultGateway { out_interface: "eth9".into() };
        let err = h.engine.add_flow(NODE, &request).await.unwrap_err();
        assert!(err.to_string().contains("Sync OpenFlow topology first"));

        request.template = FlowTemplate::DefaultGateway { out_interface: "eth7".into() };
        assert!(matches!(h.engine.add_flow(NODE, &request).await, Err(Error::InvalidParams(_))));
        assert!(h.fake.calls().is_empty());
        assert!(h.engine.list_rules(&FlowFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_requires_openflow_device() {
        let h = harness().await;
        let router = DeviceRecord::new("r1", Vendor::Cisco, ManagementProtocol::Netconf).with_node_id("r1");
        h.store.create_device(&router).await.unwrap();

        let err = h.engine.add_flow("r1", &base("web", false)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        let err = h.engine.add_flow("openflow:404", &base("web", false)).await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_sync_marks_zombies() {
        let h = harness().await;
        h.engine.add_flow(NODE, &base("a", false)).await.unwrap();
        h.engine.add_flow(NODE, &base("b", false)).await.unwrap();
        h.fake.on(
            HttpMethod::Get,
            table_path(NODE, 0),
            json!({"flow-node-inventory:table": [{"id": 0, "flow": [{"id": "b", "table_id": 0}]}]}),
        );

        let report = h.engine.sync(NODE, 0).await.unwrap();
        assert_eq!(report.zombies, vec!["a".to_string()]);
        assert!(report.unmanaged.is_empty());
        assert_eq!(report.active_confirmed, 1);

        let a = h.engine.get_rule(&key("a")).await.unwrap().unwrap();
        assert_eq!(a.status, FlowStatus::Deleted);
    }

    #[tokio::test]
    async fn test_sync_reports_unmanaged_and_stale_pending() {
        let h = harness().await;
        let pending = FlowRule::new(key("p"), 10, FlowMatchDetails::ArpFlood, h.clock.now());
        h.store.upsert_flow(&pending).await.unwrap();
        h.clock.advance(Duration::from_secs(61));
        h.fake.on(
            HttpMethod::Get,
            table_path(NODE, 0),
            json!({"flow-node-inventory:table": [{"id": 0, "flow": [{"id": "manual-1"}]}]}),
        );

        let report = h.engine.sync(NODE, 0).await.unwrap();
        assert_eq!(report.unmanaged, vec!["manual-1".to_string()]);
        assert_eq!(report.stale_pending, vec!["p".to_string()]);
        assert!(report.zombies.is_empty());
    }

    #[tokio::test]
    async fn test_sync_missing_table_is_empty() {
        let h = harness().await;
        h.engine.add_flow(NODE, &base("a", false)).await.unwrap();

        // unscripted GET answers 404
        let report = h.engine.sync(NODE, 0).await.unwrap();
        assert_eq!(report.zombies, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_and_reactivate() {
        let h = harness().await;
        h.fake
            .status(HttpMethod::Put, flow_path(NODE, 0, "web"), 503)
            .on(HttpMethod::Put, flow_path(NODE, 0, "web"), json!({}));

        assert!(h.engine.add_flow(NODE, &base("web", false)).await.is_err());
        let rules = h.engine.retry_flow(&key("web")).await.unwrap();
        assert_eq!(rules[0].status, FlowStatus::Active);

        let err = h.engine.retry_flow(&key("web")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        h.engine.delete_flow(&key("web")).await.unwrap();
        let rules = h.engine.reactivate_flow(&key("web")).await.unwrap();
        assert_eq!(rules[0].status, FlowStatus::Active);
    }

    #[tokio::test]
    async fn test_reactivate_pair_from_either_half() {
        let h = harness().await;
        h.engine.add_flow(NODE, &base("web", true)).await.unwrap();
        h.engine.delete_flow(&key("web-forward")).await.unwrap();

        let rules = h.engine.reactivate_flow(&key("web-reverse")).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].flow_id, "web-forward");
        assert!(rules.iter().all(|r| r.status == FlowStatus::Active));
    }

    #[tokio::test]
    async fn test_hard_delete_rules() {
        let h = harness().await;
        h.engine.add_flow(NODE, &base("web", true)).await.unwrap();

        let err = h.engine.hard_delete(&key("web-forward")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        h.engine.delete_flow(&key("web-forward")).await.unwrap();
        let removed = h.engine.hard_delete(&key("web-forward")).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(h.engine.get_rule(&key("web-reverse")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_table() {
        let h = harness().await;
        h.engine.add_flow(NODE, &base("a", false)).await.unwrap();
        h.engine.add_flow(NODE, &base("b", false)).await.unwrap();

        assert_eq!(h.engine.reset_table(NODE, 0).await.unwrap(), 2);
        let active = h
            .engine
            .list_rules(&FlowFilter::node(NODE).status(FlowStatus::Active))
            .await
            .unwrap();
        assert!(active.is_empty());
        assert_eq!(h.fake.count(HttpMethod::Delete, &table_path(NODE, 0)), 1);
    }

    #[tokio::test]
    async fn test_get_flows_controller_view() {
        let h = harness().await;
        h.fake.on(
            HttpMethod::Get,
            inventory_node_path(NODE),
            json!({"opendaylight-inventory:node": [{"id": NODE, "flow-node-inventory:table": [
                {"id": 0, "flow": [{"id": "a", "priority": 500}]},
                {"id": 1, "flow": [{"id": "b"}]}
            ]}]}),
        );

        let table = h.engine.get_flows(NODE, None).await.unwrap();
        assert_eq!(table.flow_count, 2);
        assert_eq!(table.flows[1].table_id, 1);
    }
}
