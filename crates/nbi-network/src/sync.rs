//! Topology reconciliation
//!
//! Brings stored device records in line with what the controller reports.
//! Nothing is created: controller nodes with no matching record are only
//! reported.

use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use nbi_core::{Clock, ConnectionStatus, Datastore, DeviceStatus, ManagementProtocol, RequestSpec, Result};
use nbi_drivers::build_list;
use nbi_drivers::drivers::openflow::INVENTORY_NODES;
use nbi_drivers::normalize::device::node_list;
use nbi_drivers::normalize::{get, list, text};
use nbi_store::{DeviceRecord, DeviceStore, InterfaceRecord};

use crate::controller::Controller;

const CONTROLLER_NODE: &str = "controller-config";

#[derive(Debug, Clone, Serialize)]
pub struct SyncedDevice {
    pub device_id: i64,
    pub name: String,
    pub node_id: String,
    pub connection_status: ConnectionStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub total_nodes: usize,
    pub synced: Vec<SyncedDevice>,
    /// Controller nodes with no device record
    pub not_found: Vec<String>,
    /// Devices whose node vanished from the controller
    pub demoted: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchSync {
    pub device_id: i64,
    pub name: String,
    pub node_id: String,
    pub datapath_id: String,
    pub interfaces: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnknownSwitch {
    pub node_id: String,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OpenFlowSyncReport {
    pub total_nodes: usize,
    pub synced: Vec<SwitchSync>,
    pub not_found: Vec<UnknownSwitch>,
    /// Addresses claimed by more than one switch; skipped
    pub duplicate_ips: Vec<String>,
    /// Devices marked offline because no switch reported their address
    pub offline: Vec<String>,
}

/// One switch from the inventory
struct InventoryNode<'a> {
    node_id: String,
    ip_address: Option<String>,
    raw: &'a Value,
}

pub struct SyncService {
    controller: Arc<dyn Controller>,
    devices: Arc<dyn DeviceStore>,
    clock: Arc<dyn Clock>,
}

impl SyncService {
    pub fn new(controller: Arc<dyn Controller>, devices: Arc<dyn DeviceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            controller,
            devices,
            clock,
        }
    }

    /// Reconcile NETCONF devices against the `topology-netconf` node list
    pub async fn sync_devices(&self) -> Result<SyncReport> {
        let raw = match self.controller.send(&build_list()).await {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => Value::Null,
            Err(err) => return Err(err.into()),
        };
        let nodes: Vec<_> = node_list(&raw)
            .devices
            .into_iter()
            .filter(|n| !n.node_id.is_empty() && n.node_id != CONTROLLER_NODE)
            .collect();

        let mut by_node: HashMap<String, DeviceRecord> = self
            .devices
            .list_devices(Some(ManagementProtocol::Netconf))
            .await?
            .into_iter()
            .filter_map(|d| d.node_id.clone().map(|n| (n, d)))
            .collect();

        let now = self.clock.now();
        let mut report = SyncReport {
            total_nodes: nodes.len(),
            ..SyncReport::default()
        };

        for node in nodes {
            let Some(mut device) = by_node.remove(&node.node_id) else {
                debug!("Controller node {} has no device record", node.node_id);
                report.not_found.push(node.node_id);
                continue;
            };

            let status = ConnectionStatus::from_controller(&node.connection_status);
            device.apply_connection(status, now);
            if device.ip_address.is_none() {
                device.ip_address = node.host.clone();
            }
            self.devices.update_device(&device).await?;

            report.synced.push(SyncedDevice {
                device_id: device.id,
                name: device.name.clone(),
                node_id: node.node_id,
                connection_status: status,
            });
        }

        // whatever is left has a node_id the controller no longer lists
        let mut leftover: Vec<DeviceRecord> = by_node.into_values().collect();
        leftover.sort_by_key(|d| d.id);
        for mut device in leftover {
            if !device.mounted {
                continue;
            }
            warn!("{} vanished from the controller, marking unmounted", device.name);
            device.apply_connection(ConnectionStatus::NotMounted, now);
            self.devices.update_device(&device).await?;
            report.demoted.push(device.name);
        }

        info!(
            "NETCONF sync: {} nodes, {} synced, {} unknown, {} demoted",
            report.total_nodes,
            report.synced.len(),
            report.not_found.len(),
            report.demoted.len()
        );
        Ok(report)
    }

    /// Match OpenFlow switches to devices by management address and import
    /// their ports
    pub async fn sync_openflow(&self) -> Result<OpenFlowSyncReport> {
        let spec = RequestSpec::get(Datastore::Operational, INVENTORY_NODES)
            .plain_json()
            .tagged("openflow.sync", "openflow");
        let raw = match self.controller.send(&spec).await {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => Value::Null,
            Err(err) => return Err(err.into()),
        };

        let nodes = inventory_nodes(&raw);
        let mut report = OpenFlowSyncReport {
            total_nodes: nodes.len(),
            ..OpenFlowSyncReport::default()
        };

        let mut ip_counts: HashMap<&str, usize> = HashMap::new();
        for node in &nodes {
            if let Some(ip) = node.ip_address.as_deref() {
                *ip_counts.entry(ip).or_insert(0) += 1;
            }
        }
        let live_ips: HashSet<&str> = ip_counts.keys().copied().collect();

        let mut devices = self.devices.list_devices(Some(ManagementProtocol::Openflow)).await?;
        let now = self.clock.now();

        for device in devices.iter_mut() {
            let active = device.ip_address.as_deref().is_some_and(|ip| live_ips.contains(ip));
            if !active && device.status != DeviceStatus::Offline {
                device.status = DeviceStatus::Offline;
                device.connection_status = ConnectionStatus::UnableToConnect;
                device.last_synced_at = Some(now);
                self.devices.update_device(device).await?;
                report.offline.push(device.name.clone());
            }
        }

        for node in &nodes {
            let Some(ip) = node.ip_address.as_deref() else {
                report.not_found.push(UnknownSwitch {
                    node_id: node.node_id.clone(),
                    ip_address: None,
                });
                continue;
            };
            if ip_counts.get(ip).copied().unwrap_or(0) > 1 {
                if !report.duplicate_ips.iter().any(|d| d == ip) {
                    warn!("Several switches report {}, skipping", ip);
                    report.duplicate_ips.push(ip.to_string());
                }
                continue;
            }

            let Some(index) = devices.iter().position(|d| d.ip_address.as_deref() == Some(ip)) else {
                report.not_found.push(UnknownSwitch {
                    node_id: node.node_id.clone(),
                    ip_address: Some(ip.to_string()),
                });
                continue;
            };

            // a node id can only belong to one device
            for (i, other) in devices.iter_mut().enumerate() {
                if i != index && other.node_id.as_deref() == Some(node.node_id.as_str()) {
                    info!("Releasing {} from {}", node.node_id, other.name);
                    other.node_id = None;
                    self.devices.update_device(other).await?;
                }
            }

            let device = &mut devices[index];
            let datapath_id = node
                .node_id
                .strip_prefix("openflow:")
                .unwrap_or(&node.node_id)
                .to_string();
            device.node_id = Some(node.node_id.clone());
            device.datapath_id = Some(datapath_id.clone());
            device.mounted = true;
            device.status = DeviceStatus::Online;
            device.connection_status = ConnectionStatus::Connected;
            device.last_synced_at = Some(now);
            self.devices.update_device(device).await?;

            let interfaces = self.import_ports(device.id, node.raw).await?;
            info!("{} -> {} ({} ports)", node.node_id, device.name, interfaces);
            report.synced.push(SwitchSync {
                device_id: device.id,
                name: device.name.clone(),
                node_id: node.node_id.clone(),
                datapath_id,
                interfaces,
            });
        }

        info!(
            "OpenFlow sync: {} switches, {} synced, {} unknown, {} duplicate IPs, {} offline",
            report.total_nodes,
            report.synced.len(),
            report.not_found.len(),
            report.duplicate_ips.len(),
            report.offline.len()
        );
        Ok(report)
    }

    async fn import_ports(&self, device_id: i64, node: &Value) -> Result<usize> {
        let mut count = 0;
        for connector in list(get(node, &["node-connector", "opendaylight-inventory:node-connector"])) {
            let Some(tp_id) = text(connector, &["id"]) else {
                continue;
            };
            let Some(port) = text(connector, &["flow-node-inventory:port-number", "port-number"])
                .and_then(|p| p.parse::<u32>().ok())
            else {
                // LOCAL and other reserved ports
                continue;
            };

            let name = text(connector, &["flow-node-inventory:name", "name"]).unwrap_or_else(|| tp_id.clone());
            let mut interface = InterfaceRecord::new(device_id, name).with_port(port);
            interface.mac_address = text(connector, &["flow-node-inventory:hardware-address", "hardware-address"]);
            interface.tp_id = Some(tp_id);
            self.devices.upsert_interface(&interface).await?;
            count += 1;
        }
        Ok(count)
    }
}

fn inventory_nodes(raw: &Value) -> Vec<InventoryNode<'_>> {
    let container = get(raw, &["opendaylight-inventory:nodes", "nodes"]).unwrap_or(raw);
    list(get(container, &["node", "opendaylight-inventory:node"]))
        .into_iter()
        .filter_map(|node| {
            let node_id = text(node, &["id"])?;
            Some(InventoryNode {
                ip_address: text(node, &["flow-node-inventory:ip-address", "ip-address"]),
                node_id,
                raw: node,
            })
        })
        .collect()
}
