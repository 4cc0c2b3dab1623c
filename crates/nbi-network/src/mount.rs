//! NETCONF mount lifecycle
//!
//! Mounting registers a device's NETCONF session with the controller. The
//! persisted `mounted`/`connection_status` fields are a convenience copy;
//! [`MountService::check_and_sync_status`] is the read path that trusts the
//! controller instead.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use nbi_core::{CancelToken, Clock, ConnectionStatus, DeviceStatus, Error, PollSettings, Poller, Result};
use nbi_drivers::normalize::device::node_status;
use nbi_drivers::{build_mount, build_status, build_unmount, MountParams};
use nbi_store::{DeviceRecord, DeviceStore};

use crate::controller::Controller;

/// Stored mount errors are cut to this many characters
const MOUNT_ERROR_LEN: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct MountOutcome {
    pub device_id: i64,
    pub node_id: String,
    pub connection_status: ConnectionStatus,
    pub already_mounted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveStatus {
    pub node_id: String,
    pub connection_status: ConnectionStatus,
    pub host: Option<String>,
    pub port: Option<u64>,
    pub capability_count: usize,
}

impl LiveStatus {
    fn not_mounted(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            connection_status: ConnectionStatus::NotMounted,
            host: None,
            port: None,
            capability_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub device_id: i64,
    pub node_id: String,
    pub connection_status: ConnectionStatus,
    pub status: DeviceStatus,
    pub mounted: bool,
    /// Whether the stored record disagreed with the controller
    pub changed: bool,
}

pub struct MountService {
    controller: Arc<dyn Controller>,
    devices: Arc<dyn DeviceStore>,
    clock: Arc<dyn Clock>,
    wait: PollSettings,
    cancel: Option<CancelToken>,
}

impl MountService {
    pub fn new(
        controller: Arc<dyn Controller>,
        devices: Arc<dyn DeviceStore>,
        clock: Arc<dyn Clock>,
        wait: PollSettings,
    ) -> Self {
        Self {
            controller,
            devices,
            clock,
            wait,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    async fn load(&self, device_id: i64) -> Result<DeviceRecord> {
        self.devices
            .get_device(device_id)
            .await?
            .ok_or_else(|| Error::device_not_found(format!("device {} not found", device_id)))
    }

    /// Send the NETCONF mount for a stored device
    pub async fn mount_device(&self, device_id: i64) -> Result<MountOutcome> {
        let mut device = self.load(device_id).await?;
        let (node_id, params) = mount_params(&device)?;

        if device.mounted {
            let live = self.connection_status(&node_id).await;
            if live.connection_status.is_connected() {
                info!("{} already mounted and connected", node_id);
                return Ok(MountOutcome {
                    device_id,
                    node_id,
                    connection_status: live.connection_status,
                    already_mounted: true,
                });
            }
        }

        info!("Mounting {} at {}:{}", node_id, params.host, params.port);
        let spec = build_mount(&node_id, &params)?;
        if let Err(err) = self.controller.send(&spec).await {
            warn!("Mount of {} failed: {}", node_id, err);
            device.mounted = false;
            device.connection_status = ConnectionStatus::UnableToConnect;
            device.status = DeviceStatus::Offline;
            device.mount_error = Some(err.to_string().chars().take(MOUNT_ERROR_LEN).collect());
            device.last_synced_at = Some(self.clock.now());
            self.devices.update_device(&device).await?;
            return Err(err.into());
        }

        device.mount_error = None;
        device.apply_connection(ConnectionStatus::Connecting, self.clock.now());

        // the controller may not list the node yet right after the PUT
        let live = self.connection_status(&node_id).await;
        if live.connection_status != ConnectionStatus::NotMounted {
            device.apply_connection(live.connection_status, self.clock.now());
        }
        self.devices.update_device(&device).await?;
        info!("{} mount sent, status={}", node_id, device.connection_status);

        Ok(MountOutcome {
            device_id,
            node_id,
            connection_status: device.connection_status,
            already_mounted: false,
        })
    }

    /// Mount and poll until the session settles or the wait budget runs out.
    /// The final state is persisted either way.
    pub async fn mount_and_wait(&self, device_id: i64) -> Result<MountOutcome> {
        let mut outcome = self.mount_device(device_id).await?;
        if outcome.connection_status.is_settled() {
            return Ok(outcome);
        }

        let mut poller = Poller::new(self.wait, self.cancel.clone());
        let mut last = outcome.connection_status;
        while let Some(attempt) = poller.next_attempt().await? {
            last = self.connection_status(&outcome.node_id).await.connection_status;
            debug!("{} attempt {}: {}", outcome.node_id, attempt, last);
            if last.is_settled() {
                break;
            }
        }

        let final_status = if last.is_settled() {
            last
        } else {
            warn!(
                "{} did not settle after {} polls",
                outcome.node_id,
                poller.attempts_made()
            );
            ConnectionStatus::Timeout
        };

        let mut device = self.load(device_id).await?;
        device.apply_connection(final_status, self.clock.now());
        self.devices.update_device(&device).await?;
        info!("{} mount finished: {}", outcome.node_id, final_status);

        outcome.connection_status = final_status;
        Ok(outcome)
    }

    pub async fn unmount_device(&self, device_id: i64) -> Result<StatusReport> {
        let mut device = self.load(device_id).await?;
        let node_id = require_node_id(&device)?;

        match self.controller.send(&build_unmount(&node_id)).await {
            Ok(_) => info!("Unmounted {}", node_id),
            Err(err) if err.is_not_found() => debug!("{} was not mounted on the controller", node_id),
            Err(err) => return Err(err.into()),
        }

        let changed = device.mounted || device.connection_status != ConnectionStatus::NotMounted;
        device.apply_connection(ConnectionStatus::NotMounted, self.clock.now());
        self.devices.update_device(&device).await?;

        Ok(report(&device, node_id, changed))
    }

    /// Live controller view of one node. Any failure reads as not mounted.
    pub async fn connection_status(&self, node_id: &str) -> LiveStatus {
        match self.controller.send(&build_status(node_id)).await {
            Ok(raw) => {
                let node = node_status(&raw);
                LiveStatus {
                    node_id: node_id.to_string(),
                    connection_status: ConnectionStatus::from_controller(&node.connection_status),
                    host: node.host,
                    port: node.port,
                    capability_count: node.available_capabilities.len(),
                }
            }
            Err(err) => {
                debug!("Status read for {} failed: {}", node_id, err);
                LiveStatus::not_mounted(node_id)
            }
        }
    }

    /// Overwrite the stored connection fields with the controller's view
    pub async fn check_and_sync_status(&self, device_id: i64) -> Result<StatusReport> {
        let mut device = self.load(device_id).await?;
        let node_id = require_node_id(&device)?;

        let live = self.connection_status(&node_id).await;
        let changed = device.connection_status != live.connection_status
            || device.mounted == matches!(live.connection_status, ConnectionStatus::NotMounted);

        device.apply_connection(live.connection_status, self.clock.now());
        self.devices.update_device(&device).await?;
        if changed {
            info!("{} status now {}", node_id, live.connection_status);
        }

        Ok(report(&device, node_id, changed))
    }
}

fn require_node_id(device: &DeviceRecord) -> Result<String> {
    device
        .node_id
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::invalid_params(format!("device '{}' has no node_id", device.name)))
}

fn mount_params(device: &DeviceRecord) -> Result<(String, MountParams)> {
    let node_id = require_node_id(device)?;
    let host = device
        .host()
        .ok_or_else(|| Error::invalid_params(format!("device '{}' has no NETCONF host", device.name)))?;
    let (Some(username), Some(password)) = (&device.netconf_username, &device.netconf_password) else {
        return Err(Error::invalid_params(format!(
            "device '{}' is missing NETCONF credentials",
            device.name
        )));
    };

    let params = MountParams::new(host, username.as_str(), password.as_str()).with_port(device.netconf_port);
    let missing = params.missing_fields();
    if !missing.is_empty() {
        return Err(Error::invalid_params(format!(
            "device '{}' is missing {}",
            device.name,
            missing.join(", ")
        )));
    }
    Ok((node_id, params))
}

fn report(device: &DeviceRecord, node_id: String, changed: bool) -> StatusReport {
    StatusReport {
        device_id: device.id,
        node_id,
        connection_status: device.connection_status,
        status: device.status,
        mounted: device.mounted,
        changed,
    }
}
