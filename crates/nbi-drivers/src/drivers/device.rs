//! NETCONF topology requests: mount, unmount, connection status, node list

use serde::{Deserialize, Serialize};
use serde_json::json;

use nbi_core::{Datastore, DeviceProfile, Error, RequestSpec, Result, Vendor};

use crate::driver::Driver;
use crate::params::Params;
use crate::registry::Intent;
use crate::util::{node_path, NETCONF_TOPOLOGY};

pub(crate) const DRIVER_NAME: &str = "device";

const SUPPORTED: &[Intent] = &[Intent::DeviceStatus, Intent::DeviceList];

fn default_port() -> u16 {
    830
}

fn default_connection_timeout() -> u64 {
    20_000
}

fn default_request_timeout() -> u64 {
    60_000
}

fn default_keepalive() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

/// NETCONF connector settings sent with a mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountParams {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tcp_only: bool,
    #[serde(default)]
    pub schemaless: bool,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_millis: u64,
    #[serde(default = "default_request_timeout")]
    pub default_request_timeout_millis: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive_delay: u64,
    #[serde(default = "default_true")]
    pub reconnect_on_changed_schema: bool,
}

impl MountParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: password.into(),
            tcp_only: false,
            schemaless: false,
            connection_timeout_millis: default_connection_timeout(),
            default_request_timeout_millis: default_request_timeout(),
            keepalive_delay: default_keepalive(),
            reconnect_on_changed_schema: true,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Names of the connection fields that are blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        missing
    }
}

pub fn build_mount(node_id: &str, params: &MountParams) -> Result<RequestSpec> {
    if node_id.trim().is_empty() {
        return Err(Error::build("mount requires node_id"));
    }
    let missing = params.missing_fields();
    if !missing.is_empty() {
        return Err(Error::build(format!(
            "mount requires {}",
            missing.join(", ")
        )));
    }

    let payload = json!({
        "network-topology:node": [{
            "node-id": node_id,
            "netconf-node-topology:host": params.host,
            "netconf-node-topology:port": params.port,
            "netconf-node-topology:username": params.username,
            "netconf-node-topology:password": params.password,
            "netconf-node-topology:tcp-only": params.tcp_only,
            "netconf-node-topology:schemaless": params.schemaless,
            "netconf-node-topology:connection-timeout-millis": params.connection_timeout_millis,
            "netconf-node-topology:default-request-timeout-millis": params.default_request_timeout_millis,
            "netconf-node-topology:keepalive-delay": params.keepalive_delay,
            "netconf-node-topology:reconnect-on-changed-schema": params.reconnect_on_changed_schema
        }]
    });

    Ok(RequestSpec::put(node_path(node_id), payload).tagged("device.mount", DRIVER_NAME))
}

pub fn build_unmount(node_id: &str) -> RequestSpec {
    RequestSpec::delete(node_path(node_id)).tagged("device.unmount", DRIVER_NAME)
}

pub fn build_status(node_id: &str) -> RequestSpec {
    RequestSpec::get(Datastore::Operational, node_path(node_id))
        .tagged(Intent::DeviceStatus.as_str(), DRIVER_NAME)
}

pub fn build_list() -> RequestSpec {
    RequestSpec::get(Datastore::Operational, NETCONF_TOPOLOGY)
        .tagged(Intent::DeviceList.as_str(), DRIVER_NAME)
}

/// Serves `device.status` and `device.list` for one NETCONF vendor
#[derive(Debug)]
pub struct DeviceDriver {
    vendor: Vendor,
}

impl DeviceDriver {
    pub fn new(vendor: Vendor) -> Self {
        Self { vendor }
    }
}

impl Driver for DeviceDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn supported_intents(&self) -> &'static [Intent] {
        SUPPORTED
    }

    fn compile(&self, device: &DeviceProfile, intent: Intent, _params: &Params) -> Result<RequestSpec> {
        match intent {
            Intent::DeviceStatus => Ok(build_status(&device.node_id)),
            Intent::DeviceList => Ok(build_list()),
            other => Err(Error::unsupported_intent(other.as_str())),
        }
    }
}
