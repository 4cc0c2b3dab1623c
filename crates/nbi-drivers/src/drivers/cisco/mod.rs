//! Cisco IOS-XE drivers over the `Cisco-IOS-XE-native` tree

mod interface;
mod routing;
mod system;
mod vlan;

pub use interface::CiscoInterfaceDriver;
pub use routing::CiscoRoutingDriver;
pub use system::CiscoSystemDriver;
pub use vlan::CiscoVlanDriver;

use crate::util::{encode_key, mount_base, split_interface_name};
use nbi_core::Result;

pub(crate) const DRIVER_NAME: &str = "cisco";

pub(crate) fn native(node_id: &str) -> String {
    format!("{}/Cisco-IOS-XE-native:native", mount_base(node_id))
}

/// A native interface list entry: `interface/{Type}={Number}`
pub(crate) struct NativeInterface {
    pub if_type: String,
    pub number: String,
    pub path: String,
}

impl NativeInterface {
    pub fn resolve(node_id: &str, name: &str) -> Result<Self> {
        let (if_type, number) = split_interface_name(name)?;
        let path = format!(
            "{}/interface/{}={}",
            native(node_id),
            if_type,
            encode_key(&number)
        );
        Ok(Self {
            if_type,
            number,
            path,
        })
    }

    /// Top-level key of an interface payload, e.g. `Cisco-IOS-XE-native:GigabitEthernet`
    pub fn container(&self) -> String {
        format!("Cisco-IOS-XE-native:{}", self.if_type)
    }
}
