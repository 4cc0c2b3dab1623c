//! OpenConfig drivers (`openconfig-interfaces`, `openconfig-network-instance`,
//! `openconfig-system`)

mod interface;
mod routing;
mod system;
mod vlan;

pub use interface::OpenConfigInterfaceDriver;
pub use routing::OpenConfigRoutingDriver;
pub use system::OpenConfigSystemDriver;
pub use vlan::OpenConfigVlanDriver;

use crate::util::{encode_key, mount_base};

pub(crate) const DRIVER_NAME: &str = "openconfig";

pub(crate) fn interface_path(node_id: &str, name: &str) -> String {
    format!(
        "{}/openconfig-interfaces:interfaces/interface={}",
        mount_base(node_id),
        encode_key(name)
    )
}

/// `network-instance={name}` under the device mount
pub(crate) fn network_instance(node_id: &str, name: &str) -> String {
    format!(
        "{}/openconfig-network-instance:network-instances/network-instance={}",
        mount_base(node_id),
        encode_key(name)
    )
}
