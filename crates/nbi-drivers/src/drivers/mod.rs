//! Built-in vendor drivers
//!
//! One type per vendor and feature area. Each declares the intents it
//! handles; [`crate::driver::DriverRegistry`] routes on (vendor, intent).

pub mod cisco;
pub mod device;
pub mod huawei;
pub mod openconfig;
pub mod openflow;

use std::sync::Arc;

use nbi_core::Vendor;

use crate::driver::Driver;

pub use device::{build_list, build_mount, build_status, build_unmount, DeviceDriver, MountParams};
pub use openflow::OpenFlowDriver;

/// Every driver shipped with the crate
pub fn all() -> Vec<Arc<dyn Driver>> {
    vec![
        Arc::new(cisco::CiscoInterfaceDriver),
        Arc::new(cisco::CiscoRoutingDriver),
        Arc::new(cisco::CiscoSystemDriver),
        Arc::new(cisco::CiscoVlanDriver),
        Arc::new(huawei::HuaweiInterfaceDriver),
        Arc::new(huawei::HuaweiRoutingDriver),
        Arc::new(huawei::HuaweiSystemDriver),
        Arc::new(huawei::HuaweiVlanDriver),
        Arc::new(huawei::HuaweiDhcpDriver),
        Arc::new(openconfig::OpenConfigInterfaceDriver),
        Arc::new(openconfig::OpenConfigRoutingDriver),
        Arc::new(openconfig::OpenConfigSystemDriver),
        Arc::new(openconfig::OpenConfigVlanDriver),
        Arc::new(OpenFlowDriver),
        Arc::new(DeviceDriver::new(Vendor::Cisco)),
        Arc::new(DeviceDriver::new(Vendor::Huawei)),
        Arc::new(DeviceDriver::new(Vendor::OpenConfig)),
    ]
}
