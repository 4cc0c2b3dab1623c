//! Huawei VRP8 drivers
//!
//! VRP8 splits its tree across per-feature modules (`huawei-ifm`,
//! `huawei-ospfv2`, `huawei-staticrt`, ...). List keys are interface names
//! such as `GigabitEthernet0/0/1`, so every key is percent-encoded.

mod dhcp;
mod interface;
mod routing;
mod system;
mod vlan;

pub use dhcp::HuaweiDhcpDriver;
pub use interface::HuaweiInterfaceDriver;
pub use routing::HuaweiRoutingDriver;
pub use system::HuaweiSystemDriver;
pub use vlan::HuaweiVlanDriver;

pub(crate) const DRIVER_NAME: &str = "huawei";

/// VRF name VRP uses for the global routing table
pub(crate) const PUBLIC_VRF: &str = "_public_";
