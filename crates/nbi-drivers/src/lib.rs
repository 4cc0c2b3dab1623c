//! Intent catalogue, vendor drivers and response normalizers
//!
//! # Modules
//!
//! - `registry`: Intent names, categories and parameter validation
//! - `driver`: The `Driver` trait and the (vendor, intent) routing table
//! - `drivers`: Cisco IOS-XE, Huawei VRP8, OpenConfig, OpenFlow and device drivers
//! - `normalize`: Vendor responses into unified schemas
//! - `params`: Typed accessors over intent parameters
//! - `util`: RESTCONF path encoding and IPv4 helpers
//!
//! Drivers are pure: they turn `(device, intent, params)` into a
//! [`nbi_core::RequestSpec`] and never perform I/O.

pub mod driver;
pub mod drivers;
pub mod normalize;
pub mod params;
pub mod registry;
pub mod util;

// Re-exports
pub use driver::{Driver, DriverRegistry};
pub use drivers::{build_list, build_mount, build_status, build_unmount, MountParams};
pub use normalize::{normalize, NormalizeContext};
pub use params::{Params, ParamsExt};
pub use registry::{Intent, IntentCategory, IntentDefinition, IntentRegistry};
