//! NBI Store - Device Inventory and Flow Rule Ledger
//!
//! Persists managed devices, their interfaces and OpenFlow rules with
//! lifecycle state:
//! PENDING → ACTIVE | FAILED → DELETED
//!
//! Features:
//! - SQLite persistent storage
//! - Prometheus metrics for the whole service

pub mod device;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod sqlite_store;
pub mod store;

pub use device::{DeviceRecord, InterfaceRecord, DEFAULT_NETCONF_PORT};
pub use error::{Result, StoreError};
pub use flow::{
    FlowDirection, FlowFilter, FlowKey, FlowMatchDetails, FlowRule, FlowStatus, IcmpAction,
    L4Protocol, DEFAULT_TABLE,
};
pub use sqlite_store::SqliteStore;
pub use store::{DeviceStore, FlowStore};
