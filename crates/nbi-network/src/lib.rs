//! NBI Network - Controller-facing services
//!
//! Everything that talks to the SDN controller lives here:
//! - `client`: reqwest RESTCONF client behind the `Controller` trait
//! - `capability`: per-node YANG module cache, feature gate and failure diagnosis
//! - `mount` / `sync`: NETCONF mount lifecycle and topology reconciliation
//! - `openflow`: flow templates and the rule lifecycle engine
//! - `discovery`: TTL cache of per-device interface inventory
//! - `intent`: one intent request from registry to normalized answer
//!
//! Services take `Arc<dyn Controller>` so tests drive them with
//! [`testing::ScriptedController`].

pub mod capability;
pub mod client;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod intent;
pub mod mount;
pub mod openflow;
pub mod sync;
pub mod testing;

pub use capability::{CapabilityEntry, CapabilityManager, CapabilitySummary, Diagnosis, FeatureCheck};
pub use client::OdlClient;
pub use controller::{Controller, ControllerResult};
pub use discovery::{DiscoveredInterface, DiscoveryResult, InterfaceDiscovery};
pub use error::ControllerError;
pub use intent::{IntentRequest, IntentResponse, IntentService};
pub use mount::{LiveStatus, MountOutcome, MountService, StatusReport};
pub use openflow::{FlowEngine, FlowRequest, FlowSyncReport, FlowTemplate};
pub use sync::{OpenFlowSyncReport, SyncReport, SyncService};
