//! Core types and utilities for the network intent engine
//!
//! # Modules
//!
//! - `config`: Environment configuration and service settings
//! - `error`: Error taxonomy and Result alias
//! - `request`: RESTCONF request description handed to the controller client
//! - `runtime`: Clock, cancellation and bounded polling
//! - `types`: Vendor, OS, protocol and status enums plus the driver-facing device profile

pub mod config;
pub mod error;
pub mod request;
pub mod runtime;
pub mod types;

// Re-exports
pub use config::{ControllerSettings, PollSettings, Settings};
pub use error::{Error, Result};
pub use request::{Datastore, HttpMethod, RequestSpec};
pub use runtime::{CancelHandle, CancelToken, Clock, ManualClock, Poller, SystemClock};
pub use types::*;
