//! OpenFlow rule engine: templates, payload encoding and rule lifecycle

pub mod engine;
pub mod templates;

pub use engine::{FlowEngine, FlowSyncReport};
pub use templates::{build_flow, flow_body, FlowRequest, FlowTemplate};
