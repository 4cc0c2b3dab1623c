//! Controller seam
//!
//! Services never talk HTTP directly; they hand a [`RequestSpec`] to a
//! [`Controller`]. Production uses [`crate::client::OdlClient`], tests use
//! [`crate::testing::ScriptedController`].

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use nbi_core::RequestSpec;

use crate::error::ControllerError;

pub type ControllerResult = std::result::Result<Value, ControllerError>;

#[async_trait]
pub trait Controller: Send + Sync {
    /// Execute with the configured retry budget. 2xx bodies come back as
    /// parsed JSON, `{"raw": text}` when not JSON, `{"ok": true}` when empty.
    async fn send(&self, spec: &RequestSpec) -> ControllerResult;

    /// One attempt bounded by `timeout`, no retries
    async fn send_once(&self, spec: &RequestSpec, timeout: Duration) -> ControllerResult {
        match tokio::time::timeout(timeout, self.send(spec)).await {
            Ok(result) => result,
            Err(_) => Err(ControllerError::Timeout(timeout)),
        }
    }
}
