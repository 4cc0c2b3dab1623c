//! Scripted in-process controller for service tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use nbi_core::{HttpMethod, RequestSpec};

use crate::controller::{Controller, ControllerResult};
use crate::error::ControllerError;

/// Answers requests from per-(method, path) scripts and records every call.
///
/// Each script is a queue; the last entry repeats once the others are used
/// up. Unscripted reads answer 404, unscripted writes answer `{"ok": true}`.
#[derive(Default)]
pub struct ScriptedController {
    scripts: Mutex<HashMap<(HttpMethod, String), VecDeque<ControllerResult>>>,
    calls: Mutex<Vec<RequestSpec>>,
}

impl ScriptedController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful answer
    pub fn on(&self, method: HttpMethod, path: impl Into<String>, body: Value) -> &Self {
        self.push(method, path.into(), Ok(body))
    }

    /// Queue a failure
    pub fn fail(&self, method: HttpMethod, path: impl Into<String>, err: ControllerError) -> &Self {
        self.push(method, path.into(), Err(err))
    }

    /// Queue an HTTP error status
    pub fn status(&self, method: HttpMethod, path: impl Into<String>, status: u16) -> &Self {
        self.fail(
            method,
            path,
            ControllerError::Status {
                status,
                body: format!("scripted {}", status),
            },
        )
    }

    fn push(&self, method: HttpMethod, path: String, answer: ControllerResult) -> &Self {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.entry((method, path)).or_default().push_back(answer);
        self
    }

    /// Every request received so far
    pub fn calls(&self) -> Vec<RequestSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn count_method(&self, method: HttpMethod) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }
}

#[async_trait]
impl Controller for ScriptedController {
    async fn send(&self, spec: &RequestSpec) -> ControllerResult {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        match scripts.get_mut(&(spec.method, spec.path.clone())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| Ok(json!({}))),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Ok(json!({}))),
            None if spec.method.is_read() => Err(ControllerError::Status {
                status: 404,
                body: "data-missing".to_string(),
            }),
            None => Ok(json!({"ok": true})),
        }
    }
}
