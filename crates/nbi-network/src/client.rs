//! OpenDaylight RESTCONF client (RFC 8040)
//!
//! ## URL mapping
//!
//! | Datastore | URL |
//! |-----------|-----|
//! | config | `{base}/rests/data{path}` |
//! | operational | `{base}/rests/data{path}` |
//! | operations | `{base}/rests/operations{path}` |
//!
//! ## Authentication
//! - HTTP Basic with `ODL_USERNAME` / `ODL_PASSWORD`

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use nbi_core::{ControllerSettings, HttpMethod, RequestSpec};
use nbi_store::metrics::record_controller_request;

use crate::controller::{Controller, ControllerResult};
use crate::error::ControllerError;

pub struct OdlClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
    retry: u32,
}

impl OdlClient {
    pub fn new(settings: &ControllerSettings) -> Self {
        Self {
            client: Client::builder()
                .timeout(settings.timeout)
                .build()
                .unwrap_or_default(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            timeout: settings.timeout,
            retry: settings.retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, spec: &RequestSpec) -> String {
        format!(
            "{}/rests/{}{}",
            self.base_url,
            spec.datastore.url_segment(),
            spec.path
        )
    }

    async fn attempt(&self, spec: &RequestSpec, timeout: Duration) -> ControllerResult {
        let url = self.url(spec);
        debug!("ODL request: {} {}", spec.method, url);

        let mut request = self
            .client
            .request(method(spec.method), &url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(timeout);
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = &spec.payload {
            debug!("Payload: {}", payload);
            let body = serde_json::to_vec(payload).map_err(|e| ControllerError::Decode(e.to_string()))?;
            request = request.body(body);
        }

        let started = Instant::now();
        let result = self.execute(request, timeout).await;
        record_controller_request(
            spec.method.as_str(),
            &outcome(&result),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    async fn execute(&self, request: reqwest::RequestBuilder, timeout: Duration) -> ControllerResult {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ControllerError::Timeout(timeout)
            } else {
                ControllerError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ControllerError::Decode(e.to_string()))?;
        debug!("ODL response: {}", status);

        if !status.is_success() {
            return Err(ControllerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(parse_body(body))
    }
}

#[async_trait]
impl Controller for OdlClient {
    async fn send(&self, spec: &RequestSpec) -> ControllerResult {
        let attempts = self.retry + 1;
        let mut last = None;

        for attempt in 1..=attempts {
            match self.attempt(spec, self.timeout).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    warn!(
                        "ODL attempt {}/{} for {} {} failed: {}",
                        attempt, attempts, spec.method, spec.path, err
                    );
                    last = Some(err);
                }
            }
        }

        Err(match last {
            Some(err @ (ControllerError::Status { .. } | ControllerError::Timeout(_))) => err,
            Some(other) => ControllerError::RetriesExhausted {
                attempts,
                last: other.to_string(),
            },
            None => ControllerError::RetriesExhausted {
                attempts,
                last: "no attempt made".to_string(),
            },
        })
    }

    async fn send_once(&self, spec: &RequestSpec, timeout: Duration) -> ControllerResult {
        self.attempt(spec, timeout).await
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Post => Method::POST,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn parse_body(body: String) -> Value {
    if body.trim().is_empty() {
        return json!({"ok": true});
    }
    serde_json::from_str(&body).unwrap_or_else(|_| json!({"raw": body}))
}

fn outcome(result: &ControllerResult) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(ControllerError::Status { status, .. }) => format!("http_{}", status),
        Err(ControllerError::Timeout(_)) => "timeout".to_string(),
        Err(_) => "transport".to_string(),
    }
}
