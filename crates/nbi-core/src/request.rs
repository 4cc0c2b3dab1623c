//! Wire-level description of a single RESTCONF call
//!
//! Drivers build a [`RequestSpec`] and hand it to the controller client.
//! Specs are built fresh for every call and never mutated afterwards; the
//! builder methods consume `self`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// RESTCONF media type used for YANG data
pub const YANG_JSON: &str = "application/yang-data+json";

/// Plain JSON, used by the OpenFlow inventory model
pub const PLAIN_JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Patch,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which controller tree the path is resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datastore {
    Config,
    Operational,
    Operations,
}

impl Datastore {
    /// URL segment under `/rests`. Config and operational data share the
    /// `data` resource; RPCs live under `operations`.
    pub fn url_segment(&self) -> &'static str {
        match self {
            Datastore::Config | Datastore::Operational => "data",
            Datastore::Operations => "operations",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datastore::Config => f.write_str("config"),
            Datastore::Operational => f.write_str("operational"),
            Datastore::Operations => f.write_str("operations"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub datastore: Datastore,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub driver: String,
}

impl RequestSpec {
    fn new(method: HttpMethod, datastore: Datastore, path: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), YANG_JSON.to_string());
        Self {
            method,
            datastore,
            path: path.into(),
            payload: None,
            headers,
            intent: String::new(),
            driver: String::new(),
        }
    }

    pub fn get(datastore: Datastore, path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, datastore, path)
    }

    pub fn put(path: impl Into<String>, payload: Value) -> Self {
        Self::new(HttpMethod::Put, Datastore::Config, path).with_payload(payload)
    }

    pub fn patch(path: impl Into<String>, payload: Value) -> Self {
        Self::new(HttpMethod::Patch, Datastore::Config, path).with_payload(payload)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, Datastore::Config, path)
    }

    /// RPC invocation on the operations datastore
    pub fn rpc(path: impl Into<String>, input: Value) -> Self {
        Self::new(HttpMethod::Post, Datastore::Operations, path).with_payload(input)
    }

    fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self.headers
            .insert("Content-Type".to_string(), YANG_JSON.to_string());
        self
    }

    /// Tag the spec with the intent and driver that produced it
    pub fn tagged(mut self, intent: &str, driver: &str) -> Self {
        self.intent = intent.to_string();
        self.driver = driver.to_string();
        self
    }

    /// Switch media types to plain JSON
    pub fn plain_json(mut self) -> Self {
        for value in self.headers.values_mut() {
            *value = PLAIN_JSON.to_string();
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
