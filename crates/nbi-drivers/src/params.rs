//! Intent parameter access
//!
//! Params arrive as a loose JSON object. Numbers are frequently sent as
//! strings by clients, so numeric getters accept both.

use serde_json::{Map, Value};

use nbi_core::{Error, Result};

pub type Params = Map<String, Value>;

/// Typed getters over a params object. Missing means absent or null.
pub trait ParamsExt {
    fn present(&self, key: &str) -> Option<&Value>;

    /// Non-empty string, numbers rendered as text
    fn opt_str(&self, key: &str) -> Option<String>;

    fn required_str(&self, key: &str) -> Result<String> {
        self.opt_str(key)
            .ok_or_else(|| Error::build(format!("params require {}", key)))
    }

    fn opt_u32(&self, key: &str) -> Result<Option<u32>>;

    fn required_u32(&self, key: &str) -> Result<u32> {
        self.opt_u32(key)?
            .ok_or_else(|| Error::build(format!("params require {}", key)))
    }

    fn opt_bool(&self, key: &str) -> Option<bool>;

    /// A string or a list of strings, flattened
    fn str_list(&self, key: &str) -> Vec<String>;
}

impl ParamsExt for Params {
    fn present(&self, key: &str) -> Option<&Value> {
        match self.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    fn opt_str(&self, key: &str) -> Option<String> {
        match self.present(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn opt_u32(&self, key: &str) -> Result<Option<u32>> {
        let Some(value) = self.present(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| Error::build(format!("{} must be a non-negative integer", key)))
    }

    fn opt_bool(&self, key: &str) -> Option<bool> {
        match self.present(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            _ => None,
        }
    }

    fn str_list(&self, key: &str) -> Vec<String> {
        match self.present(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }
}
