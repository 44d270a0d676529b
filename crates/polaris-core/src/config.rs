//! Narrow configuration surface consumed by plugin `Init` methods.
//!
//! No parser lives in this crate: `MapConfig` is a `BTreeMap`-backed
//! implementation for tests and for host applications that already parsed
//! their own YAML/JSON elsewhere.

use std::collections::BTreeMap;

use crate::error::PolarisError;

/// Read-only view of a config subtree, keyed by dotted or flat string keys.
pub trait Config {
    /// Returns the raw string value for `key`, or `None` if absent.
    fn get_str(&self, key: &str) -> Option<&str>;

    fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_str(key).unwrap_or(default)
    }

    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_str(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(default)
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_str(key)
            .and_then(|v| match v {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            })
            .unwrap_or(default)
    }

    /// Returns the raw string value for `key`, failing fast with
    /// `InvalidConfig` when it is required and absent.
    fn require_str(&self, key: &str) -> Result<&str, PolarisError> {
        self.get_str(key)
            .ok_or_else(|| PolarisError::invalid_config(format!("missing required key: {key}")))
    }
}

/// `BTreeMap`-backed `Config` for tests and pre-parsed host configuration.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    entries: BTreeMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

impl Config for MapConfig {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}
