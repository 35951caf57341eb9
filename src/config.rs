//! Key-value configuration with dot-separated lookup paths.
//!
//! The rig reads one JSON file (e.g. `rtmrs.json`). Every consumer asks for a
//! dot path (`"network.port"`) together with a hard-coded default, so a
//! missing file or missing key never fails, it just falls back.

use serde_json::Value;
use std::path::Path;
use tracing::warn;

use crate::RigError;

#[derive(Debug, Clone, Default)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Load from a JSON file. A missing file yields an empty config (logged);
    /// a present-but-malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, RigError> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let root: Value = serde_json::from_str(&text).map_err(|e| RigError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { root })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Walk a dot-separated path. `None` if any segment is absent.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for key in path.split('.') {
            node = node.as_object()?.get(key)?;
        }
        Some(node)
    }

    pub fn get_str(&self, path: &str, default: &str) -> String {
        self.lookup(path)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_f64(&self, path: &str, default: f64) -> f64 {
        self.lookup(path).and_then(Value::as_f64).unwrap_or(default)
    }

    pub fn get_u64(&self, path: &str, default: u64) -> u64 {
        self.lookup(path).and_then(Value::as_u64).unwrap_or(default)
    }

    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.lookup(path)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// String-array lookup, e.g. the M1 tapping sequence.
    pub fn get_str_list(&self, path: &str, default: &[&str]) -> Vec<String> {
        match self.lookup(path).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }
}
