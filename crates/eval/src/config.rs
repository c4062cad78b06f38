//! Read-only configuration tier and executor options.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::value::Value;

/// Set to `1` to keep test variables after a run, for inspection.
pub const KEEP_VARIABLES_ENV: &str = "KWDSL_KEEP_VARIABLES";

/// Layered key/value configuration, consulted after the test context and
/// before the global store. Later layers override earlier ones; nested
/// tables merge key by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigVars {
    root: BTreeMap<String, Value>,
}

impl ConfigVars {
    pub fn new() -> Self {
        ConfigVars::default()
    }

    /// A config layer must be a JSON object.
    pub fn from_json(json: serde_json::Value) -> Result<Self, String> {
        match Value::from(json) {
            Value::Map(root) => Ok(ConfigVars { root }),
            other => Err(format!(
                "configuration must be a table, got {}",
                other.type_name()
            )),
        }
    }

    pub fn from_map(root: BTreeMap<String, Value>) -> Self {
        ConfigVars { root }
    }

    /// Overlay `layer` on top of `self`.
    pub fn merge(&mut self, layer: ConfigVars) {
        for (k, v) in layer.root {
            merge_into(&mut self.root, k, v);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    /// Exact top-level key first, then a dotted path into nested tables.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.root.get(key) {
            return Some(v);
        }
        let mut parts = key.split('.');
        let mut cur = self.root.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_map()?.get(part)?;
        }
        Some(cur)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.root
    }
}

fn merge_into(target: &mut BTreeMap<String, Value>, key: String, value: Value) {
    match (target.get_mut(&key), value) {
        (Some(Value::Map(existing)), Value::Map(incoming)) => {
            for (k, v) in incoming {
                merge_into(existing, k, v);
            }
        }
        (_, value) => {
            target.insert(key, value);
        }
    }
}

/// Knobs for one [`crate::Executor`].
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Keep local variables after a run instead of clearing them.
    pub keep_variables: bool,
    /// Directory against which relative `@import` paths resolve.
    pub base_dir: Option<PathBuf>,
}

impl ExecutorOptions {
    pub fn from_env() -> Self {
        ExecutorOptions {
            keep_variables: std::env::var(KEEP_VARIABLES_ENV).is_ok_and(|v| v == "1"),
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_lookup_and_layer_merge() {
        let mut cfg = ConfigVars::from_json(json!({
            "db": {"host": "localhost", "port": 5432},
            "env": "dev"
        }))
        .unwrap();
        cfg.merge(ConfigVars::from_json(json!({"db": {"host": "db.internal"}})).unwrap());

        assert_eq!(cfg.get("db.host"), Some(&Value::from("db.internal")));
        assert_eq!(cfg.get("db.port"), Some(&Value::Int(5432)));
        assert_eq!(cfg.get("env"), Some(&Value::from("dev")));
        assert_eq!(cfg.get("db.user"), None);
        assert!(ConfigVars::from_json(json!([1, 2])).is_err());
    }
}
