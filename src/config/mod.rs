use crate::error::{BootstageError, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::env;
use std::sync::{Arc, PoisonError, RwLock};

/// Configuration service
///
/// A tree of JSON values addressed by dotted key paths (`web.port`). Clones
/// share the same underlying values, so initializers can adjust configuration
/// that later stages read.
#[derive(Clone)]
pub struct Config {
    values: Arc<RwLock<Value>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Start from existing values; anything but an object is discarded
    pub fn from_value(value: Value) -> Self {
        let value = match value {
            Value::Object(_) => value,
            _ => Value::Object(Map::new()),
        };
        Self {
            values: Arc::new(RwLock::new(value)),
        }
    }

    /// Value at `key_path`, or `None` if missing or `null`
    pub fn get(&self, key_path: &str) -> Option<Value> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let mut current = &*values;
        for part in key_path.split('.') {
            current = current.get(part)?;
        }
        match current {
            Value::Null => None,
            found => Some(found.clone()),
        }
    }

    /// String value at `key_path`; non-string scalars are rendered as text
    pub fn get_str(&self, key_path: &str) -> Option<String> {
        match self.get(key_path)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Deserialize the value at `key_path`
    pub fn get_as<T: DeserializeOwned>(&self, key_path: &str) -> Result<Option<T>> {
        self.get(key_path)
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| BootstageError::invalid(key_path, e.to_string()))
            })
            .transpose()
    }

    /// Set a single value, creating intermediate objects as needed
    pub fn set(&self, key_path: &str, value: impl Into<Value>) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let mut current = &mut *values;
        for part in key_path.split('.') {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let Value::Object(map) = current else {
                return;
            };
            current = map.entry(part).or_insert(Value::Null);
        }
        *current = value.into();
    }

    /// Deep-merge `other` into the configuration
    ///
    /// Objects merge key by key, arrays are concatenated, anything else in
    /// `other` overwrites the existing value.
    pub fn merge(&self, other: Value) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        deep_merge(&mut values, other);
    }

    /// Overlay environment variables starting with `{prefix}__`
    ///
    /// `MYAPP__WEB_SERVICE__PORT=8080` sets `webService.port` to `8080`.
    /// Values that parse as JSON keep their type; anything else is a string.
    pub fn merge_env(&self, prefix: &str) {
        self.merge_vars(prefix, env::vars());
    }

    fn merge_vars(&self, prefix: &str, vars: impl IntoIterator<Item = (String, String)>) {
        let prefix = format!("{}__", prefix);
        for (key, raw) in vars {
            let Some(path) = key.strip_prefix(&prefix) else {
                continue;
            };
            let path: Vec<String> = path.split("__").map(camel_case).collect();
            if path.iter().any(String::is_empty) {
                continue;
            }
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            self.set(&path.join("."), value);
        }
    }

    /// Snapshot of every value
    pub fn to_value(&self) -> Value {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Config").field(&self.to_value()).finish()
    }
}

fn deep_merge(target: &mut Value, other: Value) {
    match (target, other) {
        (Value::Object(target), Value::Object(other)) => {
            for (key, value) in other {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(other)) => target.extend(other),
        (target, other) => *target = other,
    }
}

/// `WEB_SERVICE` -> `webService`
fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper = false;
    for c in segment.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_paths() {
        let config = Config::from_value(json!({
            "appName": "foo",
            "web": { "port": 8080, "tls": null }
        }));

        assert_eq!(config.get_str("appName").as_deref(), Some("foo"));
        assert_eq!(config.get("web.port"), Some(json!(8080)));
        assert_eq!(config.get_str("web.port").as_deref(), Some("8080"));
        assert_eq!(config.get("web.tls"), None);
        assert_eq!(config.get("web.port.deeper"), None);
        assert_eq!(config.get("missing"), None);
    }

    #[test]
    fn test_deep_merge() {
        let config = Config::from_value(json!({
            "web": { "port": 80, "hosts": ["a"] },
            "name": "old"
        }));
        config.merge(json!({
            "web": { "tls": true, "hosts": ["b"] },
            "name": "new"
        }));

        assert_eq!(
            config.to_value(),
            json!({
                "web": { "port": 80, "tls": true, "hosts": ["a", "b"] },
                "name": "new"
            })
        );
    }

    #[test]
    fn test_set_creates_objects() {
        let config = Config::new();
        config.set("a.b.c", 1);
        config.set("a.d", "x");
        assert_eq!(config.to_value(), json!({ "a": { "b": { "c": 1 }, "d": "x" } }));

        config.set("a.b.c.e", true);
        assert_eq!(config.get("a.b.c.e"), Some(json!(true)));
    }

    #[test]
    fn test_get_as() {
        let config = Config::from_value(json!({ "timeout": 1.5, "name": "svc" }));
        assert_eq!(config.get_as::<f64>("timeout").unwrap(), Some(1.5));
        assert_eq!(config.get_as::<u32>("missing").unwrap(), None);
        assert!(matches!(
            config.get_as::<u32>("name"),
            Err(BootstageError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_clones_share_values() {
        let config = Config::new();
        let other = config.clone();
        other.set("shared", true);
        assert_eq!(config.get("shared"), Some(json!(true)));
    }

    #[test]
    fn test_env_overlay() {
        let config = Config::new();
        config.merge_vars(
            "MYAPP",
            vec![
                ("MYAPP__APP_NAME".to_string(), "orders".to_string()),
                ("MYAPP__WEB_SERVICE__PORT".to_string(), "8080".to_string()),
                ("MYAPP__DEBUG".to_string(), "true".to_string()),
                ("OTHER__IGNORED".to_string(), "x".to_string()),
            ],
        );

        assert_eq!(
            config.to_value(),
            json!({
                "appName": "orders",
                "webService": { "port": 8080 },
                "debug": true
            })
        );
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("APP_NAME"), "appName");
        assert_eq!(camel_case("PORT"), "port");
        assert_eq!(camel_case("_LEADING"), "leading");
    }
}
