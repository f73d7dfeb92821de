//! External sinks written by `collect_into` and `tap`.

use std::collections::BTreeMap;

use crate::types::Value;

/// Receives every signal reaching a collecting terminal, in signal order.
pub trait Collector {
    fn accept(&mut self, key: &Value, value: &Value);
}

/// Collects values, dropping keys.
impl Collector for Vec<Value> {
    fn accept(&mut self, _key: &Value, value: &Value) {
        self.push(value.clone());
    }
}

/// Collects `(key, value)` pairs.
impl Collector for Vec<(Value, Value)> {
    fn accept(&mut self, key: &Value, value: &Value) {
        self.push((key.clone(), value.clone()));
    }
}

/// Collects string-keyed values; later keys overwrite earlier ones.
impl Collector for BTreeMap<String, Value> {
    fn accept(&mut self, key: &Value, value: &Value) {
        self.insert(key.to_string(), value.clone());
    }
}
