//! Per-invocation binding data
//!
//! BindingData holds the values a trigger exposes to `{token}` placeholders
//! (trigger payload fields, system values). It is an immutable snapshot for
//! the duration of one invocation, so a token always resolves to the same value.
//!
//! Uses FxHashMap for faster hashing on small string keys.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::BindError;
use crate::jsonpath::{self, Segment};

/// Resolved name → value mappings for one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingData {
    values: FxHashMap<String, Value>,
}

impl BindingData {
    /// Create empty binding data
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object, one entry per top-level field
    pub fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Object(map) => Ok(Self::from(map)),
            other => Err(BindError::ArgumentInvalid {
                name: "binding_data".to_string(),
                reason: format!("expected a JSON object, got {}", type_name(&other)),
            }),
        }
    }

    /// Set a value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style `set`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Get a top-level value; names match exactly first, then ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| {
            self.values
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Names available to templates (the binding data contract)
    pub fn contract(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a dotted token (`order.customer.id`) by descending into nested values
    pub fn resolve(&self, token: &str) -> Result<&Value, BindError> {
        let segments = jsonpath::parse(token)?;
        let missing = || BindError::BindingDataMissing {
            token: token.to_string(),
        };

        let (head, rest) = match segments.split_first() {
            Some((Segment::Field(head), rest)) => (head, rest),
            _ => return Err(missing()),
        };

        let root = self.get(head).ok_or_else(missing)?;
        jsonpath::apply(root, rest).ok_or_else(missing)
    }

    /// Serialize to a JSON object (for logging and replay)
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for BindingData {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            values: map.into_iter().collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for BindingData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_falls_back_to_case_insensitive_match() {
        let data = BindingData::new().with("QueueTrigger", "hello");
        assert_eq!(data.get("QueueTrigger"), Some(&json!("hello")));
        assert_eq!(data.get("queuetrigger"), Some(&json!("hello")));
        assert_eq!(data.get("other"), None);
    }

    #[test]
    fn resolve_descends_into_nested_values() {
        let data = BindingData::from_value(json!({
            "order": {"customer": {"id": "c-1"}, "lines": [{"sku": "x"}]}
        }))
        .unwrap();

        assert_eq!(data.resolve("order.customer.id").unwrap(), &json!("c-1"));
        assert_eq!(data.resolve("order.lines[0].sku").unwrap(), &json!("x"));
    }

    #[test]
    fn resolve_missing_reports_full_token() {
        let data = BindingData::new().with("order", json!({"id": 1}));
        let err = data.resolve("order.customer").unwrap_err();
        assert!(matches!(
            err,
            BindError::BindingDataMissing { token } if token == "order.customer"
        ));
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(matches!(
            BindingData::from_value(json!([1, 2])),
            Err(BindError::ArgumentInvalid { .. })
        ));
    }

    #[test]
    fn contract_is_sorted() {
        let data: BindingData = [("b", json!(1)), ("a", json!(2))].into_iter().collect();
        assert_eq!(data.contract(), vec!["a", "b"]);
        assert_eq!(data.to_value(), json!({"a": 2, "b": 1}));
    }
}
