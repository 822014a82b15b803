//! Dynamic key-value records.
//!
//! Upstream payloads are arbitrary JSON objects whose shape we do not
//! validate. [`Record`] wraps the object and exposes typed accessors that
//! fall back to the type's zero value when a field is absent or has an
//! unexpected type. Reading a record never fails.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw upstream object (a submission, or a single comment).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wrap a JSON value. Non-object values yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Parse one JSON object from bytes.
    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value).ok_or_else(|| anyhow::anyhow!("expected a JSON object"))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String field, or `""`.
    pub fn str_field(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Boolean field, or `false`.
    pub fn bool_field(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Numeric field as `f64`, or `0.0`.
    pub fn f64_field(&self, key: &str) -> f64 {
        self.0.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Numeric field truncated to whole seconds, or `0`.
    ///
    /// Accepts integers, floats, and numeric strings (some dumps quote
    /// `created_utc`).
    pub fn i64_field(&self, key: &str) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(|f| f as i64)
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Compact JSON serialization of the whole record.
    pub fn to_json_line(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        Record::from_value(v).unwrap()
    }

    #[test]
    fn missing_fields_default() {
        let r = record(json!({}));
        assert_eq!(r.str_field("title"), "");
        assert!(!r.bool_field("locked"));
        assert_eq!(r.f64_field("created_utc"), 0.0);
        assert_eq!(r.i64_field("created_utc"), 0);
        assert!(r.get("edited").is_none());
    }

    #[test]
    fn mismatched_types_default() {
        let r = record(json!({ "title": 5, "locked": "yes", "created_utc": [1] }));
        assert_eq!(r.str_field("title"), "");
        assert!(!r.bool_field("locked"));
        assert_eq!(r.i64_field("created_utc"), 0);
    }

    #[test]
    fn created_accepts_float_int_and_string() {
        assert_eq!(record(json!({ "t": 1700000000.9 })).i64_field("t"), 1700000000);
        assert_eq!(record(json!({ "t": 1700000000 })).i64_field("t"), 1700000000);
        assert_eq!(record(json!({ "t": "1700000000.0" })).i64_field("t"), 1700000000);
    }

    #[test]
    fn non_object_rejected() {
        assert!(Record::from_value(json!([1, 2])).is_none());
        assert!(Record::from_slice(b"\"text\"").is_err());
        assert!(Record::from_slice(b"{\"id\":\"a\"}").is_ok());
    }
}
