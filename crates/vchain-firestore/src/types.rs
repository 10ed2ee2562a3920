//! Firestore REST API types and value conversions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Firestore document value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

impl Value {
    /// Build a map value from fields.
    pub fn map(fields: HashMap<String, Value>) -> Self {
        Value::MapValue(MapValue {
            fields: Some(fields),
        })
    }

    /// Fields of a map value.
    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::MapValue(MapValue { fields: Some(f) }) => Some(f),
            _ => None,
        }
    }
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    pub name: Option<String>,
    pub fields: Option<HashMap<String, Value>>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Read a typed field.
    pub fn get<T: FromFirestoreValue>(&self, key: &str) -> Option<T> {
        self.fields
            .as_ref()
            .and_then(|f| f.get(key))
            .and_then(T::from_firestore_value)
    }
}

/// Convert a Rust value to a Firestore value.
pub trait ToFirestoreValue {
    fn to_firestore_value(&self) -> Value;
}

/// Convert a Firestore value to a Rust type.
pub trait FromFirestoreValue: Sized {
    fn from_firestore_value(value: &Value) -> Option<Self>;
}

/// Integers travel as decimal strings; doubles are accepted on read since
/// other writers may store counters as numbers.
macro_rules! integer_value {
    ($($ty:ty),*) => {$(
        impl ToFirestoreValue for $ty {
            fn to_firestore_value(&self) -> Value {
                Value::IntegerValue(self.to_string())
            }
        }

        impl FromFirestoreValue for $ty {
            fn from_firestore_value(value: &Value) -> Option<Self> {
                match value {
                    Value::IntegerValue(s) => s.parse().ok(),
                    Value::DoubleValue(f) => Some(*f as $ty),
                    _ => None,
                }
            }
        }
    )*};
}

integer_value!(i64, u32, u8);

impl ToFirestoreValue for str {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.to_owned())
    }
}

impl ToFirestoreValue for String {
    fn to_firestore_value(&self) -> Value {
        self.as_str().to_firestore_value()
    }
}

impl<T: ToFirestoreValue + ?Sized> ToFirestoreValue for &T {
    fn to_firestore_value(&self) -> Value {
        (**self).to_firestore_value()
    }
}

impl ToFirestoreValue for f64 {
    fn to_firestore_value(&self) -> Value {
        Value::DoubleValue(*self)
    }
}

impl ToFirestoreValue for bool {
    fn to_firestore_value(&self) -> Value {
        Value::BooleanValue(*self)
    }
}

impl ToFirestoreValue for DateTime<Utc> {
    fn to_firestore_value(&self) -> Value {
        Value::TimestampValue(self.to_rfc3339())
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Option<T> {
    fn to_firestore_value(&self) -> Value {
        self.as_ref()
            .map_or(Value::NullValue(()), ToFirestoreValue::to_firestore_value)
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for [T] {
    fn to_firestore_value(&self) -> Value {
        Value::ArrayValue(ArrayValue {
            values: Some(self.iter().map(ToFirestoreValue::to_firestore_value).collect()),
        })
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Vec<T> {
    fn to_firestore_value(&self) -> Value {
        self.as_slice().to_firestore_value()
    }
}

impl FromFirestoreValue for String {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromFirestoreValue for f64 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::DoubleValue(f) => Some(*f),
            Value::IntegerValue(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromFirestoreValue for bool {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::BooleanValue(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromFirestoreValue for DateTime<Utc> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampValue(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

/// Elements that fail to convert are skipped.
impl<T: FromFirestoreValue> FromFirestoreValue for Vec<T> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        let Value::ArrayValue(ArrayValue { values }) = value else {
            return None;
        };
        Some(
            values
                .iter()
                .flatten()
                .filter_map(T::from_firestore_value)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_wire_format() {
        let json = serde_json::to_value(7u32.to_firestore_value()).unwrap();
        assert_eq!(json, serde_json::json!({"integerValue": "7"}));
    }

    #[test]
    fn test_string_array_from_wire() {
        let value: Value = serde_json::from_value(serde_json::json!({
            "arrayValue": {"values": [{"stringValue": "a"}, {"stringValue": "b"}]}
        }))
        .unwrap();
        let parsed: Vec<String> = Vec::from_firestore_value(&value).unwrap();
        assert_eq!(parsed, vec!["a", "b"]);
    }

    #[test]
    fn test_integer_read_from_double() {
        assert_eq!(u32::from_firestore_value(&Value::DoubleValue(3.0)), Some(3));
        assert_eq!(u8::from_firestore_value(&Value::IntegerValue("300".into())), None);
    }

    #[test]
    fn test_empty_array_has_no_values_key() {
        let value: Value = serde_json::from_value(serde_json::json!({"arrayValue": {}})).unwrap();
        let parsed: Vec<String> = Vec::from_firestore_value(&value).unwrap();
        assert!(parsed.is_empty());
    }
}
