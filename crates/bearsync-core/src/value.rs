//! Flexible JSON leaf values exchanged with CloudKit.
//!
//! Record fields arrive as `{"value": ..., "type": "..."}` objects whose
//! value shape is not known until decode time. [`FieldValue`] captures every
//! JSON shape as an explicit variant, and [`RecordField`] carries the wire
//! type tag next to it.
//!
//! Decoding follows a fixed priority: boolean, integer, floating-point,
//! string, list, map, and finally null. A `0`/`1` integer therefore decodes
//! as [`FieldValue::Int`]; fields that are booleans by convention must be read
//! with [`FieldValue::as_flag`].

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire type tags understood by the record store.
pub mod kind {
    pub const STRING: &str = "STRING";
    pub const INT64: &str = "INT64";
    pub const DOUBLE: &str = "DOUBLE";
    pub const TIMESTAMP: &str = "TIMESTAMP";
    pub const BYTES: &str = "BYTES";
    pub const ASSET_ID: &str = "ASSETID";
    pub const STRING_LIST: &str = "STRING_LIST";
}

/// A JSON leaf whose type is discovered while decoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    #[default]
    Null,
}

impl FieldValue {
    /// Decode a raw JSON value using the fixed priority order.
    pub fn decode(raw: serde_json::Value) -> Self {
        use serde_json::Value;

        match raw {
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .or_else(|| number.as_f64().map(Self::Double))
                .unwrap_or(Self::Null),
            Value::String(text) => Self::String(text),
            Value::Array(items) => Self::List(items.into_iter().map(Self::decode).collect()),
            Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::decode(value)))
                    .collect(),
            ),
            Value::Null => Self::Null,
        }
    }

    /// Encode back into the native JSON shape of each variant.
    pub fn encode(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Int(number) => Value::from(*number),
            Self::Double(number) => {
                serde_json::Number::from_f64(*number).map_or(Value::Null, Value::Number)
            }
            Self::String(text) => Value::String(text.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::encode).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.encode()))
                    .collect(),
            ),
            Self::Null => Value::Null,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(number) => Some(*number),
            Self::Int(number) => Some(*number as f64),
            _ => None,
        }
    }

    /// Interpret the value as a boolean flag: `true` or the integer `1`.
    pub const fn as_flag(&self) -> bool {
        match self {
            Self::Bool(flag) => *flag,
            Self::Int(number) => *number == 1,
            _ => false,
        }
    }

    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Download URL of an asset value, if this is one.
    pub fn download_url(&self) -> Option<&str> {
        self.as_map()?.get("downloadURL")?.as_str()
    }

    /// String items of a list value; non-string items are skipped.
    pub fn string_items(&self) -> Vec<String> {
        self.as_list()
            .unwrap_or_default()
            .iter()
            .filter_map(|item| item.as_str().map(ToOwned::to_owned))
            .collect()
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::decode)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A record field as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordField {
    #[serde(default)]
    pub value: FieldValue,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl RecordField {
    pub fn new(value: impl Into<FieldValue>, kind: &str) -> Self {
        Self {
            value: value.into(),
            kind: Some(kind.to_string()),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(value.into(), kind::STRING)
    }

    pub fn int64(value: i64) -> Self {
        Self::new(value, kind::INT64)
    }

    /// Boolean flags travel as `INT64` 0/1.
    pub fn flag(value: bool) -> Self {
        Self::int64(i64::from(value))
    }

    pub fn double(value: f64) -> Self {
        Self {
            value: FieldValue::Double(value),
            kind: Some(kind::DOUBLE.to_string()),
        }
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(millis: i64) -> Self {
        Self::new(millis, kind::TIMESTAMP)
    }

    /// Base64-encoded binary payload.
    pub fn bytes(base64: impl Into<String>) -> Self {
        Self::new(base64.into(), kind::BYTES)
    }

    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            value: FieldValue::List(
                items
                    .into_iter()
                    .map(|item| FieldValue::String(item.into()))
                    .collect(),
            ),
            kind: Some(kind::STRING_LIST.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn decode(raw: serde_json::Value) -> FieldValue {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn decode_follows_priority_order() {
        assert_eq!(decode(json!(true)), FieldValue::Bool(true));
        assert_eq!(decode(json!(1)), FieldValue::Int(1));
        assert_eq!(decode(json!(-42)), FieldValue::Int(-42));
        assert_eq!(decode(json!(1.5)), FieldValue::Double(1.5));
        assert_eq!(decode(json!("hi")), FieldValue::String("hi".to_string()));
        assert_eq!(decode(json!(null)), FieldValue::Null);
    }

    #[test]
    fn integers_past_i64_fall_back_to_double() {
        let value = decode(json!(u64::MAX));
        assert!(matches!(value, FieldValue::Double(_)));
    }

    #[test]
    fn nested_shapes_decode_recursively() {
        let value = decode(json!({
            "downloadURL": "https://cvws.icloud-content.com/x/${f}",
            "size": 12,
            "parts": [1, "two", null]
        }));

        assert_eq!(
            value.download_url(),
            Some("https://cvws.icloud-content.com/x/${f}")
        );
        let parts = value.as_map().unwrap().get("parts").unwrap();
        assert_eq!(
            parts.as_list().unwrap(),
            &[
                FieldValue::Int(1),
                FieldValue::String("two".to_string()),
                FieldValue::Null
            ]
        );
    }

    #[test]
    fn flags_follow_integer_convention() {
        assert!(FieldValue::Int(1).as_flag());
        assert!(!FieldValue::Int(0).as_flag());
        assert!(!FieldValue::Int(2).as_flag());
        assert!(FieldValue::Bool(true).as_flag());
        assert!(!FieldValue::String("1".to_string()).as_flag());
        assert!(!FieldValue::Null.as_flag());
    }

    #[test]
    fn encode_is_structural_inverse() {
        let raw = json!({"a": [true, 3, 2.5, "s", null], "b": {"c": 0}});
        let value = decode(raw.clone());
        assert_eq!(serde_json::to_value(&value).unwrap(), raw);
    }

    #[test]
    fn record_field_tolerates_missing_parts() {
        let field: RecordField = serde_json::from_value(json!({"value": 0})).unwrap();
        assert_eq!(field.value, FieldValue::Int(0));
        assert_eq!(field.kind, None);

        let empty: RecordField = serde_json::from_value(json!({"type": "STRING"})).unwrap();
        assert!(empty.value.is_null());
    }

    #[test]
    fn typed_constructors_emit_wire_shape() {
        assert_eq!(
            serde_json::to_value(RecordField::flag(true)).unwrap(),
            json!({"value": 1, "type": "INT64"})
        );
        assert_eq!(
            serde_json::to_value(RecordField::timestamp(1_700_000_000_000)).unwrap(),
            json!({"value": 1_700_000_000_000_i64, "type": "TIMESTAMP"})
        );
        assert_eq!(
            serde_json::to_value(RecordField::string_list(["work", "home"])).unwrap(),
            json!({"value": ["work", "home"], "type": "STRING_LIST"})
        );
    }

    #[test]
    fn string_items_skip_other_shapes() {
        let value = decode(json!(["a", 1, "b"]));
        assert_eq!(value.string_items(), vec!["a", "b"]);
        assert!(FieldValue::Null.string_items().is_empty());
    }
}
