//! Positional parameter values
//!
//! Parameters arrive as JSON but are bound as typed values, so anything
//! the database driver cannot bind directly is rejected up front.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParamError;

/// Object key marking a base64-encoded byte sequence: `{"base64": "AAE="}`
pub const BYTES_KEY: &str = "base64";

/// A single bindable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl ParamValue {
    /// Short name of the value kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl TryFrom<Value> for ParamValue {
    type Error = ParamError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if n.is_u64() {
                    Err(ParamError::new(format!(
                        "integer {} does not fit in a signed 64-bit value",
                        n
                    )))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(ParamError::new(format!(
                        "number {} is not representable",
                        n
                    )))
                }
            }
            Value::String(s) => Ok(Self::Text(s)),
            Value::Object(map) => bytes_from_object(map),
            Value::Array(_) => Err(ParamError::new("arrays are not supported")),
        }
    }
}

fn bytes_from_object(map: Map<String, Value>) -> Result<ParamValue, ParamError> {
    let encoded = match (map.len(), map.get(BYTES_KEY)) {
        (1, Some(Value::String(s))) => s,
        _ => {
            return Err(ParamError::new(format!(
                "objects must have the form {{\"{}\": \"<data>\"}}",
                BYTES_KEY
            )))
        }
    };

    STANDARD
        .decode(encoded)
        .map(ParamValue::Bytes)
        .map_err(|e| ParamError::new(format!("invalid base64: {}", e)))
}

impl From<ParamValue> for Value {
    fn from(param: ParamValue) -> Self {
        match param {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(b),
            ParamValue::Int(i) => Value::from(i),
            ParamValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParamValue::Text(s) => Value::String(s),
            ParamValue::Bytes(bytes) => {
                let mut map = Map::new();
                map.insert(BYTES_KEY.to_string(), Value::String(STANDARD.encode(bytes)));
                Value::Object(map)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<ParamValue, ParamError> {
        ParamValue::try_from(value)
    }

    #[test]
    fn primitive_kinds() {
        assert_eq!(parse(json!(null)).unwrap(), ParamValue::Null);
        assert_eq!(parse(json!(true)).unwrap(), ParamValue::Bool(true));
        assert_eq!(parse(json!(-42)).unwrap(), ParamValue::Int(-42));
        assert_eq!(parse(json!(1.5)).unwrap(), ParamValue::Float(1.5));
        assert_eq!(
            parse(json!("hello")).unwrap(),
            ParamValue::Text("hello".into())
        );
    }

    #[test]
    fn base64_object_is_bytes() {
        let value = parse(json!({ "base64": "AAH/" })).unwrap();
        assert_eq!(value, ParamValue::Bytes(vec![0x00, 0x01, 0xff]));
        assert_eq!(value.kind(), "bytes");
    }

    #[test]
    fn rejects_arrays() {
        let err = parse(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err, ParamError::new("arrays are not supported"));
    }

    #[test]
    fn rejects_plain_objects() {
        assert!(parse(json!({ "a": 1 })).is_err());
        assert!(parse(json!({ "base64": "AA==", "extra": true })).is_err());
        assert!(parse(json!({ "base64": 7 })).is_err());
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = parse(json!({ "base64": "not base64!" })).unwrap_err();
        assert!(err.to_string().contains("invalid base64"));
    }

    #[test]
    fn rejects_unsigned_overflow() {
        let err = parse(json!(u64::MAX)).unwrap_err();
        assert!(err.to_string().contains("signed 64-bit"));
    }

    #[test]
    fn deserializes_ordered_list() {
        let params: Vec<ParamValue> =
            serde_json::from_str(r#"[3, "x", null, {"base64": "AQI="}]"#).unwrap();
        assert_eq!(
            params,
            vec![
                ParamValue::Int(3),
                ParamValue::Text("x".into()),
                ParamValue::Null,
                ParamValue::Bytes(vec![1, 2]),
            ]
        );
    }

    #[test]
    fn bytes_serialize_back_to_base64_object() {
        let value = serde_json::to_value(ParamValue::Bytes(vec![1, 2])).unwrap();
        assert_eq!(value, json!({ "base64": "AQI=" }));
    }
}
