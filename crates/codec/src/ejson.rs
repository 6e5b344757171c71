//! Extended-JSON codec.
//!
//! Plain JSON values map to themselves. Values JSON cannot express are
//! written as single-purpose tagged objects:
//!
//! | Value | JSON form |
//! |---|---|
//! | `Date` | `{"$date": <millis>}` |
//! | `Bytes` | `{"$binary": "<base64>"}` |
//! | `Float` NaN / ±inf | `{"$InfNaN": 0 / 1 / -1}` |
//! | `ObjectId` | `{"$type": "oid", "$value": "<hex>"}` |
//!
//! A user object that happens to look like one of these tags is wrapped as
//! `{"$escape": {...}}` so it decodes back to an object.
//!
//! Text output is canonical: `serde_json` maps keep their keys sorted, so an
//! object always stringifies the same way regardless of insertion order.

use crate::traits::{CodecError, ValueCodec};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Number, Value as JsonValue};
use sessiondb_core::Value;
use std::collections::HashMap;

const DATE_TAG: &str = "$date";
const BINARY_TAG: &str = "$binary";
const INF_NAN_TAG: &str = "$InfNaN";
const ESCAPE_TAG: &str = "$escape";
const TYPE_TAG: &str = "$type";
const TYPE_VALUE_TAG: &str = "$value";
const OBJECT_ID_TYPE: &str = "oid";

/// Extended-JSON codec.
///
/// # Example
///
/// ```
/// use sessiondb_codec::{EjsonCodec, ValueCodec};
/// use sessiondb_core::Value;
///
/// let codec = EjsonCodec;
/// let text = codec.stringify(&Value::date_from_millis(0));
/// assert_eq!(text, r#"{"$date":0}"#);
/// assert_eq!(codec.parse(&text).unwrap(), Value::date_from_millis(0));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct EjsonCodec;

impl EjsonCodec {
    fn float_to_json(f: f64) -> JsonValue {
        match Number::from_f64(f) {
            Some(n) => JsonValue::Number(n),
            None => {
                let sign = if f.is_nan() {
                    0
                } else if f.is_sign_positive() {
                    1
                } else {
                    -1
                };
                tagged(INF_NAN_TAG, JsonValue::from(sign))
            }
        }
    }

    fn number_from_json(n: &Number) -> Value {
        match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(0.0)),
        }
    }

    fn decode_tagged(&self, map: &Map<String, JsonValue>) -> Option<Result<Value, CodecError>> {
        if map.len() == 1 {
            let (tag, inner) = map.iter().next()?;
            return match (tag.as_str(), inner) {
                (DATE_TAG, JsonValue::Number(n)) => {
                    let millis = n
                        .as_i64()
                        .or_else(|| n.as_f64().map(|f| f as i64))
                        .unwrap_or(0);
                    Some(Ok(Value::date_from_millis(millis)))
                }
                (BINARY_TAG, JsonValue::String(s)) => Some(
                    STANDARD
                        .decode(s)
                        .map(Value::Bytes)
                        .map_err(|e| CodecError::DecodeError(format!("invalid $binary: {}", e))),
                ),
                (INF_NAN_TAG, JsonValue::Number(n)) => {
                    let sign = n.as_f64().unwrap_or(0.0);
                    let f = if sign > 0.0 {
                        f64::INFINITY
                    } else if sign < 0.0 {
                        f64::NEG_INFINITY
                    } else {
                        f64::NAN
                    };
                    Some(Ok(Value::Float(f)))
                }
                (ESCAPE_TAG, JsonValue::Object(escaped)) => Some(
                    escaped
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), self.from_json_value(v)?)))
                        .collect::<Result<HashMap<_, _>, CodecError>>()
                        .map(Value::Object),
                ),
                _ => None,
            };
        }

        if map.len() == 2 {
            if let (Some(JsonValue::String(type_name)), Some(inner)) =
                (map.get(TYPE_TAG), map.get(TYPE_VALUE_TAG))
            {
                return Some(match (type_name.as_str(), inner) {
                    (OBJECT_ID_TYPE, JsonValue::String(hex)) => Ok(Value::ObjectId(hex.clone())),
                    (OBJECT_ID_TYPE, _) => Err(CodecError::DecodeError(
                        "object id $value must be a string".to_string(),
                    )),
                    (other, _) => Err(CodecError::UnknownType(other.to_string())),
                });
            }
        }

        None
    }
}

/// True when a plain object would be mistaken for a tagged value on decode.
fn looks_tagged(map: &Map<String, JsonValue>) -> bool {
    match map.len() {
        1 => map.iter().next().is_some_and(|(tag, inner)| {
            matches!(
                (tag.as_str(), inner),
                (DATE_TAG, JsonValue::Number(_))
                    | (BINARY_TAG, JsonValue::String(_))
                    | (INF_NAN_TAG, JsonValue::Number(_))
                    | (ESCAPE_TAG, JsonValue::Object(_))
            )
        }),
        2 => map.contains_key(TYPE_TAG) && map.contains_key(TYPE_VALUE_TAG),
        _ => false,
    }
}

fn tagged(tag: &str, inner: JsonValue) -> JsonValue {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), inner);
    JsonValue::Object(map)
}

fn floats_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// The integer a float holds exactly, if any. `-0.0` yields 0.
fn integral(f: f64) -> Option<i64> {
    // i64::MAX is not representable; 2^63 is the first float past it
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

impl ValueCodec for EjsonCodec {
    fn to_json_value(&self, value: &Value) -> JsonValue {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => Self::float_to_json(*f),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => tagged(BINARY_TAG, JsonValue::String(STANDARD.encode(b))),
            Value::Date(d) => tagged(DATE_TAG, JsonValue::from(d.timestamp_millis())),
            Value::ObjectId(hex) => {
                let mut map = Map::with_capacity(2);
                map.insert(TYPE_TAG.to_string(), JsonValue::from(OBJECT_ID_TYPE));
                map.insert(TYPE_VALUE_TAG.to_string(), JsonValue::String(hex.clone()));
                JsonValue::Object(map)
            }
            Value::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.to_json_value(v)).collect())
            }
            Value::Object(obj) => {
                let map: Map<String, JsonValue> = obj
                    .iter()
                    .map(|(k, v)| (k.clone(), self.to_json_value(v)))
                    .collect();
                if looks_tagged(&map) {
                    tagged(ESCAPE_TAG, JsonValue::Object(map))
                } else {
                    JsonValue::Object(map)
                }
            }
        }
    }

    fn from_json_value(&self, json: &JsonValue) -> Result<Value, CodecError> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => Ok(Self::number_from_json(n)),
            JsonValue::String(s) => Ok(Value::String(s.clone())),
            JsonValue::Array(items) => items
                .iter()
                .map(|v| self.from_json_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            JsonValue::Object(map) => {
                if let Some(decoded) = self.decode_tagged(map) {
                    return decoded;
                }
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.from_json_value(v)?)))
                    .collect::<Result<HashMap<_, _>, CodecError>>()
                    .map(Value::Object)
            }
        }
    }

    fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => floats_equal(*x, *y),
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                integral(*y) == Some(*x)
            }
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Bytes(x), Value::Bytes(y)) => x == y,
            (Value::Date(x), Value::Date(y)) => x.timestamp_millis() == y.timestamp_millis(),
            (Value::ObjectId(x), Value::ObjectId(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(l, r)| self.equals(l, r))
            }
            (Value::Object(x), Value::Object(y)) => {
                x.len() == y.len()
                    && x
                        .iter()
                        .all(|(k, l)| y.get(k).is_some_and(|r| self.equals(l, r)))
            }
            _ => false,
        }
    }

    fn equality_key(&self, value: &Value) -> String {
        match value {
            Value::Float(f) => match integral(*f) {
                Some(i) => self.stringify(&Value::Int(i)),
                None => self.stringify(value),
            },
            _ => self.stringify(value),
        }
    }

    fn codec_id(&self) -> &str {
        "ejson"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn plain_json_maps_to_itself() {
        let codec = EjsonCodec;
        let json = json!({"a": [1, 2.5, "x", null, true]});
        let value = codec.from_json_value(&json).unwrap();
        assert_eq!(codec.to_json_value(&value), json);
    }

    #[test]
    fn date_uses_millis_tag() {
        let codec = EjsonCodec;
        let date = Value::date_from_millis(1_500_000_000_000);
        assert_eq!(codec.to_json_value(&date), json!({"$date": 1_500_000_000_000i64}));
        assert_eq!(
            codec.from_json_value(&json!({"$date": 1_500_000_000_000i64})).unwrap(),
            date
        );
    }

    #[test]
    fn binary_uses_base64() {
        let codec = EjsonCodec;
        let bytes = Value::Bytes(vec![0, 1, 2, 255]);
        let json = codec.to_json_value(&bytes);
        assert_eq!(json, json!({"$binary": "AAEC/w=="}));
        assert_eq!(codec.from_json_value(&json).unwrap(), bytes);
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let codec = EjsonCodec;
        let err = codec
            .from_json_value(&json!({"$binary": "not base64!"}))
            .unwrap_err();
        assert!(matches!(err, CodecError::DecodeError(_)));
    }

    #[test]
    fn non_finite_floats_survive() {
        let codec = EjsonCodec;
        for f in [f64::INFINITY, f64::NEG_INFINITY] {
            let text = codec.stringify(&Value::Float(f));
            assert_eq!(codec.parse(&text).unwrap(), Value::Float(f));
        }
        let nan = codec.parse(&codec.stringify(&Value::Float(f64::NAN))).unwrap();
        assert!(nan.as_float().unwrap().is_nan());
    }

    #[test]
    fn object_id_uses_type_tag() {
        let codec = EjsonCodec;
        let id = Value::ObjectId("5f1d7f3e9d1e8a0017a1b2c3".into());
        let json = codec.to_json_value(&id);
        assert_eq!(json, json!({"$type": "oid", "$value": "5f1d7f3e9d1e8a0017a1b2c3"}));
        assert_eq!(codec.from_json_value(&json).unwrap(), id);
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let codec = EjsonCodec;
        let err = codec
            .from_json_value(&json!({"$type": "decimal", "$value": "1.5"}))
            .unwrap_err();
        assert_eq!(err, CodecError::UnknownType("decimal".into()));
    }

    #[test]
    fn tag_lookalike_objects_are_escaped() {
        let codec = EjsonCodec;
        let lookalike = obj(&[("$date", Value::Int(5))]);
        let json = codec.to_json_value(&lookalike);
        assert_eq!(json, json!({"$escape": {"$date": 5}}));
        assert_eq!(codec.from_json_value(&json).unwrap(), lookalike);
    }

    #[test]
    fn stringify_is_canonical_for_objects() {
        let codec = EjsonCodec;
        let a = obj(&[("b", Value::Int(1)), ("a", Value::Int(2))]);
        let b = obj(&[("a", Value::Int(2)), ("b", Value::Int(1))]);
        assert_eq!(codec.stringify(&a), codec.stringify(&b));
        assert_eq!(codec.stringify(&a), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn parse_rejects_non_json_text() {
        let codec = EjsonCodec;
        assert!(codec.parse("noodol").is_err());
        assert!(codec.parse("").is_err());
        assert_eq!(codec.parse("\"noodol\"").unwrap(), Value::from("noodol"));
        assert_eq!(codec.parse("[]").unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn equals_compares_numbers_by_magnitude() {
        let codec = EjsonCodec;
        assert!(codec.equals(&Value::Int(2), &Value::Float(2.0)));
        assert!(!codec.equals(&Value::Int(2), &Value::Float(2.5)));
        assert!(codec.equals(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
        assert!(!codec.equals(&Value::from("2"), &Value::Int(2)));
        // only exact integers match across types
        assert!(!codec.equals(&Value::Int(9_007_199_254_740_993), &Value::Float(9_007_199_254_740_992.0)));
    }

    #[test]
    fn equal_numbers_share_an_equality_key() {
        let codec = EjsonCodec;
        let key = codec.equality_key(&Value::Int(2));
        assert_eq!(codec.equality_key(&Value::Float(2.0)), key);
        assert_eq!(
            codec.equality_key(&Value::Float(-0.0)),
            codec.equality_key(&Value::Float(0.0))
        );
        assert_eq!(codec.equality_key(&Value::Float(0.0)), codec.equality_key(&Value::Int(0)));
        assert_ne!(codec.equality_key(&Value::Float(2.5)), key);
        assert_eq!(codec.equality_key(&Value::from("x")), codec.stringify(&Value::from("x")));
    }

    #[test]
    fn equals_recurses_into_composites() {
        let codec = EjsonCodec;
        let a = obj(&[("list", Value::Array(vec![Value::Int(1), Value::Float(2.0)]))]);
        let b = obj(&[("list", Value::Array(vec![Value::Float(1.0), Value::Int(2)]))]);
        assert!(codec.equals(&a, &b));
        assert!(!codec.equals(&a, &obj(&[])));
    }

    #[test]
    fn codec_id_is_ejson() {
        assert_eq!(EjsonCodec.codec_id(), "ejson");
    }

    fn scalar_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            ".*".prop_map(Value::String),
            proptest::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
            (-8_000_000_000_000i64..8_000_000_000_000i64).prop_map(Value::date_from_millis),
            "[0-9a-f]{24}".prop_map(Value::ObjectId),
        ]
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        scalar_strategy().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::hash_map("[$a-z]{1,6}", inner, 0..4).prop_map(Value::Object),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_of_encode_is_equal(value in value_strategy()) {
            let codec = EjsonCodec;
            let decoded = codec.parse(&codec.stringify(&value)).unwrap();
            prop_assert!(codec.equals(&decoded, &value));
        }
    }
}
