//! Tagged attribute values for store-bound rows
//!
//! Source JSON is lifted into [`AttributeValue`] first, then
//! [`normalize`] replaces every binary float with an exact decimal built
//! from the float's shortest round-trip string (`0.1` becomes `0.1`, never
//! `0.1000000000000000055511151231257827`). Mappings and sequences keep
//! their shape and keys.

use crate::error::{PipelineError, PipelineResult};
use bigdecimal::BigDecimal;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Loosely-typed value as it may appear in a row attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Map(BTreeMap<String, AttributeValue>),
    List(Vec<AttributeValue>),
    /// Binary float from the source; never written to the store
    Float(f64),
    Integer(i64),
    Decimal(BigDecimal),
    Text(String),
    Bool(bool),
    Null,
}

impl AttributeValue {
    /// Lift a JSON value, keeping floats as [`AttributeValue::Float`]
    ///
    /// Unsigned integers above `i64::MAX` are carried as exact decimals.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => AttributeValue::Null,
            JsonValue::Bool(b) => AttributeValue::Bool(*b),
            JsonValue::String(s) => AttributeValue::Text(s.clone()),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttributeValue::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    AttributeValue::Decimal(BigDecimal::from(u))
                } else {
                    AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::Array(items) => {
                AttributeValue::List(items.iter().map(AttributeValue::from_json).collect())
            }
            JsonValue::Object(map) => AttributeValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        AttributeValue::Text(value.into())
    }

    /// True when no [`AttributeValue::Float`] remains anywhere inside
    pub fn is_normalized(&self) -> bool {
        match self {
            AttributeValue::Float(_) => false,
            AttributeValue::Map(map) => map.values().all(AttributeValue::is_normalized),
            AttributeValue::List(items) => items.iter().all(AttributeValue::is_normalized),
            _ => true,
        }
    }

    /// Store encoding in attribute-value form
    ///
    /// `{"S": ..}`, `{"N": "<decimal string>"}`, `{"BOOL": ..}`,
    /// `{"NULL": true}`, `{"L": [..]}`, `{"M": {..}}`. A float that slipped
    /// through normalization is a conversion error.
    pub fn to_store_json(&self) -> PipelineResult<JsonValue> {
        Ok(match self {
            AttributeValue::Map(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.to_store_json()?);
                }
                json!({ "M": out })
            }
            AttributeValue::List(items) => {
                let encoded = items
                    .iter()
                    .map(AttributeValue::to_store_json)
                    .collect::<PipelineResult<Vec<_>>>()?;
                json!({ "L": encoded })
            }
            AttributeValue::Float(f) => {
                return Err(PipelineError::TypeConversion(format!(
                    "unnormalized float {f} cannot be stored"
                )))
            }
            AttributeValue::Integer(i) => json!({ "N": i.to_string() }),
            AttributeValue::Decimal(d) => json!({ "N": d.to_string() }),
            AttributeValue::Text(s) => json!({ "S": s }),
            AttributeValue::Bool(b) => json!({ "BOOL": b }),
            AttributeValue::Null => json!({ "NULL": true }),
        })
    }

    /// Inverse of [`AttributeValue::to_store_json`]
    ///
    /// `N` strings that parse as `i64` come back as integers.
    pub fn from_store_json(value: &JsonValue) -> PipelineResult<Self> {
        let obj = value
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| PipelineError::TypeConversion(format!("not an attribute value: {value}")))?;
        let (tag, inner) = obj
            .iter()
            .next()
            .ok_or_else(|| PipelineError::TypeConversion("empty attribute value".to_string()))?;

        let bad = || PipelineError::TypeConversion(format!("bad `{tag}` payload: {inner}"));

        Ok(match tag.as_str() {
            "S" => AttributeValue::Text(inner.as_str().ok_or_else(bad)?.to_string()),
            "BOOL" => AttributeValue::Bool(inner.as_bool().ok_or_else(bad)?),
            "NULL" => AttributeValue::Null,
            "N" => {
                let raw = inner.as_str().ok_or_else(bad)?;
                match raw.parse::<i64>() {
                    Ok(i) => AttributeValue::Integer(i),
                    Err(_) => AttributeValue::Decimal(BigDecimal::from_str(raw).map_err(|_| bad())?),
                }
            }
            "L" => AttributeValue::List(
                inner
                    .as_array()
                    .ok_or_else(bad)?
                    .iter()
                    .map(AttributeValue::from_store_json)
                    .collect::<PipelineResult<Vec<_>>>()?,
            ),
            "M" => {
                let mut map = BTreeMap::new();
                for (k, v) in inner.as_object().ok_or_else(bad)? {
                    map.insert(k.clone(), AttributeValue::from_store_json(v)?);
                }
                AttributeValue::Map(map)
            }
            other => {
                return Err(PipelineError::TypeConversion(format!(
                    "unknown attribute tag `{other}`"
                )))
            }
        })
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

/// Exact decimal equal to the float's canonical string form
///
/// NaN and infinities have no decimal form and are rejected.
pub fn decimal_from_f64(value: f64) -> PipelineResult<BigDecimal> {
    if !value.is_finite() {
        return Err(PipelineError::TypeConversion(format!(
            "non-finite float {value} has no decimal form"
        )));
    }
    // `{}` on f64 prints the shortest string that round-trips
    let canonical = value.to_string();
    BigDecimal::from_str(&canonical).map_err(|e| {
        PipelineError::TypeConversion(format!("float {canonical} not decimal-parsable: {e}"))
    })
}

/// Replace every float with an exact decimal, recursively
///
/// Idempotent: normalizing an already normalized value returns it unchanged.
pub fn normalize(value: AttributeValue) -> PipelineResult<AttributeValue> {
    Ok(match value {
        AttributeValue::Float(f) => AttributeValue::Decimal(decimal_from_f64(f)?),
        AttributeValue::Map(map) => AttributeValue::Map(
            map.into_iter()
                .map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect::<PipelineResult<BTreeMap<_, _>>>()?,
        ),
        AttributeValue::List(items) => AttributeValue::List(
            items
                .into_iter()
                .map(normalize)
                .collect::<PipelineResult<Vec<_>>>()?,
        ),
        other @ (AttributeValue::Integer(_)
        | AttributeValue::Decimal(_)
        | AttributeValue::Text(_)
        | AttributeValue::Bool(_)
        | AttributeValue::Null) => other,
    })
}

/// Lift and normalize a JSON value in one step
pub fn normalize_json(value: &JsonValue) -> PipelineResult<AttributeValue> {
    normalize(AttributeValue::from_json(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_float_becomes_decimal_of_its_string() {
        for f in [0.1, 85.5, 3.14159, 1e-7, 72.0, -0.25, 1.0e21] {
            let normalized = normalize(AttributeValue::Float(f)).unwrap();
            assert_eq!(normalized, AttributeValue::Decimal(dec(&f.to_string())), "{f}");
        }
    }

    #[test]
    fn test_point_one_is_exact() {
        let AttributeValue::Decimal(d) = normalize(AttributeValue::Float(0.1)).unwrap() else {
            panic!("expected decimal");
        };
        assert_eq!(d, dec("0.1"));
        assert_eq!(d.to_string(), "0.1");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let source = serde_json::json!({
            "score": 87.5,
            "history": [1.25, 2, {"x": 0.3}],
            "label": "Grade 5",
            "active": true,
            "notes": null
        });
        let once = normalize_json(&source).unwrap();
        let twice = normalize(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert!(once.is_normalized());
    }

    #[test]
    fn test_shape_and_keys_preserved() {
        let source = serde_json::json!({
            "a": {"b": [1.5, "x", [2.5]], "c": 3},
            "d": []
        });
        let AttributeValue::Map(map) = normalize_json(&source).unwrap() else {
            panic!("expected map");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "d"]);

        let AttributeValue::Map(inner) = &map["a"] else {
            panic!("expected nested map");
        };
        assert_eq!(inner["c"], AttributeValue::Integer(3));
        let AttributeValue::List(items) = &inner["b"] else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], AttributeValue::Decimal(dec("1.5")));
        assert_eq!(items[1], AttributeValue::text("x"));
        assert_eq!(
            items[2],
            AttributeValue::List(vec![AttributeValue::Decimal(dec("2.5"))])
        );
        assert_eq!(map["d"], AttributeValue::List(vec![]));
    }

    #[test]
    fn test_non_finite_float_is_type_conversion_error() {
        let err = normalize(AttributeValue::List(vec![AttributeValue::Float(f64::NAN)])).unwrap_err();
        assert!(matches!(err, PipelineError::TypeConversion(_)));
        assert!(decimal_from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_store_encoding_round_trip() {
        let value = normalize_json(&serde_json::json!({
            "score": 92.25,
            "count": 4,
            "tags": ["a", true, null]
        }))
        .unwrap();

        let encoded = value.to_store_json().unwrap();
        assert_eq!(encoded["M"]["score"], serde_json::json!({"N": "92.25"}));
        assert_eq!(encoded["M"]["count"], serde_json::json!({"N": "4"}));
        assert_eq!(encoded["M"]["tags"]["L"][2], serde_json::json!({"NULL": true}));

        assert_eq!(AttributeValue::from_store_json(&encoded).unwrap(), value);
    }

    #[test]
    fn test_unnormalized_float_cannot_be_stored() {
        assert!(AttributeValue::Float(1.5).to_store_json().is_err());
    }
}
