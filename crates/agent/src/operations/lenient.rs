//! Forgiving deserializers for model-produced parameters.
//!
//! Reasoning backends routinely quote numbers (`"count": "5"`); these accept
//! either form.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

fn number<'de, D: Deserializer<'de>>(value: Value) -> Result<f64, D::Error> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("number out of range")),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("expected a number, got '{}'", s))),
        other => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

pub fn opt_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let n = number::<D>(value)?;
            if n < 0.0 || n.fract() != 0.0 {
                return Err(de::Error::custom(format!(
                    "expected a non-negative integer, got {}",
                    n
                )));
            }
            Ok(Some(n as usize))
        }
    }
}

pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => number::<D>(value).map(Some),
    }
}
