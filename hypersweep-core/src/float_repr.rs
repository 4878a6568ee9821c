//! JSON representation of floats that may be NaN or infinite.
//!
//! JSON has no literal for these, and `serde_json` silently writes them as
//! `null`. Here they are written as the strings `"NaN"`, `"inf"` and `"-inf"`
//! and read back from either form.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub(crate) fn non_finite_name(v: f64) -> Option<&'static str> {
    if v.is_nan() {
        Some("NaN")
    } else if v == f64::INFINITY {
        Some("inf")
    } else if v == f64::NEG_INFINITY {
        Some("-inf")
    } else {
        None
    }
}

pub(crate) fn parse_non_finite(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// A float as a JSON value.
pub fn to_value(v: f64) -> serde_json::Value {
    match non_finite_name(v) {
        Some(name) => serde_json::Value::String(name.to_string()),
        None => serde_json::Value::from(v),
    }
}

/// Wraps an `f64` so it serializes with the non-finite string forms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float(pub f64);

impl Serialize for Float {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match non_finite_name(self.0) {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f64(self.0),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FloatRepr {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Float {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match FloatRepr::deserialize(deserializer)? {
            FloatRepr::Number(v) => Ok(Self(v)),
            FloatRepr::Text(s) => parse_non_finite(&s)
                .map(Self)
                .ok_or_else(|| de::Error::custom(format!("expected a number, got \"{s}\""))),
        }
    }
}

/// `#[serde(with = "crate::float_repr::map")]` for `BTreeMap<String, f64>`.
pub mod map {
    use super::*;

    pub fn serialize<S: Serializer>(
        values: &BTreeMap<String, f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(values.iter().map(|(k, v)| (k, Float(*v))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, f64>, D::Error> {
        let raw = BTreeMap::<String, Float>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(k, Float(v))| (k, v)).collect())
    }
}
