//! Extended cache value model

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::BuildHasher;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// A cache payload that may contain types JSON has no native form for
///
/// Serializing a `CacheValue` applies a lossy-but-stable mapping:
///
/// | Variant | Wire form |
/// |---|---|
/// | `Timestamp` | RFC 3339 / ISO-8601 string |
/// | `Date` | `YYYY-MM-DD` string |
/// | `Uuid` | hyphenated lowercase string |
/// | `Decimal` | JSON number (f64) |
/// | `Set` | array, sorted by each element's JSON text |
/// | `Bytes` | UTF-8 text, invalid sequences replaced |
///
/// Non-finite floats, and decimals that do not fit in a finite `f64`, fail
/// serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(Uuid),
    Decimal(BigDecimal),
    Set(Vec<CacheValue>),
    Bytes(Vec<u8>),
    Array(Vec<CacheValue>),
    Map(BTreeMap<String, CacheValue>),
    /// Already-JSON payload, passed through untouched
    Json(serde_json::Value),
}

impl CacheValue {
    /// Build a `Set` from any iterator of values
    pub fn set<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CacheValue>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// Build a `Map` from key/value pairs
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CacheValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn bytes(raw: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(raw.into())
    }
}

fn finite<E: serde::ser::Error>(value: f64, what: &str) -> Result<f64, E> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(E::custom(format!("{what} {value} has no JSON representation")))
    }
}

impl Serialize for CacheValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::UInt(u) => serializer.serialize_u64(*u),
            Self::Float(f) => serializer.serialize_f64(finite(*f, "float")?),
            Self::String(s) => serializer.serialize_str(s),
            Self::Timestamp(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            Self::Date(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            Self::Uuid(id) => serializer.serialize_str(&id.hyphenated().to_string()),
            Self::Decimal(d) => {
                let as_float = d
                    .to_f64()
                    .ok_or_else(|| S::Error::custom(format!("decimal {d} does not fit in f64")))?;
                serializer.serialize_f64(finite(as_float, "decimal")?)
            }
            Self::Set(items) => {
                let mut rendered = items
                    .iter()
                    .map(|item| {
                        let json = serde_json::to_value(item).map_err(S::Error::custom)?;
                        Ok((json.to_string(), json))
                    })
                    .collect::<Result<Vec<_>, S::Error>>()?;
                rendered.sort_by(|a, b| a.0.cmp(&b.0));

                let mut seq = serializer.serialize_seq(Some(rendered.len()))?;
                for (_, json) in &rendered {
                    seq.serialize_element(json)?;
                }
                seq.end()
            }
            Self::Bytes(raw) => serializer.serialize_str(&String::from_utf8_lossy(raw)),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Self::Json(json) => json.serialize(serializer),
        }
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for CacheValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for CacheValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for CacheValue {
    fn from(u: u64) -> Self {
        Self::UInt(u)
    }
}

impl From<f64> for CacheValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for CacheValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<NaiveDate> for CacheValue {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl From<Uuid> for CacheValue {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<BigDecimal> for CacheValue {
    fn from(d: BigDecimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(json: serde_json::Value) -> Self {
        Self::Json(json)
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(items: Vec<CacheValue>) -> Self {
        Self::Array(items)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(entries: BTreeMap<String, CacheValue>) -> Self {
        Self::Map(entries)
    }
}

impl<T, S> From<HashSet<T, S>> for CacheValue
where
    T: Into<CacheValue>,
    S: BuildHasher,
{
    fn from(items: HashSet<T, S>) -> Self {
        Self::set(items)
    }
}

impl<T: Into<CacheValue>> From<BTreeSet<T>> for CacheValue {
    fn from(items: BTreeSet<T>) -> Self {
        Self::set(items)
    }
}
