//! Tagged values used as DDP method-call parameters.
//!
//! Method parameters are heterogeneous: `loadHistory` takes
//! `[room_id, null, 10, null]` while `browseChannels` takes a single object.
//! Rather than building untyped JSON trees at every call site, callers build
//! a small closed set of [`Param`] variants and the codec serializes them.
//!
//! Object keys keep their insertion order on the wire.  The server does not
//! care, but a stable order makes encoded frames predictable in logs and tests.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// One JSON-compatible parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// JSON `null`.
    Null,
    /// A JSON integer.
    Int(i64),
    /// A JSON string.
    Str(String),
    /// An ordered JSON array.
    Array(Vec<Param>),
    /// A JSON object as `(key, value)` pairs in insertion order.
    Object(Vec<(String, Param)>),
}

impl Param {
    /// Builds a [`Param::Object`] from `(key, value)` pairs.
    ///
    /// ```rust
    /// use rocketchat_core::Param;
    ///
    /// let p = Param::object([("page", Param::from(0)), ("limit", Param::from(100))]);
    /// assert_eq!(p.get("limit"), Some(&Param::Int(100)));
    /// ```
    pub fn object<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Param)>,
    {
        Param::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Looks up `key` in an object parameter.  Returns `None` for other variants.
    pub fn get(&self, key: &str) -> Option<&Param> {
        match self {
            Param::Object(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

impl Serialize for Param {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Param::Null => serializer.serialize_unit(),
            Param::Int(n) => serializer.serialize_i64(*n),
            Param::Str(s) => serializer.serialize_str(s),
            Param::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Param::Object(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (key, value) in pairs {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}
