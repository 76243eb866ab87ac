//! Flattened row value objects
//!
//! A `FlatRow` maps dot-joined paths to scalar cells. It never holds a nested
//! structure: arrays are already joined into text by the flattener.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlatValue {
    #[default]
    Empty,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl FlatValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Scalar JSON values map directly; structured values are rendered as
    /// compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Empty cells and blank strings both count as "no value".
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// String form used for key comparison.
    pub fn as_key(&self) -> String {
        self.to_string().trim().to_string()
    }
}

impl fmt::Display for FlatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FlatValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FlatValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FlatValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for FlatValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Single-level mapping from dot-path to scalar, iterated in path order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRow(BTreeMap<String, FlatValue>);

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FlatValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FlatValue>) -> Option<FlatValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<FlatValue> {
        self.0.remove(key)
    }

    /// Merge `other` over `self`; fields from `other` win on collision.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn merged(&self, other: &Self) -> Self {
        let mut row = self.clone();
        row.merge(other);
        row
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FlatValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key cell as a comparison string; `None` when missing or blank.
    pub fn key_value(&self, key_field: &str) -> Option<String> {
        self.get(key_field)
            .filter(|value| !value.is_blank())
            .map(FlatValue::as_key)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, FlatValue)> for FlatRow {
    fn from_iter<I: IntoIterator<Item = (String, FlatValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FlatRow {
    type Item = (String, FlatValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FlatValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
