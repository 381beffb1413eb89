//! Bound parameter values and result rows exchanged with executors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single SQL value, either bound as a parameter or read back from a row.
///
/// Deserialised untagged: strings that parse as a UUID or an RFC 3339
/// timestamp load as [`Value::Uuid`] or [`Value::Timestamp`], anything else
/// as [`Value::Text`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Bool(bool),
  Integer(i64),
  Real(f64),
  Uuid(Uuid),
  Timestamp(DateTime<Utc>),
  Text(String),
  Blob(Vec<u8>),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Null => f.write_str("NULL"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Integer(i) => write!(f, "{i}"),
      Self::Real(r) => write!(f, "{r}"),
      Self::Text(s) => write!(f, "{s:?}"),
      Self::Uuid(u) => write!(f, "{u}"),
      Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
      Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
    }
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self { Self::Bool(v) }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self { Self::Real(v) }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<String> for Value {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<Uuid> for Value {
  fn from(v: Uuid) -> Self { Self::Uuid(v) }
}

impl From<DateTime<Utc>> for Value {
  fn from(v: DateTime<Utc>) -> Self { Self::Timestamp(v) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

// ─── Row ─────────────────────────────────────────────────────────────────────

/// One result row. Column names may repeat (joined tables), so lookups by
/// name return the first match and positional access is always available.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
  columns: Vec<String>,
  values:  Vec<Value>,
}

impl Row {
  pub fn new() -> Self { Self::default() }

  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
  {
    let mut row = Self::new();
    for (k, v) in pairs {
      row.push(k, v);
    }
    row
  }

  pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
    self.columns.push(column.into());
    self.values.push(value.into());
  }

  pub fn get(&self, column: &str) -> Option<&Value> {
    self
      .columns
      .iter()
      .position(|c| c == column)
      .map(|i| &self.values[i])
  }

  pub fn get_index(&self, index: usize) -> Option<&Value> { self.values.get(index) }

  /// `true` when the column is absent or holds `NULL`.
  pub fn is_null(&self, column: &str) -> bool {
    self.get(column).is_none_or(Value::is_null)
  }

  pub fn columns(&self) -> &[String] { &self.columns }

  pub fn values(&self) -> &[Value] { &self.values }

  pub fn len(&self) -> usize { self.values.len() }

  pub fn is_empty(&self) -> bool { self.values.is_empty() }

  /// Copies the columns in `range` into a new row.
  pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
    Self {
      columns: self.columns[range.clone()].to_vec(),
      values:  self.values[range].to_vec(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn load(json: &str) -> Value { serde_json::from_str(json).unwrap() }

  #[test]
  fn typed_strings_load_before_text() {
    let id = Uuid::new_v4();
    assert_eq!(load(&format!("\"{id}\"")), Value::Uuid(id));
    assert!(matches!(load("\"2024-05-01T12:00:00Z\""), Value::Timestamp(_)));
    assert_eq!(load("\"woof\""), Value::from("woof"));
    assert_eq!(load("7"), Value::Integer(7));
    assert_eq!(load("null"), Value::Null);
  }
}
