//! Conversions between polyref values and SQLite storage classes.
//!
//! UUIDs are bound as hyphenated lowercase strings, timestamps as RFC 3339
//! strings and booleans as `0`/`1`. Reads only ever see SQLite's five
//! storage classes.

use polyref_core::{Row, Value};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};

/// Binds a [`Value`] as a rusqlite parameter.
pub struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(match self.0 {
      Value::Null => ToSqlOutput::Owned(SqliteValue::Null),
      Value::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*b))),
      Value::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
      Value::Real(r) => ToSqlOutput::Owned(SqliteValue::Real(*r)),
      Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
      Value::Uuid(u) => {
        ToSqlOutput::Owned(SqliteValue::Text(u.hyphenated().to_string()))
      }
      Value::Timestamp(t) => ToSqlOutput::Owned(SqliteValue::Text(t.to_rfc3339())),
      Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
    })
  }
}

pub fn decode(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::Integer(i),
    ValueRef::Real(r) => Value::Real(r),
    ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => Value::Blob(b.to_vec()),
  }
}

/// Reads every column of the current result row.
pub fn decode_row(columns: &[String], row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
  let mut out = Row::new();
  for (i, column) in columns.iter().enumerate() {
    out.push(column.clone(), decode(row.get_ref(i)?));
  }
  Ok(out)
}
