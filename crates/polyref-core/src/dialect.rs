//! SQL dialects the generated DDL targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{proxy::ColumnKind, value::Value};

/// Dollar-quote tag wrapping PL/pgSQL bodies.
pub const BODY_TAG: &str = "$polyref$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
  /// PostgreSQL: PL/pgSQL trigger functions, `ALTER TABLE ... CHECK`.
  #[default]
  Postgres,
  /// SQLite: inline trigger bodies; the check constraint is emulated with
  /// `BEFORE` triggers.
  Sqlite,
}

impl Dialect {
  /// Renders `value` as an inline literal. Used where bind parameters are not
  /// accepted, i.e. inside DDL bodies.
  pub fn literal(self, value: &Value) -> String {
    match value {
      Value::Null => "NULL".to_owned(),
      Value::Bool(b) => match self {
        Self::Postgres => if *b { "TRUE" } else { "FALSE" }.to_owned(),
        Self::Sqlite => if *b { "1" } else { "0" }.to_owned(),
      },
      Value::Integer(i) => i.to_string(),
      Value::Real(r) if r.is_finite() => format!("{r:?}"),
      Value::Real(r) => match self {
        Self::Postgres => format!("'{r}'::double precision"),
        Self::Sqlite => "NULL".to_owned(),
      },
      Value::Text(s) => quote_string(s),
      Value::Uuid(u) => match self {
        Self::Postgres => format!("'{u}'::uuid"),
        Self::Sqlite => format!("'{u}'"),
      },
      Value::Timestamp(t) => match self {
        Self::Postgres => format!("'{}'::timestamptz", t.to_rfc3339()),
        Self::Sqlite => format!("'{}'", t.to_rfc3339()),
      },
      Value::Blob(bytes) => {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        match self {
          Self::Postgres => format!("'\\x{hex}'::bytea"),
          Self::Sqlite => format!("X'{hex}'"),
        }
      }
    }
  }

  /// Positional bind parameter, 1-based.
  pub fn placeholder(self, index: usize) -> String {
    match self {
      Self::Postgres => format!("${index}"),
      Self::Sqlite => format!("?{index}"),
    }
  }

  /// Column type for a proxied column of the given kind.
  pub fn column_type(self, kind: ColumnKind) -> String {
    match (self, kind) {
      (Self::Postgres, ColumnKind::DateTime) => "timestamp with time zone".into(),
      (Self::Postgres, ColumnKind::Date) => "date".into(),
      (Self::Postgres, ColumnKind::Integer) => "integer".into(),
      (Self::Postgres, ColumnKind::ForeignKey) => "bigint".into(),
      (Self::Postgres, ColumnKind::Text) => "text".into(),
      (Self::Postgres, ColumnKind::Char { max_length }) => {
        format!("varchar({max_length})")
      }
      (Self::Sqlite, ColumnKind::DateTime | ColumnKind::Date) => "TEXT".into(),
      (Self::Sqlite, ColumnKind::Integer | ColumnKind::ForeignKey) => {
        "INTEGER".into()
      }
      (Self::Sqlite, ColumnKind::Text) => "TEXT".into(),
      (Self::Sqlite, ColumnKind::Char { max_length }) => {
        format!("VARCHAR({max_length})")
      }
    }
  }
}

impl fmt::Display for Dialect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Postgres => "postgres",
      Self::Sqlite => "sqlite",
    })
  }
}

/// `'it''s'`
pub fn quote_string(s: &str) -> String {
  format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_literals_escape_quotes() {
    assert_eq!(
      Dialect::Postgres.literal(&Value::Text("it's".into())),
      "'it''s'"
    );
  }

  #[test]
  fn booleans_follow_dialect() {
    assert_eq!(Dialect::Postgres.literal(&Value::Bool(true)), "TRUE");
    assert_eq!(Dialect::Sqlite.literal(&Value::Bool(true)), "1");
  }

  #[test]
  fn reals_keep_a_decimal_point() {
    assert_eq!(Dialect::Sqlite.literal(&Value::Real(2.0)), "2.0");
  }

  #[test]
  fn char_columns_carry_their_length() {
    assert_eq!(
      Dialect::Postgres.column_type(ColumnKind::Char { max_length: 12 }),
      "varchar(12)"
    );
  }
}
