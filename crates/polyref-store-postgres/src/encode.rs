//! Conversions between polyref values and PostgreSQL wire types.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use polyref_core::{Row, Value};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use uuid::Uuid;

use crate::{Error, Result};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Binds a [`Value`] as a query parameter, narrowing numbers to the width
/// the server asks for.
#[derive(Debug)]
pub struct PgValue<'a>(pub &'a Value);

impl ToSql for PgValue<'_> {
  fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match self.0 {
      Value::Null => Ok(IsNull::Yes),
      Value::Bool(b) => b.to_sql(ty, out),
      Value::Integer(i) => match *ty {
        Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
        Type::FLOAT8 => (*i as f64).to_sql(ty, out),
        _ => i.to_sql(ty, out),
      },
      Value::Real(r) => match *ty {
        Type::FLOAT4 => (*r as f32).to_sql(ty, out),
        _ => r.to_sql(ty, out),
      },
      Value::Text(s) => s.to_sql(ty, out),
      Value::Uuid(u) => u.to_sql(ty, out),
      Value::Timestamp(t) => match *ty {
        Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
        _ => t.to_sql(ty, out),
      },
      Value::Blob(b) => b.to_sql(ty, out),
    }
  }

  fn accepts(_: &Type) -> bool { true }

  to_sql_checked!();
}

/// Reads every column of a result row by its declared type.
pub fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
  let mut out = Row::new();
  for (i, column) in row.columns().iter().enumerate() {
    let ty = column.type_();
    let value = match *ty {
      Type::BOOL => row.try_get::<_, Option<bool>>(i)?.into(),
      Type::INT2 => row.try_get::<_, Option<i16>>(i)?.map(i64::from).into(),
      Type::INT4 => row.try_get::<_, Option<i32>>(i)?.map(i64::from).into(),
      Type::INT8 => row.try_get::<_, Option<i64>>(i)?.into(),
      Type::FLOAT4 => row.try_get::<_, Option<f32>>(i)?.map(f64::from).into(),
      Type::FLOAT8 => row.try_get::<_, Option<f64>>(i)?.into(),
      Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
        row.try_get::<_, Option<String>>(i)?.into()
      }
      Type::UUID => row.try_get::<_, Option<Uuid>>(i)?.into(),
      Type::TIMESTAMPTZ => row.try_get::<_, Option<DateTime<Utc>>>(i)?.into(),
      Type::TIMESTAMP => row
        .try_get::<_, Option<NaiveDateTime>>(i)?
        .map(|t| t.and_utc())
        .into(),
      Type::BYTEA => match row.try_get::<_, Option<Vec<u8>>>(i)? {
        Some(bytes) => Value::Blob(bytes),
        None => Value::Null,
      },
      _ => {
        return Err(Error::UnsupportedType {
          column:    column.name().to_owned(),
          type_name: ty.name().to_owned(),
        });
      }
    };
    out.push(column.name(), value);
  }
  Ok(out)
}
