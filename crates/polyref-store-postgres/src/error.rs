//! Error type for `polyref-store-postgres`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] polyref_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_postgres::Error),

  #[error("table not found: {0}")]
  TableNotFound(String),

  #[error("table {0} has no primary key")]
  NoPrimaryKey(String),

  #[error("column {column:?} has unsupported type {type_name}")]
  UnsupportedType { column: String, type_name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
