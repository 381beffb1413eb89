//! Error type for `polyref-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] polyref_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("table not found: {0}")]
  TableNotFound(String),

  #[error("table {0} has no primary key")]
  NoPrimaryKey(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
