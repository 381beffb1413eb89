//! The [`SqlExecutor`] trait.
//!
//! Implemented by database backends (`polyref-store-sqlite`,
//! `polyref-store-postgres`). The controller only ever talks to this
//! abstraction.

use std::future::Future;

use crate::{statement::Statement, value::Row};

/// Runs generated statements against a live connection.
///
/// All methods return `Send` futures so executors can be shared across a
/// multi-threaded runtime.
pub trait SqlExecutor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Run one statement with its bound parameters. Returns the number of rows
  /// affected where the backend reports it.
  fn execute<'a>(
    &'a self,
    statement: &'a Statement,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Run every statement in order inside a single transaction. Either all of
  /// them take effect or none does.
  fn execute_atomic<'a>(
    &'a self,
    statements: &'a [Statement],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Run a query and collect its rows.
  fn query<'a>(
    &'a self,
    statement: &'a Statement,
  ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send + 'a;
}
