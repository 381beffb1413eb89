//! Error types for `polyref-core`.

use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  // ── Declaration / generation time ─────────────────────────────────────

  #[error(
    "proxy expression over {source_table:?} must touch only that table, \
     touched {tables:?}"
  )]
  MultiTableExpression {
    source_table: String,
    tables:       BTreeSet<String>,
  },

  #[error("unknown column {column:?} on table {table:?}")]
  UnknownColumn { table: String, column: String },

  #[error("unsafe identifier: {0:?}")]
  UnsafeIdentifier(String),

  #[error("identifier exceeds {max} bytes: {name:?}")]
  IdentifierTooLong { name: String, max: usize },

  #[error("unknown entity: {0:?}")]
  UnknownEntity(String),

  #[error("entity {0:?} is already registered")]
  DuplicateEntity(String),

  #[error("reference {entity:?} has no source named {source_name:?}")]
  UnknownSource { entity: String, source_name: String },

  #[error("reference {entity:?} declares source {name:?} twice")]
  DuplicateSource { entity: String, name: String },

  #[error("reference {0:?} declares no sources")]
  NoSourcesDeclared(String),

  #[error("proxy {column:?} overrides undeclared source {source_name:?}")]
  UnknownOverride { column: String, source_name: String },

  #[error("generated body contains the reserved quote tag {0:?}")]
  QuoteTagCollision(&'static str),

  // ── Read time ─────────────────────────────────────────────────────────

  #[error("reference row in {0:?} has no source bound")]
  NoSourceBound(String),

  #[error("source {source_name:?} row for key {key} is missing")]
  SourceRowMissing { source_name: String, key: String },

  #[error("at least one source needs to be selected")]
  NoSourcesSelected,

  /// References are written only by the generated triggers.
  #[error("cannot {0} a reference: only triggers may write references")]
  ImmutableReference(&'static str),

  // ── Collaborators ─────────────────────────────────────────────────────

  #[error("executor error: {0}")]
  Executor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn executor(
    err: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Self::Executor(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
