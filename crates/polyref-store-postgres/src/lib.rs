//! PostgreSQL backend for polyref.
//!
//! Generated triggers call PL/pgSQL functions and the single-source rule is a
//! real `CHECK` constraint. All DDL for one entity runs in one transaction.

mod encode;
mod executor;
mod schema;

pub mod error;

pub use error::{Error, Result};
pub use executor::PgExecutor;

#[cfg(test)]
mod tests;
