//! SQLite backend for polyref.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. SQLite has no trigger functions, so
//! the generated triggers carry their upsert inline and the single-source
//! check runs in `BEFORE` triggers.

mod encode;
mod executor;
mod schema;

pub mod error;

pub use error::{Error, Result};
pub use executor::SqliteExecutor;
