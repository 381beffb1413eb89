//! Polymorphic references enforced by the database.
//!
//! A reference entity is a table whose rows point at exactly one of several
//! source tables. This crate generates the DDL that keeps such a table
//! consistent: a check constraint allowing exactly one populated slot, a
//! unique index per slot, and a trigger per source table that upserts the
//! reference row and copies proxied columns across.
//!
//! The crate has no database driver dependencies. Statements run through the
//! [`exec::SqlExecutor`] trait; table shapes come from
//! [`schema::SchemaCatalog`].

pub mod binding;
pub mod controller;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod exec;
pub mod expr;
pub mod ident;
pub mod proxy;
pub mod query;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod statement;
pub mod value;

pub use controller::{ApplyReport, ReferenceController};
pub use dialect::Dialect;
pub use entity::{Reference, ReferenceEntity, ReferenceSource};
pub use error::{Error, Result};
pub use registry::ReferenceRegistry;
pub use statement::Statement;
pub use value::{Row, Value};
