//! Entity schemas and the [`SchemaCatalog`] introspection seam.
//!
//! The engine never creates or alters tables; it only reads table, column and
//! primary-key names through this trait. [`Catalog`] is the explicit,
//! statically-registered implementation; the store crates can build
//! [`EntitySchema`]s from a live database.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, ident::Ident};

// ─── Schema types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
  pub name:     Ident,
  #[serde(default = "default_nullable")]
  pub nullable: bool,
}

fn default_nullable() -> bool { true }

impl ColumnSchema {
  pub fn new(name: &str, nullable: bool) -> Result<Self> {
    Ok(Self { name: Ident::new(name)?, nullable })
  }
}

/// A named entity backed by one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
  pub name:        String,
  pub table:       Ident,
  pub primary_key: Ident,
  pub columns:     Vec<ColumnSchema>,
}

impl EntitySchema {
  /// Starts a schema whose primary key is also its first, non-null column.
  pub fn new(name: impl Into<String>, table: &str, primary_key: &str) -> Result<Self> {
    let primary_key = Ident::new(primary_key)?;
    Ok(Self {
      name:    name.into(),
      table:   Ident::new(table)?,
      columns: vec![ColumnSchema { name: primary_key.clone(), nullable: false }],
      primary_key,
    })
  }

  /// Adds a nullable column.
  pub fn column(mut self, name: &str) -> Result<Self> {
    self.columns.push(ColumnSchema::new(name, true)?);
    Ok(self)
  }

  /// Adds a non-null column.
  pub fn required_column(mut self, name: &str) -> Result<Self> {
    self.columns.push(ColumnSchema::new(name, false)?);
    Ok(self)
  }

  pub fn has_column(&self, name: &str) -> bool {
    self.columns.iter().any(|c| c.name.as_str() == name)
  }

  pub fn find_column(&self, name: &str) -> Result<&ColumnSchema> {
    self
      .columns
      .iter()
      .find(|c| c.name.as_str() == name)
      .ok_or_else(|| Error::UnknownColumn {
        table:  self.table.as_str().to_owned(),
        column: name.to_owned(),
      })
  }
}

// ─── Introspection seam ──────────────────────────────────────────────────────

/// Read-only access to entity schemas.
pub trait SchemaCatalog: Send + Sync {
  fn entity(&self, name: &str) -> Option<&EntitySchema>;

  fn require(&self, name: &str) -> Result<&EntitySchema> {
    self
      .entity(name)
      .ok_or_else(|| Error::UnknownEntity(name.to_owned()))
  }

  fn table_name(&self, entity: &str) -> Result<&Ident> {
    Ok(&self.require(entity)?.table)
  }

  fn column_name(&self, entity: &str, field: &str) -> Result<&Ident> {
    Ok(&self.require(entity)?.find_column(field)?.name)
  }

  fn primary_key_column(&self, entity: &str) -> Result<&Ident> {
    Ok(&self.require(entity)?.primary_key)
  }
}

/// In-memory catalog populated by explicit registration.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  entities: Vec<EntitySchema>,
  by_name:  HashMap<String, usize>,
}

impl Catalog {
  pub fn new() -> Self { Self::default() }

  pub fn register(&mut self, schema: EntitySchema) -> Result<()> {
    if self.by_name.contains_key(&schema.name) {
      return Err(Error::DuplicateEntity(schema.name));
    }
    self.by_name.insert(schema.name.clone(), self.entities.len());
    self.entities.push(schema);
    Ok(())
  }

  pub fn with(mut self, schema: EntitySchema) -> Result<Self> {
    self.register(schema)?;
    Ok(self)
  }

  pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
    self.entities.iter()
  }
}

impl SchemaCatalog for Catalog {
  fn entity(&self, name: &str) -> Option<&EntitySchema> {
    self.by_name.get(name).map(|&i| &self.entities[i])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dogs() -> EntitySchema {
    EntitySchema::new("Dog", "dogs", "id")
      .and_then(|s| s.column("bark_sound"))
      .unwrap()
  }

  #[test]
  fn introspection_helpers_resolve_names() {
    let catalog = Catalog::new().with(dogs()).unwrap();
    assert_eq!(catalog.table_name("Dog").unwrap().as_str(), "dogs");
    assert_eq!(catalog.primary_key_column("Dog").unwrap().as_str(), "id");
    assert_eq!(
      catalog.column_name("Dog", "bark_sound").unwrap().as_str(),
      "bark_sound"
    );
  }

  #[test]
  fn unknown_lookups_fail() {
    let catalog = Catalog::new().with(dogs()).unwrap();
    assert!(matches!(catalog.require("Cat"), Err(Error::UnknownEntity(_))));
    assert!(matches!(
      catalog.column_name("Dog", "meow_sound"),
      Err(Error::UnknownColumn { .. })
    ));
  }

  #[test]
  fn duplicate_registration_is_rejected() {
    let mut catalog = Catalog::new();
    catalog.register(dogs()).unwrap();
    assert!(matches!(
      catalog.register(dogs()),
      Err(Error::DuplicateEntity(name)) if name == "Dog"
    ));
  }
}
