//! Reference entities, their source slots, and reference rows.
//!
//! A reference entity is a table whose rows point at exactly one of several
//! source tables. Each possible source is a [`ReferenceSource`] slot: a
//! nullable, unique foreign-key column on the reference table.

use std::collections::HashSet;

use crate::{
  Error, Result,
  ident::Ident,
  proxy::{FieldProxies, ProxyField},
  value::{Row, Value},
};

// ─── Source slots ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSource {
  name:   String,
  column: Ident,
  entity: String,
}

impl ReferenceSource {
  /// `name` is the slot name (`dog`), `column` the foreign-key column on the
  /// reference table (`dog_id`), `entity` the source entity (`Dog`).
  pub fn new(
    name: impl Into<String>,
    column: &str,
    entity: impl Into<String>,
  ) -> Result<Self> {
    Ok(Self {
      name:   name.into(),
      column: Ident::new(column)?,
      entity: entity.into(),
    })
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn column(&self) -> &Ident { &self.column }

  pub fn entity(&self) -> &str { &self.entity }

  /// Slots can be addressed by slot name or by column name.
  pub fn matches(&self, name: &str) -> bool {
    self.name == name || self.column.as_str() == name
  }
}

// ─── Reference entity ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ReferenceEntity {
  name:    String,
  sources: Vec<ReferenceSource>,
  proxies: FieldProxies,
}

impl ReferenceEntity {
  pub fn builder(name: impl Into<String>) -> ReferenceEntityBuilder {
    ReferenceEntityBuilder {
      name:    name.into(),
      sources: Vec::new(),
      proxies: FieldProxies::new(),
    }
  }

  pub fn name(&self) -> &str { &self.name }

  /// Source slots in declaration order.
  pub fn sources(&self) -> &[ReferenceSource] { &self.sources }

  pub fn proxies(&self) -> &FieldProxies { &self.proxies }

  pub fn source(&self, name: &str) -> Result<&ReferenceSource> {
    self
      .sources
      .iter()
      .find(|s| s.matches(name))
      .ok_or_else(|| Error::UnknownSource {
        entity:      self.name.clone(),
        source_name: name.to_owned(),
      })
  }

  /// The slot a reference row is bound to: the first slot, in declaration
  /// order, whose column is not null.
  pub fn unpack<'a>(&'a self, row: &Row) -> Result<BoundSource<'a>> {
    for source in &self.sources {
      if let Some(key) = row.get(source.column.as_str())
        && !key.is_null()
      {
        return Ok(BoundSource { source, key: key.clone() });
      }
    }
    Err(Error::NoSourceBound(self.name.clone()))
  }
}

/// A populated slot and the source primary key it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSource<'a> {
  pub source: &'a ReferenceSource,
  pub key:    Value,
}

pub struct ReferenceEntityBuilder {
  name:    String,
  sources: Vec<(String, String, String)>,
  proxies: FieldProxies,
}

impl ReferenceEntityBuilder {
  pub fn source(
    mut self,
    name: impl Into<String>,
    column: impl Into<String>,
    entity: impl Into<String>,
  ) -> Self {
    self.sources.push((name.into(), column.into(), entity.into()));
    self
  }

  pub fn proxy(mut self, proxy: impl ProxyField + 'static) -> Self {
    self.proxies.push(proxy);
    self
  }

  pub fn build(self) -> Result<ReferenceEntity> {
    if self.sources.is_empty() {
      return Err(Error::NoSourcesDeclared(self.name));
    }

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(self.sources.len());
    for (name, column, entity) in self.sources {
      let source = ReferenceSource::new(name, &column, entity)?;
      let mut keys = vec![source.name.clone()];
      if source.column.as_str() != source.name {
        keys.push(source.column.as_str().to_owned());
      }
      for key in keys {
        if !seen.insert(key.clone()) {
          return Err(Error::DuplicateSource { entity: self.name, name: key });
        }
      }
      sources.push(source);
    }

    for proxy in self.proxies.iter() {
      for overridden in proxy.overridden_sources() {
        if !sources.iter().any(|s| s.name == overridden) {
          return Err(Error::UnknownOverride {
            column:      proxy.reference_column().as_str().to_owned(),
            source_name: overridden.to_owned(),
          });
        }
      }
    }

    Ok(ReferenceEntity { name: self.name, sources, proxies: self.proxies })
  }
}

// ─── Reference rows ──────────────────────────────────────────────────────────

/// A loaded reference row.
///
/// References are written only by the generated triggers; every mutation
/// entry point here fails without touching the database.
#[derive(Debug, Clone)]
pub struct Reference<'e> {
  entity: &'e ReferenceEntity,
  row:    Row,
}

impl<'e> Reference<'e> {
  pub fn new(entity: &'e ReferenceEntity, row: Row) -> Self { Self { entity, row } }

  pub fn entity(&self) -> &'e ReferenceEntity { self.entity }

  pub fn row(&self) -> &Row { &self.row }

  pub fn unpack(&self) -> Result<BoundSource<'e>> { self.entity.unpack(&self.row) }

  pub fn save(&self) -> Result<()> { Err(Error::ImmutableReference("save")) }

  pub fn delete(&self) -> Result<()> { Err(Error::ImmutableReference("delete")) }
}
