//! The declarative mapping file.
//!
//! ```toml
//! [database]
//! dialect = "sqlite"
//! url = "zoo.db"
//!
//! [[entities]]
//! name = "Dog"
//! table = "dogs"
//! columns = ["name", "bark_sound"]
//!
//! [[entities]]
//! name = "Animal"
//! table = "animals"          # no columns: introspected from the database
//!
//! [[references]]
//! entity = "Animal"
//! sources = [{ name = "dog", column = "dog_id", entity = "Dog" }]
//!
//! [[references.proxies]]
//! column = "sound"
//! default = false
//! kind = { type = "char", max_length = 40 }
//! overrides = { dog = "bark_sound" }
//! ```

use std::{collections::BTreeMap, path::Path};

use anyhow::Context as _;
use polyref_core::{
  Dialect, ReferenceEntity, ReferenceRegistry,
  expr::Expr,
  proxy::{ColumnKind, ProxyBuilder},
  schema::EntitySchema,
};
use serde::Deserialize;

fn yes() -> bool { true }

fn default_primary_key() -> String { "id".to_owned() }

#[derive(Debug, Deserialize)]
pub struct Mapping {
  #[serde(default)]
  pub database:   DatabaseConfig,
  #[serde(default)]
  pub entities:   Vec<EntityConfig>,
  #[serde(default)]
  pub references: Vec<ReferenceConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DatabaseConfig {
  #[serde(default)]
  pub dialect: Dialect,
  pub url:     Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EntityConfig {
  pub name:        String,
  pub table:       String,
  #[serde(default = "default_primary_key")]
  pub primary_key: String,
  /// Nullable columns besides the primary key. Absent means "introspect".
  pub columns:     Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ReferenceConfig {
  pub entity:  String,
  pub sources: Vec<SourceConfig>,
  #[serde(default)]
  pub proxies: Vec<ProxyConfig>,
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
  pub name:   String,
  pub column: String,
  pub entity: String,
}

#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
  pub column:         String,
  pub foreign_column: Option<String>,
  /// Proxy sources without an override through the default column.
  #[serde(default = "yes")]
  pub default:        bool,
  /// Declares the column; a plain proxy when absent.
  pub kind:           Option<ColumnKind>,
  #[serde(default = "yes")]
  pub nullable:       bool,
  #[serde(default = "yes")]
  pub indexed:        bool,
  #[serde(default)]
  pub overrides:      BTreeMap<String, OverrideConfig>,
}

/// `"column"`, `{ expr = ... }` or `{ skip = true }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OverrideConfig {
  Column(String),
  Expr { expr: Expr },
  Skip { skip: bool },
}

impl Mapping {
  /// Reads `path`, then applies `POLYREF_` environment overrides
  /// (`POLYREF_DATABASE__URL`, `POLYREF_DATABASE__DIALECT`).
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("POLYREF")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .with_context(|| format!("failed to read mapping file {}", path.display()))?;
    settings
      .try_deserialize()
      .context("failed to deserialise mapping")
  }

  /// Entities whose columns are declared in the file.
  pub fn declared_schemas(&self) -> polyref_core::Result<Vec<EntitySchema>> {
    self
      .entities
      .iter()
      .filter_map(|e| e.columns.as_ref().map(|columns| (e, columns)))
      .map(|(entity, columns)| {
        let mut schema =
          EntitySchema::new(&entity.name, &entity.table, &entity.primary_key)?;
        for column in columns.iter().filter(|c| **c != entity.primary_key) {
          schema = schema.column(column)?;
        }
        Ok(schema)
      })
      .collect()
  }

  /// `(entity, table)` pairs that have to be read from the database.
  pub fn undeclared(&self) -> Vec<(&str, &str)> {
    self
      .entities
      .iter()
      .filter(|e| e.columns.is_none())
      .map(|e| (e.name.as_str(), e.table.as_str()))
      .collect()
  }

  pub fn registry(&self) -> polyref_core::Result<ReferenceRegistry> {
    let mut registry = ReferenceRegistry::new();
    for reference in &self.references {
      registry.register(reference.build()?)?;
    }
    Ok(registry)
  }
}

impl ReferenceConfig {
  fn build(&self) -> polyref_core::Result<ReferenceEntity> {
    let mut builder = ReferenceEntity::builder(&self.entity);
    for source in &self.sources {
      builder = builder.source(&source.name, &source.column, &source.entity);
    }
    for proxy in &self.proxies {
      let declared = proxy.builder();
      builder = match proxy.kind {
        Some(kind) => builder.proxy(declared.proxied(kind)?),
        None => builder.proxy(declared.field()?),
      };
    }
    builder.build()
  }
}

impl ProxyConfig {
  fn builder(&self) -> ProxyBuilder {
    let mut builder = ProxyBuilder::new(&self.column);
    if let Some(foreign) = &self.foreign_column {
      builder = builder.foreign_column(foreign);
    }
    if !self.default {
      builder = builder.without_default();
    }
    if !self.nullable {
      builder = builder.not_null();
    }
    if !self.indexed {
      builder = builder.unindexed();
    }
    for (source, mapping) in &self.overrides {
      builder = match mapping {
        OverrideConfig::Column(column) => builder.source_column(source, column),
        OverrideConfig::Expr { expr } => builder.source_expr(source, expr.clone()),
        OverrideConfig::Skip { skip: true } => builder.skip_source(source),
        OverrideConfig::Skip { skip: false } => builder,
      };
    }
    builder
  }
}
