//! Proxy field declarations and the per-entity proxy registry.
//!
//! A proxy keeps a column of the reference table in sync with a column (or an
//! expression) of whichever source the reference row is bound to. Proxies are
//! built once through [`ProxyBuilder`] and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  dialect::Dialect,
  entity::ReferenceSource,
  expr::{Expr, ExprCompiler},
  ident::Ident,
  resolve::{ResolvedExpr, resolve},
  schema::EntitySchema,
  statement::Statement,
};

// ─── Declarations ────────────────────────────────────────────────────────────

/// The storage kind of a column declared by a [`ProxiedColumn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
  DateTime,
  Date,
  Integer,
  ForeignKey,
  Text,
  Char { max_length: u32 },
}

/// What a proxy reads from one particular source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceMapping {
  Expr(Expr),
  /// The proxy has no counterpart on this source.
  Skip,
}

/// Capability shared by every kind of proxy declaration.
pub trait ProxyField: fmt::Debug + Send + Sync {
  /// The column on the reference table this proxy fills.
  fn reference_column(&self) -> &Ident;

  /// Source column read when no per-source override applies.
  fn foreign_column(&self) -> Option<&Ident>;

  fn source_mapping(&self, source: &str) -> Option<&SourceMapping>;

  /// Names of the sources with an override.
  fn overridden_sources(&self) -> Vec<&str>;

  /// Set when the proxy declares its own column.
  fn kind(&self) -> Option<ColumnKind> { None }

  /// Definition of the declared column, if the proxy declares one.
  fn column_definition(&self, _dialect: Dialect) -> Option<String> { None }

  /// Whether the reference column gets a plain lookup index.
  fn indexed(&self) -> bool { false }

  /// The expression to read from `source`, or `None` when the proxy has no
  /// mapping for it.
  fn render_expression(&self, source: &str) -> Option<Expr> {
    match self.source_mapping(source) {
      Some(SourceMapping::Expr(expr)) => Some(expr.clone()),
      Some(SourceMapping::Skip) => None,
      None => self.foreign_column().cloned().map(Expr::column),
    }
  }
}

#[derive(Debug, Clone)]
struct ProxyConfig {
  reference_column: Ident,
  foreign_column:   Option<Ident>,
  overrides:        Vec<(String, SourceMapping)>,
}

impl ProxyConfig {
  fn mapping(&self, source: &str) -> Option<&SourceMapping> {
    self
      .overrides
      .iter()
      .find(|(name, _)| name == source)
      .map(|(_, m)| m)
  }

  fn sources(&self) -> Vec<&str> {
    self.overrides.iter().map(|(name, _)| name.as_str()).collect()
  }
}

/// Proxies a column declared elsewhere on the reference table.
#[derive(Debug, Clone)]
pub struct FieldProxy {
  config: ProxyConfig,
}

impl ProxyField for FieldProxy {
  fn reference_column(&self) -> &Ident { &self.config.reference_column }

  fn foreign_column(&self) -> Option<&Ident> { self.config.foreign_column.as_ref() }

  fn source_mapping(&self, source: &str) -> Option<&SourceMapping> {
    self.config.mapping(source)
  }

  fn overridden_sources(&self) -> Vec<&str> { self.config.sources() }
}

/// Declares a nullable, indexed column on the reference table and proxies it.
#[derive(Debug, Clone)]
pub struct ProxiedColumn {
  config:   ProxyConfig,
  kind:     ColumnKind,
  nullable: bool,
  indexed:  bool,
}

impl ProxiedColumn {
  pub fn nullable(&self) -> bool { self.nullable }
}

impl ProxyField for ProxiedColumn {
  fn reference_column(&self) -> &Ident { &self.config.reference_column }

  fn foreign_column(&self) -> Option<&Ident> { self.config.foreign_column.as_ref() }

  fn source_mapping(&self, source: &str) -> Option<&SourceMapping> {
    self.config.mapping(source)
  }

  fn overridden_sources(&self) -> Vec<&str> { self.config.sources() }

  fn kind(&self) -> Option<ColumnKind> { Some(self.kind) }

  /// e.g. `"sound" text NULL`
  fn column_definition(&self, dialect: Dialect) -> Option<String> {
    Some(format!(
      "{} {} {}",
      self.config.reference_column,
      dialect.column_type(self.kind),
      if self.nullable { "NULL" } else { "NOT NULL" }
    ))
  }

  fn indexed(&self) -> bool { self.indexed }
}

// ─── Lookup indexes ──────────────────────────────────────────────────────────

/// `<reference>_<column>_idx`
pub fn lookup_index_name(reference_table: &Ident, column: &Ident) -> Result<Ident> {
  Ident::new(format!("{}_{}_idx", reference_table.as_str(), column.as_str()))
}

pub fn lookup_index_statement(
  reference_table: &Ident,
  column: &Ident,
) -> Result<Statement> {
  Ok(Statement::new(format!(
    "CREATE INDEX IF NOT EXISTS {} ON {reference_table} ({column});",
    lookup_index_name(reference_table, column)?
  )))
}

pub fn drop_lookup_index_statement(
  reference_table: &Ident,
  column: &Ident,
) -> Result<Statement> {
  Ok(Statement::new(format!(
    "DROP INDEX IF EXISTS {};",
    lookup_index_name(reference_table, column)?
  )))
}

// ─── Builder ─────────────────────────────────────────────────────────────────

enum RawMapping {
  Column(String),
  Expr(Expr),
  Skip,
}

/// Builds a [`FieldProxy`] or a [`ProxiedColumn`].
///
/// ```
/// # use polyref_core::proxy::{ColumnKind, ProxyBuilder};
/// let sound = ProxyBuilder::new("sound")
///   .source_column("dog", "bark_sound")
///   .source_column("cat", "meow_sound")
///   .proxied(ColumnKind::Text)
///   .unwrap();
/// ```
pub struct ProxyBuilder {
  column:         String,
  foreign_column: Option<String>,
  no_default:     bool,
  overrides:      Vec<(String, RawMapping)>,
  nullable:       bool,
  indexed:        bool,
}

impl ProxyBuilder {
  pub fn new(column: impl Into<String>) -> Self {
    Self {
      column:         column.into(),
      foreign_column: None,
      no_default:     false,
      overrides:      Vec::new(),
      nullable:       true,
      indexed:        true,
    }
  }

  /// Read this source column by default instead of the same-named one.
  pub fn foreign_column(mut self, column: impl Into<String>) -> Self {
    self.foreign_column = Some(column.into());
    self
  }

  /// Only sources with an explicit mapping are proxied.
  pub fn without_default(mut self) -> Self {
    self.no_default = true;
    self
  }

  pub fn source_column(
    mut self,
    source: impl Into<String>,
    column: impl Into<String>,
  ) -> Self {
    self.overrides.push((source.into(), RawMapping::Column(column.into())));
    self
  }

  pub fn source_expr(mut self, source: impl Into<String>, expr: Expr) -> Self {
    self.overrides.push((source.into(), RawMapping::Expr(expr)));
    self
  }

  pub fn skip_source(mut self, source: impl Into<String>) -> Self {
    self.overrides.push((source.into(), RawMapping::Skip));
    self
  }

  pub fn not_null(mut self) -> Self {
    self.nullable = false;
    self
  }

  pub fn unindexed(mut self) -> Self {
    self.indexed = false;
    self
  }

  fn config(self) -> Result<(ProxyConfig, bool, bool)> {
    let reference_column = Ident::new(self.column)?;
    let foreign_column = match (self.no_default, self.foreign_column) {
      (true, _) => None,
      (false, Some(column)) => Some(Ident::new(column)?),
      (false, None) => Some(reference_column.clone()),
    };
    let overrides = self
      .overrides
      .into_iter()
      .map(|(source, raw)| {
        let mapping = match raw {
          RawMapping::Column(column) => SourceMapping::Expr(Expr::col(&column)?),
          RawMapping::Expr(expr) => SourceMapping::Expr(expr),
          RawMapping::Skip => SourceMapping::Skip,
        };
        Ok((source, mapping))
      })
      .collect::<Result<_>>()?;
    Ok((
      ProxyConfig { reference_column, foreign_column, overrides },
      self.nullable,
      self.indexed,
    ))
  }

  pub fn field(self) -> Result<FieldProxy> {
    let (config, ..) = self.config()?;
    Ok(FieldProxy { config })
  }

  pub fn proxied(self, kind: ColumnKind) -> Result<ProxiedColumn> {
    let (config, nullable, indexed) = self.config()?;
    Ok(ProxiedColumn { config, kind, nullable, indexed })
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Target columns and their resolved expressions for one source, in
/// declaration order. `targets[i]` is filled from `expressions[i]`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedProxies {
  pub targets:     Vec<Ident>,
  pub expressions: Vec<ResolvedExpr>,
}

impl ResolvedProxies {
  pub fn is_empty(&self) -> bool { self.targets.is_empty() }

  /// Distinct source columns read by any expression, sorted.
  pub fn trigger_columns(&self) -> Vec<&Ident> {
    let mut cols: Vec<&Ident> = self
      .expressions
      .iter()
      .flat_map(ResolvedExpr::source_columns)
      .collect();
    cols.sort();
    cols.dedup();
    cols
  }

  pub fn params(&self) -> impl Iterator<Item = &crate::value::Value> {
    self.expressions.iter().flat_map(|e| e.params.iter())
  }
}

/// All proxy declarations of one reference entity.
#[derive(Debug, Default)]
pub struct FieldProxies {
  proxies: Vec<Box<dyn ProxyField>>,
}

impl FieldProxies {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, proxy: impl ProxyField + 'static) {
    self.proxies.push(Box::new(proxy));
  }

  pub fn iter(&self) -> impl Iterator<Item = &dyn ProxyField> {
    self.proxies.iter().map(|p| p.as_ref())
  }

  pub fn len(&self) -> usize { self.proxies.len() }

  pub fn is_empty(&self) -> bool { self.proxies.is_empty() }

  pub fn resolve_for_source(
    &self,
    source: &ReferenceSource,
    source_schema: &EntitySchema,
    compiler: &dyn ExprCompiler,
    dialect: Dialect,
  ) -> Result<ResolvedProxies> {
    let mut resolved = ResolvedProxies::default();
    for proxy in &self.proxies {
      let Some(expr) = proxy.render_expression(source.name()) else {
        continue;
      };
      resolved
        .expressions
        .push(resolve(compiler, dialect, source_schema, &expr)?);
      resolved.targets.push(proxy.reference_column().clone());
    }
    Ok(resolved)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::SqlCompiler;

  fn dogs() -> EntitySchema {
    EntitySchema::new("Dog", "dogs", "id")
      .and_then(|s| s.column("bark_sound"))
      .and_then(|s| s.column("name"))
      .and_then(|s| s.column("born_at"))
      .unwrap()
  }

  fn dog_source() -> ReferenceSource {
    ReferenceSource::new("dog", "dog_id", "Dog").unwrap()
  }

  #[test]
  fn default_mapping_reads_the_same_named_column() {
    let proxy = ProxyBuilder::new("name").field().unwrap();
    assert_eq!(
      proxy.render_expression("dog"),
      Some(Expr::col("name").unwrap())
    );
  }

  #[test]
  fn override_wins_over_default() {
    let proxy = ProxyBuilder::new("sound")
      .source_column("dog", "bark_sound")
      .field()
      .unwrap();
    assert_eq!(
      proxy.render_expression("dog"),
      Some(Expr::col("bark_sound").unwrap())
    );
    assert_eq!(proxy.render_expression("cat"), Some(Expr::col("sound").unwrap()));
    assert_eq!(proxy.overridden_sources(), ["dog"]);
  }

  #[test]
  fn skipped_and_defaultless_sources_have_no_expression() {
    let skipped = ProxyBuilder::new("name").skip_source("dog").field().unwrap();
    assert_eq!(skipped.render_expression("dog"), None);

    let defaultless = ProxyBuilder::new("sound")
      .source_column("dog", "bark_sound")
      .without_default()
      .field()
      .unwrap();
    assert_eq!(defaultless.render_expression("cat"), None);
  }

  #[test]
  fn resolution_keeps_declaration_order() {
    let mut proxies = FieldProxies::new();
    proxies.push(
      ProxyBuilder::new("sound")
        .source_column("dog", "bark_sound")
        .proxied(ColumnKind::Text)
        .unwrap(),
    );
    proxies.push(ProxyBuilder::new("legs").skip_source("dog").field().unwrap());
    proxies.push(
      ProxyBuilder::new("created")
        .foreign_column("born_at")
        .proxied(ColumnKind::DateTime)
        .unwrap(),
    );

    let resolved = proxies
      .resolve_for_source(&dog_source(), &dogs(), &SqlCompiler, Dialect::Postgres)
      .unwrap();

    let targets: Vec<&str> = resolved.targets.iter().map(Ident::as_str).collect();
    assert_eq!(targets, ["sound", "created"]);
    let sql: Vec<&str> = resolved.expressions.iter().map(|e| e.sql.as_str()).collect();
    assert_eq!(sql, ["NEW.\"bark_sound\"", "NEW.\"born_at\""]);

    let watched: Vec<&str> =
      resolved.trigger_columns().into_iter().map(Ident::as_str).collect();
    assert_eq!(watched, ["bark_sound", "born_at"]);
  }

  #[test]
  fn proxied_column_renders_its_definition() {
    let column = ProxyBuilder::new("label")
      .not_null()
      .proxied(ColumnKind::Char { max_length: 40 })
      .unwrap();
    assert_eq!(
      column.column_definition(Dialect::Postgres).as_deref(),
      Some("\"label\" varchar(40) NOT NULL")
    );
    assert!(column.indexed());
    let table = Ident::new("animals").unwrap();
    assert_eq!(
      lookup_index_statement(&table, column.reference_column()).unwrap().sql,
      "CREATE INDEX IF NOT EXISTS \"animals_label_idx\" ON \"animals\" (\"label\");"
    );

    let plain = ProxyBuilder::new("label").field().unwrap();
    assert_eq!(plain.column_definition(Dialect::Postgres), None);
    assert!(!plain.indexed());
  }

  #[test]
  fn builder_rejects_unsafe_columns() {
    assert!(ProxyBuilder::new("sound; --").field().is_err());
    assert!(
      ProxyBuilder::new("sound")
        .source_column("dog", "bark sound")
        .field()
        .is_err()
    );
  }
}
