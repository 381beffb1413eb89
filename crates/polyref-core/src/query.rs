//! Query sets over a reference table.
//!
//! Reads go through the [`SqlExecutor`]; writes are refused before any
//! statement is built.

use std::ops::Range;

use tracing::debug;

use crate::{
  Error, Result,
  controller::ReferenceController,
  entity::{Reference, ReferenceSource},
  exec::SqlExecutor,
  schema::EntitySchema,
  statement::Statement,
  value::{Row, Value},
};

const REFERENCE_ALIAS: &str = "r";

/// One reference row resolved to the source row it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct Unpacked {
  /// Slot name, e.g. `dog`.
  pub source:    String,
  /// Source primary key held in the slot column.
  pub key:       Value,
  pub reference: Row,
  pub row:       Row,
}

pub struct ReferenceQuery<'a, E> {
  controller: ReferenceController<'a>,
  executor:   &'a E,
  selected:   Option<Vec<&'a ReferenceSource>>,
}

impl<'a, E: SqlExecutor> ReferenceQuery<'a, E> {
  pub fn new(controller: ReferenceController<'a>, executor: &'a E) -> Self {
    Self { controller, executor, selected: None }
  }

  /// Restricts the set to rows whose populated slot is one of `names`
  /// (slot names or slot column names).
  pub fn select_sources(mut self, names: &[&str]) -> Result<Self> {
    if names.is_empty() {
      return Err(Error::NoSourcesSelected);
    }
    let entity = self.controller.entity();
    let selected = names
      .iter()
      .map(|name| entity.source(name))
      .collect::<Result<Vec<_>>>()?;
    self.selected = Some(selected);
    Ok(self)
  }

  fn where_clause(&self) -> String {
    let Some(selected) = &self.selected else {
      return String::new();
    };
    let predicates: Vec<String> = selected
      .iter()
      .map(|s| {
        let column = s.column().qualified(&quoted_alias(REFERENCE_ALIAS));
        format!("{column} IS NOT NULL")
      })
      .collect();
    format!(" WHERE ({})", predicates.join(" OR "))
  }

  fn order_clause(&self, reference: &EntitySchema) -> String {
    format!(
      " ORDER BY {}",
      reference.primary_key.qualified(&quoted_alias(REFERENCE_ALIAS))
    )
  }

  // ── Statements ──────────────────────────────────────────────────────────

  pub fn count_statement(&self) -> Result<Statement> {
    let reference = self.controller.reference_schema()?;
    Ok(Statement::new(format!(
      "SELECT COUNT(*) FROM {} AS {}{};",
      reference.table,
      quoted_alias(REFERENCE_ALIAS),
      self.where_clause()
    )))
  }

  pub fn fetch_statement(&self) -> Result<Statement> {
    let reference = self.controller.reference_schema()?;
    let alias = quoted_alias(REFERENCE_ALIAS);
    Ok(Statement::new(format!(
      "SELECT {} FROM {} AS {alias}{}{};",
      column_list(reference, &alias),
      reference.table,
      self.where_clause(),
      self.order_clause(reference)
    )))
  }

  /// Reference columns followed by every source's columns, each source
  /// joined on its slot. Also returns the column range each source occupies.
  pub fn unpack_statement(&self) -> Result<(Statement, Vec<Range<usize>>)> {
    let catalog = self.controller.catalog();
    let reference = self.controller.reference_schema()?;
    let alias = quoted_alias(REFERENCE_ALIAS);

    let mut columns = vec![column_list(reference, &alias)];
    let mut joins = String::new();
    let mut ranges = Vec::new();
    let mut offset = reference.columns.len();

    for (i, source) in self.controller.entity().sources().iter().enumerate() {
      let schema = catalog.require(source.entity())?;
      let source_alias = quoted_alias(&format!("s{i}"));
      columns.push(column_list(schema, &source_alias));
      joins.push_str(&format!(
        " LEFT JOIN {} AS {source_alias} ON {} = {}",
        schema.table,
        schema.primary_key.qualified(&source_alias),
        source.column().qualified(&alias),
      ));
      ranges.push(offset..offset + schema.columns.len());
      offset += schema.columns.len();
    }

    let sql = format!(
      "SELECT {} FROM {} AS {alias}{joins}{}{};",
      columns.join(", "),
      reference.table,
      self.where_clause(),
      self.order_clause(reference)
    );
    Ok((Statement::new(sql), ranges))
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  pub async fn count(&self) -> Result<u64> {
    let statement = self.count_statement()?;
    let rows = self.run(&statement).await?;
    Ok(
      rows
        .first()
        .and_then(|row| row.get_index(0))
        .and_then(Value::as_i64)
        .map_or(0, |n| n.max(0) as u64),
    )
  }

  pub async fn fetch(&self) -> Result<Vec<Reference<'a>>> {
    let statement = self.fetch_statement()?;
    let entity = self.controller.entity();
    Ok(
      self
        .run(&statement)
        .await?
        .into_iter()
        .map(|row| Reference::new(entity, row))
        .collect(),
    )
  }

  /// Every matching reference row, resolved to its source row.
  pub async fn unpack(&self) -> Result<Vec<Unpacked>> {
    self.iter_unpack().await?.collect()
  }

  /// Reads the whole joined result with a single [`SqlExecutor::query`] call.
  /// Only the resolution of each row into its source row is deferred until
  /// the iterator is advanced, so a dangling row fails on its own item.
  pub async fn iter_unpack(&self) -> Result<UnpackIter<'a>> {
    let (statement, ranges) = self.unpack_statement()?;
    let rows = self.run(&statement).await?;
    Ok(UnpackIter {
      controller: self.controller,
      ranges,
      rows: rows.into_iter(),
    })
  }

  /// Loads the source row one reference points at.
  pub async fn unpack_one(&self, reference: &Reference<'_>) -> Result<Unpacked> {
    let bound = reference.unpack()?;
    let schema = self.controller.catalog().require(bound.source.entity())?;
    let statement = Statement::with_params(
      format!(
        "SELECT {} FROM {} WHERE {} = {};",
        column_list(schema, &schema.table.quoted()),
        schema.table,
        schema.primary_key,
        self.controller.dialect().placeholder(1),
      ),
      vec![bound.key.clone()],
    );
    let row = self
      .run(&statement)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| Error::SourceRowMissing {
        source_name: bound.source.name().to_owned(),
        key:         bound.key.to_string(),
      })?;
    Ok(Unpacked {
      source: bound.source.name().to_owned(),
      key: bound.key,
      reference: reference.row().clone(),
      row,
    })
  }

  // ── Guarded writes ──────────────────────────────────────────────────────

  /// Always fails: references are written only by triggers.
  pub fn update(&self, _changes: Row) -> Result<u64> {
    Err(Error::ImmutableReference("update"))
  }

  /// Always fails, like [`Self::update`].
  pub fn delete(&self) -> Result<u64> {
    Err(Error::ImmutableReference("delete"))
  }

  async fn run(&self, statement: &Statement) -> Result<Vec<Row>> {
    debug!(entity = self.controller.entity().name(), %statement, "reference query");
    self.executor.query(statement).await.map_err(Error::executor)
  }
}

/// Lazily resolved rows of [`ReferenceQuery::iter_unpack`].
pub struct UnpackIter<'a> {
  controller: ReferenceController<'a>,
  ranges:     Vec<Range<usize>>,
  rows:       std::vec::IntoIter<Row>,
}

impl Iterator for UnpackIter<'_> {
  type Item = Result<Unpacked>;

  fn next(&mut self) -> Option<Self::Item> {
    let row = self.rows.next()?;
    Some(split_row(self.controller, &self.ranges, &row))
  }
}

fn quoted_alias(alias: &str) -> String { format!("\"{alias}\"") }

fn column_list(schema: &EntitySchema, qualifier: &str) -> String {
  schema
    .columns
    .iter()
    .map(|c| c.name.qualified(qualifier))
    .collect::<Vec<_>>()
    .join(", ")
}

fn split_row(
  controller: ReferenceController<'_>,
  ranges: &[Range<usize>],
  row: &Row,
) -> Result<Unpacked> {
  let entity = controller.entity();
  let width = ranges.first().map_or(row.len(), |r| r.start);
  let reference = row.slice(0..width.min(row.len()));
  let bound = entity.unpack(&reference)?;

  let missing = || Error::SourceRowMissing {
    source_name: bound.source.name().to_owned(),
    key:         bound.key.to_string(),
  };
  let index = entity
    .sources()
    .iter()
    .position(|s| s.name() == bound.source.name())
    .ok_or_else(missing)?;
  let range = ranges.get(index).cloned().ok_or_else(missing)?;
  if range.end > row.len() {
    return Err(missing());
  }
  let source_row = row.slice(range);
  if source_row.values().iter().all(Value::is_null) {
    return Err(missing());
  }

  Ok(Unpacked {
    source: bound.source.name().to_owned(),
    key: bound.key.clone(),
    reference,
    row: source_row,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dialect::Dialect,
    entity::ReferenceEntity,
    proxy::{ColumnKind, ProxyBuilder},
    schema::Catalog,
    tests::RecordingExecutor,
  };

  fn catalog() -> Catalog {
    Catalog::new()
      .with(EntitySchema::new("Dog", "dogs", "id").unwrap().column("bark_sound").unwrap())
      .unwrap()
      .with(EntitySchema::new("Cat", "cats", "id").unwrap().column("meow_sound").unwrap())
      .unwrap()
      .with(
        EntitySchema::new("Animal", "animals", "id")
          .unwrap()
          .column("dog_id")
          .unwrap()
          .column("cat_id")
          .unwrap()
          .column("sound")
          .unwrap(),
      )
      .unwrap()
  }

  fn animal() -> ReferenceEntity {
    ReferenceEntity::builder("Animal")
      .source("dog", "dog_id", "Dog")
      .source("cat", "cat_id", "Cat")
      .proxy(
        ProxyBuilder::new("sound")
          .without_default()
          .source_column("dog", "bark_sound")
          .source_column("cat", "meow_sound")
          .proxied(ColumnKind::Text)
          .unwrap(),
      )
      .build()
      .unwrap()
  }

  #[test]
  fn select_sources_builds_an_or_of_slot_predicates() {
    let catalog = catalog();
    let entity = animal();
    let executor = RecordingExecutor::default();
    let controller = ReferenceController::new(&entity, &catalog, Dialect::Postgres);

    let query = controller
      .query(&executor)
      .select_sources(&["dog", "cat_id"])
      .unwrap();
    assert_eq!(
      query.count_statement().unwrap().sql,
      "SELECT COUNT(*) FROM \"animals\" AS \"r\" WHERE (\"r\".\"dog_id\" IS NOT \
       NULL OR \"r\".\"cat_id\" IS NOT NULL);"
    );
  }

  #[test]
  fn select_sources_rejects_empty_and_unknown_names() {
    let catalog = catalog();
    let entity = animal();
    let executor = RecordingExecutor::default();
    let controller = ReferenceController::new(&entity, &catalog, Dialect::Postgres);

    assert!(matches!(
      controller.query(&executor).select_sources(&[]),
      Err(Error::NoSourcesSelected)
    ));
    assert!(matches!(
      controller.query(&executor).select_sources(&["bird"]),
      Err(Error::UnknownSource { .. })
    ));
  }

  #[test]
  fn unpack_statement_joins_every_source() {
    let catalog = catalog();
    let entity = animal();
    let executor = RecordingExecutor::default();
    let controller = ReferenceController::new(&entity, &catalog, Dialect::Sqlite);

    let (statement, ranges) = controller.query(&executor).unpack_statement().unwrap();
    assert!(statement.sql.contains(
      "LEFT JOIN \"dogs\" AS \"s0\" ON \"s0\".\"id\" = \"r\".\"dog_id\""
    ));
    assert!(statement.sql.contains(
      "LEFT JOIN \"cats\" AS \"s1\" ON \"s1\".\"id\" = \"r\".\"cat_id\""
    ));
    assert_eq!(ranges, vec![4..6, 6..8]);
  }

  #[tokio::test]
  async fn unpack_maps_rows_to_their_populated_source() {
    let catalog = catalog();
    let entity = animal();
    let executor = RecordingExecutor::with_rows(vec![Row::from_pairs([
      ("id", Value::Integer(1)),
      ("dog_id", Value::Null),
      ("cat_id", Value::Integer(7)),
      ("sound", Value::from("meow")),
      ("id", Value::Null),
      ("bark_sound", Value::Null),
      ("id", Value::Integer(7)),
      ("meow_sound", Value::from("meow")),
    ])]);
    let controller = ReferenceController::new(&entity, &catalog, Dialect::Sqlite);

    let unpacked = controller.query(&executor).unpack().await.unwrap();
    assert_eq!(unpacked.len(), 1);
    assert_eq!(unpacked[0].source, "cat");
    assert_eq!(unpacked[0].key, Value::Integer(7));
    assert_eq!(unpacked[0].row.get("meow_sound"), Some(&Value::from("meow")));
  }

  #[tokio::test]
  async fn missing_source_row_is_reported() {
    let catalog = catalog();
    let entity = animal();
    let executor = RecordingExecutor::with_rows(vec![Row::from_pairs([
      ("id", Value::Integer(1)),
      ("dog_id", Value::Integer(3)),
      ("cat_id", Value::Null),
      ("sound", Value::Null),
      ("id", Value::Null),
      ("bark_sound", Value::Null),
      ("id", Value::Null),
      ("meow_sound", Value::Null),
    ])]);
    let controller = ReferenceController::new(&entity, &catalog, Dialect::Sqlite);

    let mut rows = controller.query(&executor).iter_unpack().await.unwrap();
    assert!(matches!(
      rows.next(),
      Some(Err(Error::SourceRowMissing { .. }))
    ));
  }

  #[tokio::test]
  async fn iter_unpack_queries_once_and_resolves_per_item() {
    let catalog = catalog();
    let entity = animal();
    let dangling = Row::from_pairs([
      ("id", Value::Integer(1)),
      ("dog_id", Value::Integer(3)),
      ("cat_id", Value::Null),
      ("sound", Value::Null),
      ("id", Value::Null),
      ("bark_sound", Value::Null),
      ("id", Value::Null),
      ("meow_sound", Value::Null),
    ]);
    let bound = Row::from_pairs([
      ("id", Value::Integer(2)),
      ("dog_id", Value::Integer(4)),
      ("cat_id", Value::Null),
      ("sound", Value::from("woof")),
      ("id", Value::Integer(4)),
      ("bark_sound", Value::from("woof")),
      ("id", Value::Null),
      ("meow_sound", Value::Null),
    ]);
    let executor = RecordingExecutor::with_rows(vec![dangling, bound]);
    let controller = ReferenceController::new(&entity, &catalog, Dialect::Sqlite);

    let mut rows = controller.query(&executor).iter_unpack().await.unwrap();
    assert_eq!(executor.calls().len(), 1);
    assert!(matches!(rows.next(), Some(Err(Error::SourceRowMissing { .. }))));
    let second = rows.next().unwrap().unwrap();
    assert_eq!(second.source, "dog");
    assert_eq!(second.key, Value::Integer(4));
    assert!(rows.next().is_none());
    assert_eq!(executor.calls().len(), 1);
  }

  #[test]
  fn writes_never_reach_the_executor() {
    let catalog = catalog();
    let entity = animal();
    let executor = RecordingExecutor::default();
    let controller = ReferenceController::new(&entity, &catalog, Dialect::Postgres);
    let query = controller.query(&executor);

    assert!(matches!(query.update(Row::new()), Err(Error::ImmutableReference("update"))));
    assert!(matches!(query.delete(), Err(Error::ImmutableReference("delete"))));
    assert!(executor.calls().is_empty());
  }
}
