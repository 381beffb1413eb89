//! Catalog introspection through `PRAGMA table_info`.

use polyref_core::{
  ident::Ident,
  schema::{Catalog, ColumnSchema, EntitySchema},
};

use crate::{Error, Result, SqliteExecutor};

/// One row of `PRAGMA table_info`.
struct RawColumn {
  name:    String,
  notnull: bool,
  pk:      i64,
}

impl SqliteExecutor {
  /// Reads the shape of `table` and names it `entity`.
  pub async fn introspect(&self, entity: &str, table: &str) -> Result<EntitySchema> {
    let table = Ident::new(table)?;
    let sql = format!("PRAGMA table_info({table})");

    let raw: Vec<RawColumn> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |r| {
          Ok(RawColumn {
            name:    r.get("name")?,
            notnull: r.get::<_, i64>("notnull")? != 0,
            pk:      r.get("pk")?,
          })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
      })
      .await?;

    if raw.is_empty() {
      return Err(Error::TableNotFound(table.as_str().to_owned()));
    }
    let primary_key = raw
      .iter()
      .filter(|c| c.pk > 0)
      .min_by_key(|c| c.pk)
      .ok_or_else(|| Error::NoPrimaryKey(table.as_str().to_owned()))?;

    let mut schema = EntitySchema::new(entity, table.as_str(), &primary_key.name)?;
    for column in raw.iter().filter(|c| c.name != primary_key.name) {
      schema
        .columns
        .push(ColumnSchema::new(&column.name, !column.notnull)?);
    }
    Ok(schema)
  }

  /// Introspects each `(entity, table)` pair into one catalog.
  pub async fn introspect_catalog(&self, entities: &[(&str, &str)]) -> Result<Catalog> {
    let mut catalog = Catalog::new();
    for (entity, table) in entities {
      catalog.register(self.introspect(entity, table).await?)?;
    }
    Ok(catalog)
  }
}
