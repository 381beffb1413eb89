//! Catalog introspection through `information_schema`, scoped to the
//! connection's current schema.

use polyref_core::{
  ident::Ident,
  schema::{Catalog, ColumnSchema, EntitySchema},
};

use crate::{Error, PgExecutor, Result};

const COLUMNS: &str = "\
  SELECT column_name::text, is_nullable::text = 'YES' \
  FROM information_schema.columns \
  WHERE table_schema = current_schema() AND table_name::text = $1 \
  ORDER BY ordinal_position";

const PRIMARY_KEY: &str = "\
  SELECT kcu.column_name::text \
  FROM information_schema.table_constraints tc \
  JOIN information_schema.key_column_usage kcu \
    ON kcu.constraint_name = tc.constraint_name \
   AND kcu.table_schema = tc.table_schema \
   AND kcu.table_name = tc.table_name \
  WHERE tc.constraint_type = 'PRIMARY KEY' \
    AND tc.table_schema = current_schema() \
    AND tc.table_name::text = $1 \
  ORDER BY kcu.ordinal_position \
  LIMIT 1";

impl PgExecutor {
  /// Reads the shape of `table` and names it `entity`.
  pub async fn introspect(&self, entity: &str, table: &str) -> Result<EntitySchema> {
    let table = Ident::new(table)?;
    let client = self.client.lock().await;

    let columns = client.query(COLUMNS, &[&table.as_str()]).await?;
    if columns.is_empty() {
      return Err(Error::TableNotFound(table.as_str().to_owned()));
    }
    let primary_key: String = client
      .query_opt(PRIMARY_KEY, &[&table.as_str()])
      .await?
      .ok_or_else(|| Error::NoPrimaryKey(table.as_str().to_owned()))?
      .try_get(0)?;

    let mut schema = EntitySchema::new(entity, table.as_str(), &primary_key)?;
    for row in &columns {
      let name: String = row.try_get(0)?;
      let nullable: bool = row.try_get(1)?;
      if name != primary_key {
        schema.columns.push(ColumnSchema::new(&name, nullable)?);
      }
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
