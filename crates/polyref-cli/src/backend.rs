//! Opening the configured database.

use anyhow::Context as _;
use polyref_core::{Dialect, schema::EntitySchema};
use polyref_store_postgres::PgExecutor;
use polyref_store_sqlite::SqliteExecutor;

pub enum Backend {
  Sqlite(SqliteExecutor),
  Postgres(PgExecutor),
}

impl Backend {
  /// `url` is a file path (or `:memory:`) for SQLite and a connection string
  /// for PostgreSQL.
  pub async fn connect(dialect: Dialect, url: &str) -> anyhow::Result<Self> {
    Ok(match dialect {
      Dialect::Sqlite => {
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        let executor = if path == ":memory:" {
          SqliteExecutor::open_in_memory().await
        } else {
          SqliteExecutor::open(path).await
        };
        Self::Sqlite(executor.with_context(|| format!("failed to open {path}"))?)
      }
      Dialect::Postgres => Self::Postgres(
        PgExecutor::connect(url)
          .await
          .context("failed to connect to postgres")?,
      ),
    })
  }

  pub async fn introspect(&self, entity: &str, table: &str) -> anyhow::Result<EntitySchema> {
    let schema = match self {
      Self::Sqlite(executor) => executor.introspect(entity, table).await?,
      Self::Postgres(executor) => executor.introspect(entity, table).await?,
    };
    Ok(schema)
  }
}
