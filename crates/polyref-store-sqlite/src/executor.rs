//! [`SqliteExecutor`]: the SQLite implementation of [`SqlExecutor`].

use std::path::Path;

use polyref_core::{Row, Statement, exec::SqlExecutor};
use rusqlite::params_from_iter;
use tracing::{debug, trace};

use crate::{
  Error, Result,
  encode::{SqlValue, decode_row},
};

// ─── Executor ────────────────────────────────────────────────────────────────

/// Runs generated statements against one SQLite database.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteExecutor {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteExecutor {
  /// Open (or create) the database at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    debug!(path = %path.display(), "opening sqlite database");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Ok(Self { conn })
  }

  /// Open an in-memory database, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Ok(Self { conn })
  }

  /// Runs a batch of plain SQL, e.g. table definitions.
  pub async fn execute_script(&self, sql: impl Into<String>) -> Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Statements without parameters may hold several SQL statements (trigger
/// bodies), so they go through `execute_batch`.
fn run(conn: &rusqlite::Connection, statement: &Statement) -> rusqlite::Result<u64> {
  trace!(%statement, "sqlite execute");
  if statement.params.is_empty() {
    conn.execute_batch(&statement.sql)?;
    return Ok(conn.changes() as u64);
  }
  let params = statement.params.iter().map(SqlValue);
  Ok(conn.execute(&statement.sql, params_from_iter(params))? as u64)
}

impl SqlExecutor for SqliteExecutor {
  type Error = Error;

  async fn execute(&self, statement: &Statement) -> Result<u64> {
    let statement = statement.clone();
    let changed = self.conn.call(move |conn| Ok(run(conn, &statement)?)).await?;
    Ok(changed)
  }

  async fn execute_atomic(&self, statements: &[Statement]) -> Result<()> {
    let statements = statements.to_vec();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for statement in &statements {
          run(&tx, statement)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
    let statement = statement.clone();
    let rows = self
      .conn
      .call(move |conn| {
        trace!(%statement, "sqlite query");
        let mut stmt = conn.prepare(&statement.sql)?;
        let columns: Vec<String> =
          stmt.column_names().into_iter().map(str::to_owned).collect();
        let params = statement.params.iter().map(SqlValue);
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
          out.push(decode_row(&columns, row)?);
        }
        Ok(out)
      })
      .await?;
    Ok(rows)
  }
}
