//! [`PgExecutor`]: the PostgreSQL implementation of [`SqlExecutor`].

use polyref_core::{Row, Statement, exec::SqlExecutor};
use tokio::sync::Mutex;
use tokio_postgres::{GenericClient, NoTls, types::ToSql};
use tracing::{debug, error, trace};

use crate::{
  Result,
  encode::{PgValue, decode_row},
};

/// Runs generated statements over one client connection.
///
/// The client sits behind a mutex because transactions need exclusive access.
pub struct PgExecutor {
  pub(crate) client: Mutex<tokio_postgres::Client>,
}

impl PgExecutor {
  /// Connects to `url` and drives the connection on a background task.
  pub async fn connect(url: &str) -> Result<Self> {
    let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
    tokio::spawn(async move {
      if let Err(err) = connection.await {
        error!(error = %err, "postgres connection closed");
      }
    });
    debug!("connected to postgres");
    Ok(Self::from_client(client))
  }

  pub fn from_client(client: tokio_postgres::Client) -> Self {
    Self { client: Mutex::new(client) }
  }

  /// Runs a batch of plain SQL, e.g. table definitions.
  pub async fn execute_script(&self, sql: &str) -> Result<()> {
    self.client.lock().await.batch_execute(sql).await?;
    Ok(())
  }
}

/// Statements without parameters go through the simple query protocol so
/// `DO` blocks and dollar-quoted bodies are sent verbatim.
async fn run<C: GenericClient>(client: &C, statement: &Statement) -> Result<u64> {
  trace!(%statement, "postgres execute");
  if statement.params.is_empty() {
    client.batch_execute(&statement.sql).await?;
    return Ok(0);
  }
  let params: Vec<PgValue<'_>> = statement.params.iter().map(PgValue).collect();
  let refs: Vec<&(dyn ToSql + Sync)> =
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
  Ok(client.execute(statement.sql.as_str(), &refs).await?)
}

impl SqlExecutor for PgExecutor {
  type Error = crate::Error;

  async fn execute(&self, statement: &Statement) -> Result<u64> {
    let client = self.client.lock().await;
    run(&*client, statement).await
  }

  async fn execute_atomic(&self, statements: &[Statement]) -> Result<()> {
    let mut client = self.client.lock().await;
    let tx = client.transaction().await?;
    for statement in statements {
      run(&tx, statement).await?;
    }
    tx.commit().await?;
    Ok(())
  }

  async fn query(&self, statement: &Statement) -> Result<Vec<Row>> {
    trace!(%statement, "postgres query");
    let params: Vec<PgValue<'_>> = statement.params.iter().map(PgValue).collect();
    let refs: Vec<&(dyn ToSql + Sync)> =
      params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
    let client = self.client.lock().await;
    let rows = client.query(statement.sql.as_str(), &refs).await?;
    rows.iter().map(decode_row).collect()
  }
}
