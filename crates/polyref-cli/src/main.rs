//! `polyref`: apply database-enforced polymorphic references.
//!
//! # Usage
//!
//! ```
//! polyref --config polyref.toml check
//! polyref --config polyref.toml plan
//! polyref --dialect sqlite --database-url zoo.db apply
//! polyref teardown Animal
//! polyref unpack Animal --source dog
//! ```

mod backend;
mod mapping;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use backend::Backend;
use clap::{Parser, Subcommand, ValueEnum};
use mapping::Mapping;
use polyref_core::{
  ApplyReport, Dialect, ReferenceController, ReferenceRegistry,
  exec::SqlExecutor,
  schema::Catalog,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Database-enforced polymorphic references")]
struct Cli {
  /// Path to the TOML mapping file.
  #[arg(short, long, default_value = "polyref.toml")]
  config: PathBuf,

  /// Database to connect to; overrides `database.url`.
  #[arg(long)]
  database_url: Option<String>,

  /// SQL dialect; overrides `database.dialect`.
  #[arg(long, value_enum)]
  dialect: Option<DialectArg>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
  Postgres,
  Sqlite,
}

impl From<DialectArg> for Dialect {
  fn from(arg: DialectArg) -> Self {
    match arg {
      DialectArg::Postgres => Self::Postgres,
      DialectArg::Sqlite => Self::Sqlite,
    }
  }
}

#[derive(Subcommand)]
enum Command {
  /// Validate every declaration against the catalog.
  Check,
  /// Print the DDL that `apply` (or `teardown`) would run.
  Plan {
    /// Reference entity to plan; all when omitted.
    entity:   Option<String>,
    #[arg(long)]
    teardown: bool,
  },
  /// Create constraints, indexes and triggers.
  Apply { entity: Option<String> },
  /// Drop everything `apply` created.
  Teardown { entity: Option<String> },
  /// Print each reference with its source row, one JSON object per line.
  Unpack {
    entity:  String,
    /// Only references bound to these sources.
    #[arg(long = "source")]
    sources: Vec<String>,
  },
}

impl Command {
  fn needs_database(&self) -> bool {
    !matches!(self, Self::Check | Self::Plan { .. })
  }

  fn entity(&self) -> Option<&str> {
    match self {
      Self::Check => None,
      Self::Plan { entity, .. } | Self::Apply { entity } | Self::Teardown { entity } => {
        entity.as_deref()
      }
      Self::Unpack { entity, .. } => Some(entity),
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut mapping = Mapping::load(&cli.config)?;
  if let Some(dialect) = cli.dialect {
    mapping.database.dialect = dialect.into();
  }
  if let Some(url) = cli.database_url {
    mapping.database.url = Some(url);
  }
  let dialect = mapping.database.dialect;

  let registry = mapping
    .registry()
    .context("invalid reference declarations")?;
  if let Some(name) = cli.command.entity() {
    registry.require(name)?;
  }

  let backend = if cli.command.needs_database() || !mapping.undeclared().is_empty() {
    let Some(url) = mapping.database.url.as_deref() else {
      bail!("no database configured: set database.url or pass --database-url");
    };
    Some(Backend::connect(dialect, url).await?)
  } else {
    None
  };

  let catalog = load_catalog(&mapping, backend.as_ref()).await?;
  registry
    .validate(&catalog, dialect)
    .context("mapping does not match the catalog")?;

  match (&cli.command, backend) {
    (Command::Check, _) => {
      info!(entities = registry.len(), %dialect, "mapping is valid");
    }
    (Command::Plan { entity, teardown }, _) => {
      for controller in selected(&registry, &catalog, dialect, entity.as_deref()) {
        let statements = if *teardown {
          controller.teardown_statements()?
        } else {
          controller.statements()?
        };
        println!("-- {}", controller.entity().name());
        for statement in statements {
          println!("{statement}");
        }
      }
    }
    (Command::Apply { entity }, Some(backend)) => {
      for controller in selected(&registry, &catalog, dialect, entity.as_deref()) {
        let report = match &backend {
          Backend::Sqlite(executor) => controller.apply_all(executor).await,
          Backend::Postgres(executor) => controller.apply_all(executor).await,
        }
        .with_context(|| format!("failed to apply {}", controller.entity().name()))?;
        print_report("applied", &report);
      }
    }
    (Command::Teardown { entity }, Some(backend)) => {
      for controller in selected(&registry, &catalog, dialect, entity.as_deref()) {
        let report = match &backend {
          Backend::Sqlite(executor) => controller.teardown_all(executor).await,
          Backend::Postgres(executor) => controller.teardown_all(executor).await,
        }
        .with_context(|| format!("failed to tear down {}", controller.entity().name()))?;
        print_report("removed", &report);
      }
    }
    (Command::Unpack { entity, sources }, Some(backend)) => {
      let controller =
        ReferenceController::new(registry.require(entity)?, &catalog, dialect);
      match &backend {
        Backend::Sqlite(executor) => unpack(controller, executor, sources).await?,
        Backend::Postgres(executor) => unpack(controller, executor, sources).await?,
      }
    }
    (_, None) => bail!("no database connection"),
  }

  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Declared schemas first, then whatever has to be introspected.
async fn load_catalog(
  mapping: &Mapping,
  backend: Option<&Backend>,
) -> anyhow::Result<Catalog> {
  let mut catalog = Catalog::new();
  for schema in mapping.declared_schemas()? {
    catalog.register(schema)?;
  }
  for (entity, table) in mapping.undeclared() {
    let Some(backend) = backend else {
      bail!("entity {entity} declares no columns and no database is configured");
    };
    let schema = backend
      .introspect(entity, table)
      .await
      .with_context(|| format!("failed to introspect table {table}"))?;
    catalog.register(schema)?;
  }
  Ok(catalog)
}

fn selected<'a>(
  registry: &'a ReferenceRegistry,
  catalog: &'a Catalog,
  dialect: Dialect,
  entity: Option<&'a str>,
) -> impl Iterator<Item = ReferenceController<'a>> {
  registry
    .controllers(catalog, dialect)
    .filter(move |c| entity.is_none_or(|name| c.entity().name() == name))
}

fn print_report(verb: &str, report: &ApplyReport) {
  println!("{verb} {} ({} statements)", report.entity, report.statements);
}

async fn unpack<E: SqlExecutor>(
  controller: ReferenceController<'_>,
  executor: &E,
  sources: &[String],
) -> anyhow::Result<()> {
  let mut query = controller.query(executor);
  if !sources.is_empty() {
    let names: Vec<&str> = sources.iter().map(String::as_str).collect();
    query = query.select_sources(&names)?;
  }
  for unpacked in query.iter_unpack().await? {
    let unpacked = unpacked?;
    let line = serde_json::json!({
      "source": unpacked.source,
      "key": unpacked.key,
      "reference": unpacked.reference,
      "row": unpacked.row,
    });
    println!("{line}");
  }
  Ok(())
}
