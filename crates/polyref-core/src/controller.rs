//! [`ReferenceController`]: sequences and runs the DDL of one reference
//! entity.
//!
//! Statement order is constraint, then indexes, then triggers: the upsert in
//! every trigger relies on the unique index of its slot.

use tracing::{debug, info};

use crate::{
  Error, Result,
  binding::SourceBinding,
  dialect::Dialect,
  entity::ReferenceEntity,
  exec::SqlExecutor,
  expr::{ExprCompiler, SqlCompiler},
  ident::{self, Ident},
  proxy::{drop_lookup_index_statement, lookup_index_statement},
  query::ReferenceQuery,
  resolve::NEW_ROW,
  schema::{EntitySchema, SchemaCatalog},
  statement::Statement,
};

static SQL_COMPILER: SqlCompiler = SqlCompiler;

/// Outcome of running a batch of DDL for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
  pub entity:     String,
  pub statements: usize,
}

#[derive(Clone, Copy)]
pub struct ReferenceController<'a> {
  entity:   &'a ReferenceEntity,
  catalog:  &'a dyn SchemaCatalog,
  compiler: &'a dyn ExprCompiler,
  dialect:  Dialect,
}

impl<'a> ReferenceController<'a> {
  pub fn new(
    entity: &'a ReferenceEntity,
    catalog: &'a dyn SchemaCatalog,
    dialect: Dialect,
  ) -> Self {
    Self { entity, catalog, compiler: &SQL_COMPILER, dialect }
  }

  /// Use a different expression compiler than the built-in one.
  pub fn with_compiler(mut self, compiler: &'a dyn ExprCompiler) -> Self {
    self.compiler = compiler;
    self
  }

  pub fn entity(&self) -> &'a ReferenceEntity { self.entity }

  pub fn catalog(&self) -> &'a dyn SchemaCatalog { self.catalog }

  pub fn dialect(&self) -> Dialect { self.dialect }

  pub fn reference_schema(&self) -> Result<&'a EntitySchema> {
    self.catalog.require(self.entity.name())
  }

  pub fn reference_table(&self) -> Result<&'a Ident> {
    Ok(&self.reference_schema()?.table)
  }

  /// One binding per slot, in declaration order, with every proxy resolved.
  pub fn bindings(&self) -> Result<Vec<SourceBinding<'a>>> {
    let reference_table = self.reference_table()?;
    self
      .entity
      .sources()
      .iter()
      .map(|source| {
        SourceBinding::new(
          self.dialect,
          source,
          self.catalog.require(source.entity())?,
          reference_table,
          self.entity.proxies(),
          self.compiler,
        )
      })
      .collect()
  }

  // ── Check constraint ────────────────────────────────────────────────────

  pub fn constraint_name(&self) -> Result<Ident> {
    ident::constraint_name(self.reference_table()?)
  }

  /// `(CASE WHEN "a" IS NOT NULL THEN 1 ELSE 0 END + ...) = 1` over every slot
  /// column, optionally qualified (e.g. with `NEW`).
  pub fn constraint_check_expression(&self, qualifier: Option<&str>) -> String {
    let terms: Vec<String> = self
      .entity
      .sources()
      .iter()
      .map(|source| {
        let column = match qualifier {
          Some(q) => source.column().qualified(q),
          None => source.column().to_string(),
        };
        format!("CASE WHEN {column} IS NOT NULL THEN 1 ELSE 0 END")
      })
      .collect();
    format!("({}) = 1", terms.join(" + "))
  }

  pub fn drop_constraint_statements(&self) -> Result<Vec<Statement>> {
    let name = self.constraint_name()?;
    Ok(match self.dialect {
      Dialect::Postgres => vec![Statement::new(format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {name};",
        self.reference_table()?
      ))],
      Dialect::Sqlite => self
        .constraint_trigger_names(&name)?
        .into_iter()
        .map(|(trigger, _)| Statement::new(format!("DROP TRIGGER IF EXISTS {trigger};")))
        .collect(),
    })
  }

  /// SQLite cannot add a constraint to an existing table, so the check runs in
  /// `BEFORE` triggers that abort the offending statement.
  pub fn add_constraint_statements(&self) -> Result<Vec<Statement>> {
    let name = self.constraint_name()?;
    let table = self.reference_table()?;
    Ok(match self.dialect {
      Dialect::Postgres => vec![Statement::new(format!(
        "ALTER TABLE {table} ADD CONSTRAINT {name} CHECK ({});",
        self.constraint_check_expression(None)
      ))],
      Dialect::Sqlite => {
        let check = self.constraint_check_expression(Some(NEW_ROW));
        self
          .constraint_trigger_names(&name)?
          .into_iter()
          .map(|(trigger, event)| {
            Statement::new(format!(
              "CREATE TRIGGER {trigger} BEFORE {event} ON {table} FOR EACH ROW \
               WHEN NOT ({check}) BEGIN SELECT RAISE(ABORT, '{}'); END;",
              name.as_str()
            ))
          })
          .collect()
      }
    })
  }

  fn constraint_trigger_names(
    &self,
    name: &Ident,
  ) -> Result<Vec<(Ident, &'static str)>> {
    Ok(vec![
      (ident::suffixed(name, "insert")?, "INSERT"),
      (ident::suffixed(name, "update")?, "UPDATE"),
    ])
  }

  // ── Statement groups ────────────────────────────────────────────────────

  pub fn constraint_statements(&self) -> Result<Vec<Statement>> {
    let mut out = self.drop_constraint_statements()?;
    out.extend(self.add_constraint_statements()?);
    Ok(out)
  }

  /// Unique index per slot, then lookup indexes of indexed proxied columns.
  pub fn index_statements(&self) -> Result<Vec<Statement>> {
    let mut out: Vec<Statement> = self
      .bindings()?
      .iter()
      .flat_map(|binding| binding.index_statements())
      .collect();
    let table = self.reference_table()?;
    for proxy in self.entity.proxies().iter().filter(|p| p.indexed()) {
      out.push(lookup_index_statement(table, proxy.reference_column())?);
    }
    Ok(out)
  }

  /// Per slot: trigger function, drop trigger, create trigger.
  pub fn trigger_statements(&self) -> Result<Vec<Statement>> {
    let mut out = Vec::new();
    for binding in self.bindings()? {
      out.extend(binding.trigger_function_statements()?);
      out.extend(binding.drop_trigger_statements()?);
      out.extend(binding.create_trigger_statements()?);
    }
    Ok(out)
  }

  /// Everything, in application order.
  pub fn statements(&self) -> Result<Vec<Statement>> {
    let mut out = self.constraint_statements()?;
    out.extend(self.index_statements()?);
    out.extend(self.trigger_statements()?);
    Ok(out)
  }

  /// Removes every object [`Self::statements`] creates, triggers first.
  pub fn teardown_statements(&self) -> Result<Vec<Statement>> {
    let mut out = Vec::new();
    for binding in self.bindings()? {
      out.extend(binding.drop_trigger_statements()?);
      out.extend(binding.drop_trigger_function_statements());
      out.extend(binding.drop_index_statements());
    }
    let table = self.reference_table()?;
    for proxy in self.entity.proxies().iter().filter(|p| p.indexed()) {
      out.push(drop_lookup_index_statement(table, proxy.reference_column())?);
    }
    out.extend(self.drop_constraint_statements()?);
    Ok(out)
  }

  /// Column definitions for the proxied columns the entity declares.
  pub fn column_definitions(&self) -> Vec<String> {
    self
      .entity
      .proxies()
      .iter()
      .filter_map(|p| p.column_definition(self.dialect))
      .collect()
  }

  // ── Execution ───────────────────────────────────────────────────────────

  /// Generates every statement, then runs them in one transaction. Nothing
  /// is sent to the database if generation fails.
  pub async fn apply_all<E: SqlExecutor>(&self, executor: &E) -> Result<ApplyReport> {
    let statements = self.statements()?;
    self.run("apply", &statements, executor).await
  }

  pub async fn teardown_all<E: SqlExecutor>(
    &self,
    executor: &E,
  ) -> Result<ApplyReport> {
    let statements = self.teardown_statements()?;
    self.run("teardown", &statements, executor).await
  }

  pub async fn apply_constraints<E: SqlExecutor>(
    &self,
    executor: &E,
  ) -> Result<ApplyReport> {
    let statements = self.constraint_statements()?;
    self.run("constraints", &statements, executor).await
  }

  pub async fn apply_indexes<E: SqlExecutor>(
    &self,
    executor: &E,
  ) -> Result<ApplyReport> {
    let statements = self.index_statements()?;
    self.run("indexes", &statements, executor).await
  }

  pub async fn apply_triggers<E: SqlExecutor>(
    &self,
    executor: &E,
  ) -> Result<ApplyReport> {
    let statements = self.trigger_statements()?;
    self.run("triggers", &statements, executor).await
  }

  async fn run<E: SqlExecutor>(
    &self,
    phase: &'static str,
    statements: &[Statement],
    executor: &E,
  ) -> Result<ApplyReport> {
    for statement in statements {
      debug!(entity = self.entity.name(), phase, %statement, "queued statement");
    }
    executor
      .execute_atomic(statements)
      .await
      .map_err(Error::executor)?;
    info!(
      entity = self.entity.name(),
      phase,
      statements = statements.len(),
      "reference DDL applied"
    );
    Ok(ApplyReport {
      entity:     self.entity.name().to_owned(),
      statements: statements.len(),
    })
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  /// A query set over the reference table, bound to `executor`.
  pub fn query<E: SqlExecutor>(&self, executor: &'a E) -> ReferenceQuery<'a, E> {
    ReferenceQuery::new(*self, executor)
  }
}
