//! DDL for one polymorphic slot: the upsert trigger, its function, and the
//! unique index on the slot column.
//!
//! The trigger fires on the source table. It first tries to insert the
//! reference row; if a row for this source key already exists the insert
//! hits the unique index and the trigger falls back to updating the proxied
//! columns of that row. The index therefore has to exist before the trigger
//! can rely on it.

use crate::{
  Error, Result,
  dialect::{BODY_TAG, Dialect},
  entity::ReferenceSource,
  expr::ExprCompiler,
  ident::{self, Ident},
  proxy::{FieldProxies, ResolvedProxies},
  resolve::NEW_ROW,
  schema::EntitySchema,
  statement::Statement,
  value::Value,
};

/// A slot bound to its source and reference tables, with every proxy
/// expression already resolved.
#[derive(Debug, Clone)]
pub struct SourceBinding<'a> {
  dialect:         Dialect,
  source:          &'a ReferenceSource,
  source_schema:   &'a EntitySchema,
  reference_table: &'a Ident,
  proxies:         ResolvedProxies,
  trigger:         Ident,
  index:           Ident,
  function:        Ident,
}

impl<'a> SourceBinding<'a> {
  /// Resolves the proxies for `source`. Fails on the first expression that
  /// cannot run inside a row-level trigger on the source table.
  pub fn new(
    dialect: Dialect,
    source: &'a ReferenceSource,
    source_schema: &'a EntitySchema,
    reference_table: &'a Ident,
    proxies: &FieldProxies,
    compiler: &dyn ExprCompiler,
  ) -> Result<Self> {
    let proxies =
      proxies.resolve_for_source(source, source_schema, compiler, dialect)?;
    Ok(Self {
      trigger: ident::trigger_name(&source_schema.table, reference_table)?,
      index: ident::index_name(&source_schema.table, reference_table)?,
      function: ident::trigger_function_name(&source_schema.table, reference_table)?,
      dialect,
      source,
      source_schema,
      reference_table,
      proxies,
    })
  }

  pub fn source(&self) -> &'a ReferenceSource { self.source }

  pub fn source_table(&self) -> &'a Ident { &self.source_schema.table }

  pub fn proxies(&self) -> &ResolvedProxies { &self.proxies }

  pub fn trigger_name(&self) -> &Ident { &self.trigger }

  pub fn index_name(&self) -> &Ident { &self.index }

  pub fn trigger_function_name(&self) -> &Ident { &self.function }

  /// Names of the triggers this binding creates on the source table.
  pub fn trigger_names(&self) -> Result<Vec<Ident>> {
    match self.dialect {
      Dialect::Postgres => Ok(vec![self.trigger.clone()]),
      Dialect::Sqlite => Ok(vec![
        ident::suffixed(&self.trigger, "insert")?,
        ident::suffixed(&self.trigger, "update")?,
      ]),
    }
  }

  // ── Trigger function ────────────────────────────────────────────────────

  /// `CREATE OR REPLACE FUNCTION` holding the upsert. SQLite has no trigger
  /// functions; its upsert is inlined by [`Self::create_trigger_statements`].
  pub fn trigger_function_statements(&self) -> Result<Vec<Statement>> {
    if self.dialect == Dialect::Sqlite {
      return Ok(Vec::new());
    }

    let fallback = match self.update_statement() {
      Some(update) => update,
      None => "NULL;".to_owned(),
    };
    let body = format!(
      "BEGIN BEGIN {insert}; EXCEPTION WHEN unique_violation THEN {fallback} END; \
       RETURN NEW; END",
      insert = self.insert_statement(),
    );
    if body.contains(BODY_TAG) {
      return Err(Error::QuoteTagCollision(BODY_TAG));
    }

    Ok(vec![Statement::with_params(
      format!(
        "CREATE OR REPLACE FUNCTION {}() RETURNS trigger AS {BODY_TAG} {body} \
         {BODY_TAG} LANGUAGE plpgsql;",
        self.function
      ),
      self.upsert_params(),
    )])
  }

  pub fn drop_trigger_function_statements(&self) -> Vec<Statement> {
    match self.dialect {
      Dialect::Postgres => vec![Statement::new(format!(
        "DROP FUNCTION IF EXISTS {}();",
        self.function
      ))],
      Dialect::Sqlite => Vec::new(),
    }
  }

  // ── Triggers ────────────────────────────────────────────────────────────

  pub fn drop_trigger_statements(&self) -> Result<Vec<Statement>> {
    Ok(match self.dialect {
      Dialect::Postgres => vec![Statement::new(format!(
        "DROP TRIGGER IF EXISTS {} ON {};",
        self.trigger,
        self.source_table()
      ))],
      Dialect::Sqlite => self
        .trigger_names()?
        .into_iter()
        .map(|name| Statement::new(format!("DROP TRIGGER IF EXISTS {name};")))
        .collect(),
    })
  }

  /// Fires after insert, and after updates of the source columns the proxies
  /// actually read.
  pub fn create_trigger_statements(&self) -> Result<Vec<Statement>> {
    let columns = self
      .proxies
      .trigger_columns()
      .into_iter()
      .map(Ident::to_string)
      .collect::<Vec<_>>()
      .join(", ");

    match self.dialect {
      Dialect::Postgres => {
        let events = if columns.is_empty() {
          "INSERT".to_owned()
        } else {
          format!("INSERT OR UPDATE OF {columns}")
        };
        Ok(vec![Statement::new(format!(
          "CREATE TRIGGER {} AFTER {events} ON {} FOR EACH ROW EXECUTE PROCEDURE {}();",
          self.trigger,
          self.source_table(),
          self.function
        ))])
      }
      Dialect::Sqlite => {
        let body = self.sqlite_upsert();
        let names = self.trigger_names()?;
        let mut out = vec![Statement::with_params(
          format!(
            "CREATE TRIGGER {} AFTER INSERT ON {} FOR EACH ROW BEGIN {body} END;",
            names[0],
            self.source_table()
          ),
          self.proxies.params().cloned().collect(),
        )];
        if !columns.is_empty() {
          out.push(Statement::with_params(
            format!(
              "CREATE TRIGGER {} AFTER UPDATE OF {columns} ON {} FOR EACH ROW \
               BEGIN {body} END;",
              names[1],
              self.source_table()
            ),
            self.proxies.params().cloned().collect(),
          ));
        }
        Ok(out)
      }
    }
  }

  // ── Unique index ────────────────────────────────────────────────────────

  /// Creates the unique index on the slot column, replacing an existing index
  /// of the same name.
  pub fn index_statements(&self) -> Vec<Statement> {
    let create = format!(
      "CREATE UNIQUE INDEX {} ON {} ({});",
      self.index,
      self.reference_table,
      self.source.column()
    );
    match self.dialect {
      Dialect::Postgres => vec![Statement::new(format!(
        "DO {BODY_TAG} BEGIN {create} EXCEPTION WHEN duplicate_table OR \
         duplicate_object THEN DROP INDEX {}; {create} END; {BODY_TAG};",
        self.index
      ))],
      Dialect::Sqlite => vec![
        Statement::new(format!("DROP INDEX IF EXISTS {};", self.index)),
        Statement::new(create),
      ],
    }
  }

  pub fn drop_index_statements(&self) -> Vec<Statement> {
    vec![Statement::new(format!("DROP INDEX IF EXISTS {};", self.index))]
  }

  // ── Upsert pieces ───────────────────────────────────────────────────────

  fn source_key(&self) -> String {
    self.source_schema.primary_key.qualified(NEW_ROW)
  }

  fn insert_statement(&self) -> String {
    let columns: Vec<String> = std::iter::once(self.source.column())
      .chain(&self.proxies.targets)
      .map(Ident::to_string)
      .collect();
    let values: Vec<String> = std::iter::once(self.source_key())
      .chain(self.proxies.expressions.iter().map(|e| e.sql.clone()))
      .collect();
    format!(
      "INSERT INTO {} ({}) VALUES ({})",
      self.reference_table,
      columns.join(", "),
      values.join(", ")
    )
  }

  /// SQLite's native upsert. The conflict clause of the statement that fired
  /// the trigger replaces any `OR <policy>` in the body but leaves
  /// `ON CONFLICT ... DO` alone.
  fn sqlite_upsert(&self) -> String {
    let action = if self.proxies.is_empty() {
      "NOTHING".to_owned()
    } else {
      let assignments: Vec<String> = self
        .proxies
        .targets
        .iter()
        .map(|target| format!("{target} = excluded.{target}"))
        .collect();
      format!("UPDATE SET {}", assignments.join(", "))
    };
    format!(
      "{} ON CONFLICT ({}) DO {action};",
      self.insert_statement(),
      self.source.column()
    )
  }

  /// `None` when no proxy maps to this source.
  fn update_statement(&self) -> Option<String> {
    if self.proxies.is_empty() {
      return None;
    }
    let assignments: Vec<String> = self
      .proxies
      .targets
      .iter()
      .zip(&self.proxies.expressions)
      .map(|(target, expr)| format!("{target} = {}", expr.sql))
      .collect();
    Some(format!(
      "UPDATE {} SET {} WHERE {} = {};",
      self.reference_table,
      assignments.join(", "),
      self.source.column(),
      self.source_key()
    ))
  }

  /// Parameters in text order: the insert values, then the update assignments.
  fn upsert_params(&self) -> Vec<Value> {
    let insert = self.proxies.params();
    if self.proxies.is_empty() {
      return insert.cloned().collect();
    }
    insert.chain(self.proxies.params()).cloned().collect()
  }
}
