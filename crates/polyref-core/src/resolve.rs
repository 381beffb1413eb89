//! Resolves proxy expressions against a source table and rebinds them to the
//! row a trigger fires on.

use crate::{
  Error, Result,
  dialect::Dialect,
  expr::{Expr, ExprCompiler, SingleTableQuery},
  ident::Ident,
  schema::EntitySchema,
  value::Value,
};

/// Pseudo-row alias available inside row-level triggers.
pub const NEW_ROW: &str = "NEW";

/// A proxy expression ready to be spliced into a trigger body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExpr {
  /// SQL referring to the source row as `NEW`.
  pub sql:    String,
  pub params: Vec<Value>,
  /// The expression that was resolved.
  pub expr:   Expr,
}

impl ResolvedExpr {
  /// The source-table columns this expression reads.
  pub fn source_columns(&self) -> impl Iterator<Item = &Ident> {
    self.expr.columns().into_iter().map(|c| &c.name)
  }
}

/// Compiles `expr` as an annotation on a single-table query over `source`.
///
/// The trigger fires on one source row, so the expression has to be a pure
/// function of that row: anything that touches another table is rejected.
pub fn resolve(
  compiler: &dyn ExprCompiler,
  dialect: Dialect,
  source: &EntitySchema,
  expr: &Expr,
) -> Result<ResolvedExpr> {
  let compiled = compiler.compile(dialect, SingleTableQuery {
    table:      &source.table,
    annotation: expr,
  })?;

  if compiled.tables.len() != 1 || !compiled.tables.contains(source.table.as_str()) {
    return Err(Error::MultiTableExpression {
      source_table: source.table.as_str().to_owned(),
      tables:       compiled.tables,
    });
  }

  for column in expr.columns() {
    if column.table.as_ref().is_none_or(|t| *t == source.table) {
      source.find_column(column.name.as_str())?;
    }
  }

  Ok(ResolvedExpr {
    sql:    bind_to_new_row(&compiled.sql, &source.table),
    params: compiled.params,
    expr:   expr.clone(),
  })
}

/// Rewrites every `"table".` qualifier outside string literals to `NEW.`.
pub fn bind_to_new_row(sql: &str, table: &Ident) -> String {
  let needle = format!("{}.", table.quoted());
  let bytes = sql.as_bytes();
  let mut out = String::with_capacity(sql.len());
  let mut copied = 0;
  let mut i = 0;

  while i < bytes.len() {
    match bytes[i] {
      b'\'' => {
        i += 1;
        while i < bytes.len() {
          if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
              i += 2;
              continue;
            }
            break;
          }
          i += 1;
        }
        i += 1;
      }
      b'"' if sql[i..].starts_with(&needle) => {
        out.push_str(&sql[copied..i]);
        out.push_str(NEW_ROW);
        out.push('.');
        i += needle.len();
        copied = i;
      }
      b'"' => {
        i += 1;
        while i < bytes.len() && bytes[i] != b'"' {
          i += 1;
        }
        i += 1;
      }
      _ => i += 1,
    }
  }

  if copied < sql.len() {
    out.push_str(&sql[copied..]);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::SqlCompiler;

  fn dogs() -> EntitySchema {
    EntitySchema::new("Dog", "dogs", "id")
      .and_then(|s| s.column("bark_sound"))
      .and_then(|s| s.column("name"))
      .unwrap()
  }

  fn resolve_pg(expr: &Expr) -> Result<ResolvedExpr> {
    resolve(&SqlCompiler, Dialect::Postgres, &dogs(), expr)
  }

  #[test]
  fn column_is_rebound_to_new_row() {
    let resolved = resolve_pg(&Expr::col("bark_sound").unwrap()).unwrap();
    assert_eq!(resolved.sql, "NEW.\"bark_sound\"");
    assert!(resolved.params.is_empty());
  }

  #[test]
  fn string_literals_are_left_alone() {
    let expr = Expr::concat(
      Expr::value("\"dogs\".\"name\" says: "),
      Expr::col("bark_sound").unwrap(),
    );
    let resolved = resolve_pg(&expr).unwrap();
    assert_eq!(
      resolved.sql,
      "('\"dogs\".\"name\" says: ' || NEW.\"bark_sound\")"
    );
  }

  #[test]
  fn similarly_named_tables_are_not_rewritten() {
    let table = Ident::new("dogs").unwrap();
    assert_eq!(
      bind_to_new_row("\"hotdogs\".\"a\" + \"dogs\".\"b\"", &table),
      "\"hotdogs\".\"a\" + NEW.\"b\""
    );
  }

  #[test]
  fn multi_table_expression_is_rejected() {
    let expr = Expr::concat(
      Expr::col("name").unwrap(),
      Expr::qualified("owners", "name").unwrap(),
    );
    match resolve_pg(&expr) {
      Err(Error::MultiTableExpression { source_table, tables }) => {
        assert_eq!(source_table, "dogs");
        assert!(tables.contains("owners"));
      }
      other => panic!("expected MultiTableExpression, got {other:?}"),
    }
  }

  #[test]
  fn expression_over_another_table_only_is_rejected() {
    let expr = Expr::qualified("owners", "name").unwrap();
    assert!(matches!(
      resolve_pg(&expr),
      Err(Error::MultiTableExpression { .. })
    ));
  }

  #[test]
  fn unknown_source_column_is_rejected() {
    assert!(matches!(
      resolve_pg(&Expr::col("meow_sound").unwrap()),
      Err(Error::UnknownColumn { column, .. }) if column == "meow_sound"
    ));
  }

  #[test]
  fn source_columns_lists_what_the_trigger_watches() {
    let expr = Expr::concat(
      Expr::col("name").unwrap(),
      Expr::col("bark_sound").unwrap(),
    );
    let resolved = resolve_pg(&expr).unwrap();
    let cols: Vec<&str> = resolved.source_columns().map(Ident::as_str).collect();
    assert_eq!(cols, ["name", "bark_sound"]);
  }
}
