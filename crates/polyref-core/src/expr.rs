//! Proxy expressions and the [`ExprCompiler`] seam.
//!
//! A proxy maps a column of the reference table to a column of a source table
//! or to an expression over it. Expressions are a small structured tree
//! rather than SQL text so identifiers stay validated all the way into the
//! generated trigger body.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Result, dialect::Dialect, ident::Ident, value::Value};

// ─── Expression tree ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ColumnRefRepr")]
pub struct ColumnRef {
  /// `None` means the table the expression is compiled against.
  pub table: Option<Ident>,
  pub name:  Ident,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnRefRepr {
  Bare(Ident),
  Qualified {
    #[serde(default)]
    table: Option<Ident>,
    name:  Ident,
  },
}

impl From<ColumnRefRepr> for ColumnRef {
  fn from(repr: ColumnRefRepr) -> Self {
    match repr {
      ColumnRefRepr::Bare(name) => Self { table: None, name },
      ColumnRefRepr::Qualified { table, name } => Self { table, name },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Concat,
}

impl BinaryOp {
  fn symbol(self) -> &'static str {
    match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Concat => "||",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
  Column(ColumnRef),
  Value(Value),
  Binary {
    op:    BinaryOp,
    left:  Box<Expr>,
    right: Box<Expr>,
  },
  Func {
    name: Ident,
    #[serde(default)]
    args: Vec<Expr>,
  },
}

impl Expr {
  /// A column of the table the expression is compiled against.
  pub fn col(name: &str) -> Result<Self> {
    Ok(Self::column(Ident::new(name)?))
  }

  pub fn column(name: Ident) -> Self {
    Self::Column(ColumnRef { table: None, name })
  }

  /// A column of an explicitly named table.
  pub fn qualified(table: &str, name: &str) -> Result<Self> {
    Ok(Self::Column(ColumnRef {
      table: Some(Ident::new(table)?),
      name:  Ident::new(name)?,
    }))
  }

  pub fn value(value: impl Into<Value>) -> Self { Self::Value(value.into()) }

  pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
    Self::Binary { op, left: Box::new(left), right: Box::new(right) }
  }

  pub fn concat(left: Expr, right: Expr) -> Self {
    Self::binary(BinaryOp::Concat, left, right)
  }

  pub fn func(name: &str, args: Vec<Expr>) -> Result<Self> {
    Ok(Self::Func { name: Ident::new(name)?, args })
  }

  /// Every column reference in the tree, depth first.
  pub fn columns(&self) -> Vec<&ColumnRef> {
    let mut out = Vec::new();
    self.collect_columns(&mut out);
    out
  }

  fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
    match self {
      Self::Column(c) => out.push(c),
      Self::Value(_) => {}
      Self::Binary { left, right, .. } => {
        left.collect_columns(out);
        right.collect_columns(out);
      }
      Self::Func { args, .. } => {
        for arg in args {
          arg.collect_columns(out);
        }
      }
    }
  }
}

// ─── Compiler seam ───────────────────────────────────────────────────────────

/// A minimal single-table query annotated with one expression; what a proxy
/// expression is compiled as.
#[derive(Debug, Clone, Copy)]
pub struct SingleTableQuery<'a> {
  pub table:      &'a Ident,
  pub annotation: &'a Expr,
}

/// The compiled annotation plus every table the query had to touch.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
  pub sql:    String,
  pub params: Vec<Value>,
  pub tables: BTreeSet<String>,
}

pub trait ExprCompiler: Send + Sync {
  fn compile(
    &self,
    dialect: Dialect,
    query: SingleTableQuery<'_>,
  ) -> Result<CompiledExpr>;
}

/// Built-in compiler. Literals are rendered inline because the result ends up
/// inside DDL bodies where bind parameters are not accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCompiler;

impl ExprCompiler for SqlCompiler {
  fn compile(
    &self,
    dialect: Dialect,
    query: SingleTableQuery<'_>,
  ) -> Result<CompiledExpr> {
    let mut tables = BTreeSet::from([query.table.as_str().to_owned()]);
    let sql = render(dialect, query.table, query.annotation, &mut tables);
    Ok(CompiledExpr { sql, params: Vec::new(), tables })
  }
}

fn render(
  dialect: Dialect,
  table: &Ident,
  expr: &Expr,
  tables: &mut BTreeSet<String>,
) -> String {
  match expr {
    Expr::Column(ColumnRef { table: qualifier, name }) => {
      let owner = qualifier.as_ref().unwrap_or(table);
      tables.insert(owner.as_str().to_owned());
      name.qualified(&owner.quoted())
    }
    Expr::Value(v) => dialect.literal(v),
    Expr::Binary { op, left, right } => format!(
      "({} {} {})",
      render(dialect, table, left, tables),
      op.symbol(),
      render(dialect, table, right, tables)
    ),
    Expr::Func { name, args } => {
      let args: Vec<String> = args
        .iter()
        .map(|a| render(dialect, table, a, tables))
        .collect();
      format!("{}({})", name.as_str(), args.join(", "))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dogs() -> Ident { Ident::new("dogs").unwrap() }

  fn compile(expr: &Expr) -> CompiledExpr {
    let table = dogs();
    SqlCompiler
      .compile(Dialect::Postgres, SingleTableQuery { table: &table, annotation: expr })
      .unwrap()
  }

  #[test]
  fn plain_column_is_table_qualified() {
    let out = compile(&Expr::col("bark_sound").unwrap());
    assert_eq!(out.sql, "\"dogs\".\"bark_sound\"");
    assert_eq!(out.tables, BTreeSet::from(["dogs".to_owned()]));
    assert!(out.params.is_empty());
  }

  #[test]
  fn nested_expression_renders_literals_inline() {
    let expr = Expr::func("upper", vec![Expr::concat(
      Expr::col("bark_sound").unwrap(),
      Expr::value("!"),
    )])
    .unwrap();
    assert_eq!(compile(&expr).sql, "upper((\"dogs\".\"bark_sound\" || '!'))");
  }

  #[test]
  fn foreign_columns_add_tables() {
    let expr = Expr::concat(
      Expr::col("bark_sound").unwrap(),
      Expr::qualified("owners", "name").unwrap(),
    );
    let out = compile(&expr);
    assert_eq!(
      out.tables,
      BTreeSet::from(["dogs".to_owned(), "owners".to_owned()])
    );
  }

  #[test]
  fn columns_walks_the_whole_tree() {
    let expr = Expr::func("coalesce", vec![
      Expr::col("nickname").unwrap(),
      Expr::binary(
        BinaryOp::Concat,
        Expr::col("first").unwrap(),
        Expr::col("last").unwrap(),
      ),
    ])
    .unwrap();
    let names: Vec<&str> = expr.columns().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["nickname", "first", "last"]);
  }

  #[test]
  fn deserializes_bare_column_names() {
    let expr: Expr = serde_json::from_str(r#"{"column": "bark_sound"}"#).unwrap();
    assert_eq!(expr, Expr::col("bark_sound").unwrap());

    let expr: Expr =
      serde_json::from_str(r#"{"column": {"table": "owners", "name": "name"}}"#)
        .unwrap();
    assert_eq!(expr, Expr::qualified("owners", "name").unwrap());
  }
}
