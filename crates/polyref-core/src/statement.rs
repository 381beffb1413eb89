//! [`Statement`]: the unit of generated work.

use std::fmt;

use crate::value::Value;

/// SQL text plus its ordered bound parameters. Constraints, indexes, trigger
/// functions and triggers are all expressed as statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
  pub sql:    String,
  pub params: Vec<Value>,
}

impl Statement {
  pub fn new(sql: impl Into<String>) -> Self {
    Self { sql: sql.into(), params: Vec::new() }
  }

  pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
    Self { sql: sql.into(), params }
  }
}

impl fmt::Display for Statement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.sql)?;
    if !self.params.is_empty() {
      let params: Vec<String> = self.params.iter().map(Value::to_string).collect();
      write!(f, " -- params: [{}]", params.join(", "))?;
    }
    Ok(())
  }
}
