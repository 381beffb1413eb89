//! Validated SQL identifiers.
//!
//! Every table, column, index, trigger and function name that reaches
//! generated DDL passes through [`Ident`]. Names are restricted to ASCII
//! letters, digits and underscores (not starting with a digit) and are always
//! emitted double-quoted, so nothing from a declaration can alter the shape of
//! a statement.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// PostgreSQL truncates identifiers beyond `NAMEDATALEN - 1` bytes; a
/// truncated generated name could silently collide with another one.
pub const MAX_IDENT_LEN: usize = 63;

#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
  pub fn new(name: impl Into<String>) -> Result<Self> {
    let name = name.into();
    let mut chars = name.chars();
    let valid_start = chars
      .next()
      .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
      return Err(Error::UnsafeIdentifier(name));
    }
    if name.len() > MAX_IDENT_LEN {
      return Err(Error::IdentifierTooLong { name, max: MAX_IDENT_LEN });
    }
    Ok(Self(name))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The double-quoted form, e.g. `"dog_id"`.
  pub fn quoted(&self) -> String { format!("\"{}\"", self.0) }

  /// `qualifier."name"`. The qualifier is emitted as given, which is what
  /// `NEW` and pre-quoted aliases need.
  pub fn qualified(&self, qualifier: &str) -> String {
    format!("{qualifier}.{}", self.quoted())
  }
}

impl fmt::Display for Ident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"{}\"", self.0)
  }
}

impl TryFrom<String> for Ident {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::new(value) }
}

impl TryFrom<&str> for Ident {
  type Error = Error;

  fn try_from(value: &str) -> Result<Self> { Self::new(value) }
}

impl From<Ident> for String {
  fn from(value: Ident) -> Self { value.0 }
}

impl AsRef<str> for Ident {
  fn as_ref(&self) -> &str { &self.0 }
}

// ─── Generated names ─────────────────────────────────────────────────────────

/// `update_<source>_<reference>_trigger`
pub fn trigger_name(source_table: &Ident, reference_table: &Ident) -> Result<Ident> {
  Ident::new(format!(
    "update_{}_{}_trigger",
    source_table.as_str(),
    reference_table.as_str()
  ))
}

/// `unique_<source>_<reference>_ix`
pub fn index_name(source_table: &Ident, reference_table: &Ident) -> Result<Ident> {
  Ident::new(format!(
    "unique_{}_{}_ix",
    source_table.as_str(),
    reference_table.as_str()
  ))
}

/// `update_<source>_<reference>_`; rendered with a trailing `()` where the
/// function is named in DDL.
pub fn trigger_function_name(
  source_table: &Ident,
  reference_table: &Ident,
) -> Result<Ident> {
  Ident::new(format!(
    "update_{}_{}_",
    source_table.as_str(),
    reference_table.as_str()
  ))
}

/// `constraint_<reference>_only_one_source`
pub fn constraint_name(reference_table: &Ident) -> Result<Ident> {
  Ident::new(format!("constraint_{}_only_one_source", reference_table.as_str()))
}

/// Appends a suffix, for dialects that split one logical object in two.
pub fn suffixed(name: &Ident, suffix: &str) -> Result<Ident> {
  Ident::new(format!("{}_{suffix}", name.as_str()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_plain_names() {
    let ident = Ident::new("dog_id").unwrap();
    assert_eq!(ident.as_str(), "dog_id");
    assert_eq!(ident.to_string(), "\"dog_id\"");
    assert_eq!(ident.qualified("NEW"), "NEW.\"dog_id\"");
  }

  #[test]
  fn rejects_injection_attempts() {
    for bad in ["", "1dogs", "dogs; DROP TABLE cats", "a\"b", "dog-id", "näme"] {
      assert!(
        matches!(Ident::new(bad), Err(Error::UnsafeIdentifier(_))),
        "{bad:?} should be rejected"
      );
    }
  }

  #[test]
  fn rejects_names_postgres_would_truncate() {
    let long = "a".repeat(MAX_IDENT_LEN + 1);
    assert!(matches!(
      Ident::new(long),
      Err(Error::IdentifierTooLong { max: MAX_IDENT_LEN, .. })
    ));
    assert!(Ident::new("a".repeat(MAX_IDENT_LEN)).is_ok());
  }

  #[test]
  fn generated_names_are_deterministic() {
    let dogs = Ident::new("dogs").unwrap();
    let animals = Ident::new("animals").unwrap();
    assert_eq!(
      trigger_name(&dogs, &animals).unwrap().as_str(),
      "update_dogs_animals_trigger"
    );
    assert_eq!(
      index_name(&dogs, &animals).unwrap().as_str(),
      "unique_dogs_animals_ix"
    );
    assert_eq!(
      trigger_function_name(&dogs, &animals).unwrap().as_str(),
      "update_dogs_animals_"
    );
    assert_eq!(
      constraint_name(&animals).unwrap().as_str(),
      "constraint_animals_only_one_source"
    );
  }

  #[test]
  fn deserializes_with_validation() {
    let ok: Ident = serde_json::from_str("\"sound\"").unwrap();
    assert_eq!(ok.as_str(), "sound");
    assert!(serde_json::from_str::<Ident>("\"bad name\"").is_err());
  }
}
