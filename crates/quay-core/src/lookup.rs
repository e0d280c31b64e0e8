//! Addressing aggregates by id or by name, and the naming rules they share.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, gate::Validate};

/// Longest accepted catalog or account name.
pub const MAX_NAME_LEN: usize = 64;

/// Identifies exactly one aggregate, either by its numeric id or by its
/// current name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
  Id(i64),
  Name(String),
}

impl fmt::Display for Lookup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "id {id}"),
      Self::Name(name) => write!(f, "name {name:?}"),
    }
  }
}

impl From<i64> for Lookup {
  fn from(id: i64) -> Self { Self::Id(id) }
}

impl From<&str> for Lookup {
  fn from(name: &str) -> Self { Self::Name(name.to_owned()) }
}

impl Validate for Lookup {
  fn validate(&self) -> Result<()> {
    match self {
      Self::Id(id) => validate_id(*id),
      Self::Name(name) => validate_name(name),
    }
  }
}

pub fn validate_id(id: i64) -> Result<()> {
  if id > 0 {
    Ok(())
  } else {
    Err(Error::Validation(format!("id must be positive, got {id}")))
  }
}

/// Names double as on-disk file stems, so they are restricted to a portable
/// character set.
pub fn validate_name(name: &str) -> Result<()> {
  if name.is_empty() {
    return Err(Error::Validation("name must not be empty".into()));
  }
  if name.len() > MAX_NAME_LEN {
    return Err(Error::Validation(format!(
      "name {name:?} is longer than {MAX_NAME_LEN} characters"
    )));
  }
  if name.starts_with('-') {
    return Err(Error::Validation(format!("name {name:?} must not start with '-'")));
  }
  if let Some(bad) = name
    .chars()
    .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
  {
    return Err(Error::Validation(format!(
      "name {name:?} contains invalid character {bad:?}"
    )));
  }
  Ok(())
}
