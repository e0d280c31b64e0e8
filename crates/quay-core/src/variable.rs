//! Scalar variables: the small typed key space each physical file carries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Variable recording which schema a file was initialized for.
pub const TYPE_VARIABLE: &str = "type";

/// Variable written into every tenant file when it is created.
pub const VERSION_VARIABLE: &str = "version";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
  Bool(bool),
  Number(f64),
  Text(String),
}

impl fmt::Display for ScalarValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bool(b) => write!(f, "{b}"),
      Self::Number(n) => write!(f, "{n}"),
      Self::Text(s) => write!(f, "{s:?}"),
    }
  }
}

/// The logical schema a physical file was initialized for.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum SchemaTag {
  /// The catalog root (`admin`) file holding the catalog tables.
  Catalog,
  Tenant,
}

impl From<SchemaTag> for ScalarValue {
  fn from(tag: SchemaTag) -> Self { Self::Text(tag.to_string()) }
}
