//! Error type for `quay-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] quay_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("file error: {0}")]
  Io(#[from] std::io::Error),

  /// A unique constraint rejected the write.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("database {0:?} is not open")]
  NotOpen(String),

  #[error("cannot rename or delete uninitialized database {0:?}")]
  Uninitialized(String),

  #[error("database {name:?} was initialized as {found}, expected {expected}")]
  SchemaMismatch {
    name:     String,
    expected: String,
    found:    String,
  },

  #[error("security violation: {0}")]
  Security(String),
}

impl Error {
  /// Failures of the underlying file or connection that may clear up on a
  /// later attempt.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Io(_) | Self::Database(_) | Self::NotOpen(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
