//! Error type for `quay-catalog`.
//!
//! Core and store errors are flattened into one taxonomy so callers can
//! match on the kind of failure without knowing which layer raised it.

use quay_core::access::Capability;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("actor {actor} lacks {capability} capability on catalog entry {target}")]
  Forbidden {
    capability: Capability,
    actor:      i64,
    target:     i64,
  },

  #[error("security violation: {0}")]
  Security(String),

  /// A file-side step kept failing after the catalog change was recorded.
  #[error("{operation} failed after {attempts} attempts: {source}")]
  TransientFile {
    operation: &'static str,
    attempts:  u32,
    #[source]
    source:    quay_store_sqlite::Error,
  },

  #[error("invalid account name or password")]
  Unauthenticated,

  #[error("password hashing failed: {0}")]
  Password(String),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("store error: {0}")]
  Store(#[source] quay_store_sqlite::Error),
}

impl From<quay_core::Error> for Error {
  fn from(err: quay_core::Error) -> Self {
    use quay_core::Error as Core;
    match err {
      Core::Validation(msg) => Self::Validation(msg),
      Core::NotFound(msg) => Self::NotFound(msg),
      Core::Conflict(msg) => Self::Conflict(msg),
      Core::Forbidden { capability, actor, target } => {
        Self::Forbidden { capability, actor, target }
      }
      Core::Security(msg) => Self::Security(msg),
      // Undecodable stored data.
      other => Self::Store(quay_store_sqlite::Error::Core(other)),
    }
  }
}

impl From<quay_store_sqlite::Error> for Error {
  fn from(err: quay_store_sqlite::Error) -> Self {
    use quay_store_sqlite::Error as Store;
    match err {
      Store::Core(core) => core.into(),
      Store::Conflict(msg) => Self::Conflict(msg),
      Store::Security(msg) => Self::Security(msg),
      other => Self::Store(other),
    }
  }
}

impl From<argon2::password_hash::Error> for Error {
  fn from(err: argon2::password_hash::Error) -> Self { Self::Password(err.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
