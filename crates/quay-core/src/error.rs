//! Error types for `quay-core`.

use thiserror::Error;

use crate::access::Capability;

#[derive(Debug, Error)]
pub enum Error {
  /// A shape or invariant check failed before any effect ran.
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

  /// Attempt to rename or remove the catalog root.
  #[error("security violation: {0}")]
  Security(String),

  #[error("unknown change event kind: {0:?}")]
  UnknownEventKind(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
