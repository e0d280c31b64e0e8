//! Change events: the append-only delta log behind every aggregate.

use serde::{Deserialize, Serialize};

/// What a change event does to its target.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
  Add,
  Set,
  Delete,
}

/// One entry in an aggregate's change log.
///
/// `seq` comes from the store-wide [`crate::entity::EventSequence`], so it
/// totally orders events across every aggregate kind. `patch` holds the
/// optional-field delta: absent fields mean "unchanged".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<P> {
  pub seq:    i64,
  pub kind:   EventKind,
  pub target: i64,
  pub patch:  P,
}

impl<P> ChangeEvent<P> {
  pub fn add(seq: i64, target: i64, patch: P) -> Self {
    Self { seq, kind: EventKind::Add, target, patch }
  }

  pub fn set(seq: i64, target: i64, patch: P) -> Self {
    Self { seq, kind: EventKind::Set, target, patch }
  }
}

impl<P: Default> ChangeEvent<P> {
  /// A delete carries identity only.
  pub fn delete(seq: i64, target: i64) -> Self {
    Self { seq, kind: EventKind::Delete, target, patch: P::default() }
  }
}
