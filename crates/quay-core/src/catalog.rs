//! Catalog entries: one per logical database, plus the catalog root.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{Aggregate, Folded},
  event::{ChangeEvent, EventKind},
  gate::Validate,
  lookup::{Lookup, validate_id, validate_name},
};

/// Id of the catalog root entry.
pub const ROOT_ID: i64 = 1;

/// Name of the catalog root entry, its physical file and the bootstrap
/// account.
pub const ROOT_NAME: &str = "admin";

/// `true` if `lookup` addresses the catalog root by id or by name.
pub fn is_root_lookup(lookup: &Lookup) -> bool {
  match lookup {
    Lookup::Id(id) => *id == ROOT_ID,
    Lookup::Name(name) => name == ROOT_NAME,
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The catalog's record of one logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
  pub id:      i64,
  pub name:    String,
  pub admins:  BTreeSet<i64>,
  pub readers: BTreeSet<i64>,
  pub writers: BTreeSet<i64>,
  /// Highest event sequence number folded into this snapshot.
  pub version: i64,
}

impl CatalogEntry {
  /// The catalog root. There is no separate root type: root-only rules are
  /// keyed on this id and on the root database file.
  pub fn is_root(&self) -> bool { self.id == ROOT_ID }
}

fn validate_members(role: &str, ids: &BTreeSet<i64>) -> Result<()> {
  match ids.iter().find(|id| **id <= 0) {
    Some(bad) => Err(Error::Validation(format!("{role} contains invalid account id {bad}"))),
    None => Ok(()),
  }
}

impl Validate for CatalogEntry {
  fn validate(&self) -> Result<()> {
    validate_id(self.id)?;
    validate_name(&self.name)?;
    if (self.id == ROOT_ID) != (self.name == ROOT_NAME) {
      return Err(Error::Validation(format!(
        "only entry {ROOT_ID} may be named {ROOT_NAME:?} (got entry {} named {:?})",
        self.id, self.name
      )));
    }
    validate_members("admins", &self.admins)?;
    validate_members("readers", &self.readers)?;
    validate_members("writers", &self.writers)?;
    if self.version < 0 {
      return Err(Error::Validation(format!("negative version {}", self.version)));
    }
    Ok(())
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Request to create a catalog entry. The id is assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
  pub name:    String,
  #[serde(default)]
  pub admins:  BTreeSet<i64>,
  #[serde(default)]
  pub readers: BTreeSet<i64>,
  #[serde(default)]
  pub writers: BTreeSet<i64>,
}

impl NewEntry {
  pub fn named(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  /// The catalog root as created at bootstrap.
  pub fn root() -> Self {
    Self {
      admins: BTreeSet::from([ROOT_ID]),
      ..Self::named(ROOT_NAME)
    }
  }
}

impl Validate for NewEntry {
  fn validate(&self) -> Result<()> {
    validate_name(&self.name)?;
    validate_members("admins", &self.admins)?;
    validate_members("readers", &self.readers)?;
    validate_members("writers", &self.writers)
  }
}

/// Delta carried by catalog change events. `None` leaves a field alone;
/// `Some` of an empty set clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub admins:  Option<BTreeSet<i64>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub readers: Option<BTreeSet<i64>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub writers: Option<BTreeSet<i64>>,
}

impl EntryPatch {
  pub fn rename(name: impl Into<String>) -> Self {
    Self { name: Some(name.into()), ..Self::default() }
  }
}

impl Validate for EntryPatch {
  fn validate(&self) -> Result<()> {
    if let Some(name) = &self.name {
      validate_name(name)?;
    }
    for (role, ids) in [
      ("admins", &self.admins),
      ("readers", &self.readers),
      ("writers", &self.writers),
    ] {
      if let Some(ids) = ids {
        validate_members(role, ids)?;
      }
    }
    Ok(())
  }
}

// ─── Folding ─────────────────────────────────────────────────────────────────

impl Aggregate for CatalogEntry {
  type New = NewEntry;
  type Patch = EntryPatch;

  const KIND: &'static str = "catalog entry";

  fn id(&self) -> i64 { self.id }

  fn name(&self) -> &str { &self.name }

  fn version(&self) -> i64 { self.version }

  fn birth_patch(&self) -> EntryPatch {
    EntryPatch {
      name:    Some(self.name.clone()),
      admins:  Some(self.admins.clone()),
      readers: Some(self.readers.clone()),
      writers: Some(self.writers.clone()),
    }
  }

  fn apply(self, event: &ChangeEvent<EntryPatch>) -> Folded<Self> {
    if event.kind == EventKind::Delete {
      return Folded::Deleted;
    }
    let patch = &event.patch;
    Folded::Live(Self {
      id:      self.id,
      name:    patch.name.clone().unwrap_or(self.name),
      admins:  patch.admins.clone().unwrap_or(self.admins),
      readers: patch.readers.clone().unwrap_or(self.readers),
      writers: patch.writers.clone().unwrap_or(self.writers),
      version: self.version.max(event.seq),
    })
  }

  fn merge(self, stored: Self) -> Self {
    Self { version: self.version.max(stored.version), ..stored }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::replay;

  fn ids(list: &[i64]) -> BTreeSet<i64> { list.iter().copied().collect() }

  fn birth() -> CatalogEntry {
    CatalogEntry {
      id:      2,
      name:    "tenant1".into(),
      admins:  ids(&[1]),
      readers: ids(&[]),
      writers: ids(&[]),
      version: 0,
    }
  }

  fn history() -> Vec<ChangeEvent<EntryPatch>> {
    vec![
      ChangeEvent::add(3, 2, birth().birth_patch()),
      ChangeEvent::set(5, 2, EntryPatch { readers: Some(ids(&[7, 8])), ..EntryPatch::default() }),
      ChangeEvent::set(9, 2, EntryPatch::rename("tenant-one")),
      ChangeEvent::set(12, 2, EntryPatch { readers: Some(ids(&[])), ..EntryPatch::default() }),
    ]
  }

  #[test]
  fn replay_folds_in_sequence_order() {
    let Folded::Live(entry) = replay(birth(), &history()) else {
      panic!("entry should be live");
    };
    assert_eq!(entry.name, "tenant-one");
    assert!(entry.readers.is_empty());
    assert_eq!(entry.admins, ids(&[1]));
    assert_eq!(entry.version, 12);
  }

  #[test]
  fn replay_is_independent_of_batch_size() {
    let events = history();
    let Folded::Live(whole) = replay(birth(), &events) else { panic!() };

    for split in 0..=events.len() {
      let (head, tail) = events.split_at(split);
      let Folded::Live(partial) = replay(birth(), head) else { panic!() };
      let Folded::Live(rest) = replay(partial, tail) else { panic!() };
      assert_eq!(rest, whole, "split at {split}");
    }

    // Re-folding already folded events changes nothing.
    let Folded::Live(again) = replay(whole.clone(), &events) else { panic!() };
    assert_eq!(again, whole);
  }

  #[test]
  fn replay_sorts_out_of_order_input() {
    let mut events = history();
    events.reverse();
    let Folded::Live(entry) = replay(birth(), &events) else { panic!() };
    assert_eq!(entry.name, "tenant-one");
    assert!(entry.readers.is_empty());
  }

  #[test]
  fn delete_short_circuits() {
    let mut events = history();
    events.insert(2, ChangeEvent::delete(6, 2));
    assert_eq!(replay(birth(), &events), Folded::Deleted);
  }

  #[test]
  fn absent_fields_are_left_alone() {
    let mut entry = birth();
    entry.writers = ids(&[4]);
    let Folded::Live(next) = entry.clone().apply(&ChangeEvent::set(1, 2, EntryPatch::default())) else {
      panic!()
    };
    assert_eq!(next.writers, ids(&[4]));
    assert_eq!(next.name, entry.name);
    assert_eq!(next.version, 1);
  }

  #[test]
  fn merge_keeps_furthest_watermark() {
    let mut current = birth();
    current.version = 40;
    let mut stored = birth();
    stored.name = "renamed".into();
    stored.version = 10;
    let merged = current.merge(stored);
    assert_eq!(merged.name, "renamed");
    assert_eq!(merged.version, 40);
  }

  #[test]
  fn only_entry_one_is_named_admin() {
    let mut entry = birth();
    entry.name = ROOT_NAME.into();
    assert!(entry.validate().is_err());

    let mut root = birth();
    root.id = ROOT_ID;
    assert!(root.validate().is_err());
    root.name = ROOT_NAME.into();
    assert!(root.validate().is_ok());
  }

  #[test]
  fn member_ids_must_be_positive() {
    let new = NewEntry { readers: ids(&[0]), ..NewEntry::named("t") };
    assert!(matches!(new.validate(), Err(Error::Validation(_))));
    let patch = EntryPatch { admins: Some(ids(&[-3])), ..EntryPatch::default() };
    assert!(patch.validate().is_err());
  }

  #[test]
  fn root_lookups() {
    assert!(is_root_lookup(&Lookup::Id(ROOT_ID)));
    assert!(is_root_lookup(&Lookup::from(ROOT_NAME)));
    assert!(!is_root_lookup(&Lookup::Id(2)));
    assert!(!is_root_lookup(&Lookup::from("tenant1")));
  }
}
