//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Id sets are stored as compact JSON arrays, scalar variable values as JSON
//! scalars, and event kinds as their lowercase names.

use std::collections::BTreeSet;

use quay_core::{
  account::{Account, AccountPatch},
  catalog::{CatalogEntry, EntryPatch},
  event::{ChangeEvent, EventKind},
  variable::ScalarValue,
};

use crate::{Error, Result};

// ─── Id sets ─────────────────────────────────────────────────────────────────

pub fn encode_ids(ids: &BTreeSet<i64>) -> Result<String> {
  Ok(serde_json::to_string(ids)?)
}

pub fn decode_ids(s: &str) -> Result<BTreeSet<i64>> { Ok(serde_json::from_str(s)?) }

fn encode_opt_ids(ids: Option<&BTreeSet<i64>>) -> Result<Option<String>> {
  ids.map(encode_ids).transpose()
}

fn decode_opt_ids(s: Option<&str>) -> Result<Option<BTreeSet<i64>>> {
  s.map(decode_ids).transpose()
}

// ─── Event kind ──────────────────────────────────────────────────────────────

pub fn encode_kind(kind: EventKind) -> &'static str {
  match kind {
    EventKind::Add => "add",
    EventKind::Set => "set",
    EventKind::Delete => "delete",
  }
}

pub fn decode_kind(s: &str) -> Result<EventKind> {
  s.parse()
    .map_err(|_| Error::Core(quay_core::Error::UnknownEventKind(s.to_owned())))
}

// ─── Scalar values ───────────────────────────────────────────────────────────

pub fn encode_value(value: &ScalarValue) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_value(s: &str) -> Result<ScalarValue> { Ok(serde_json::from_str(s)?) }

// ─── Catalog rows ────────────────────────────────────────────────────────────

pub const ENTRY_COLUMNS: &str = "id, name, admins, readers, writers, version";

/// Raw column values of a `catalog_entry` row.
pub struct RawEntry {
  pub id:      i64,
  pub name:    String,
  pub admins:  String,
  pub readers: String,
  pub writers: String,
  pub version: i64,
}

impl RawEntry {
  /// Read a row selected with [`ENTRY_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:      row.get(0)?,
      name:    row.get(1)?,
      admins:  row.get(2)?,
      readers: row.get(3)?,
      writers: row.get(4)?,
      version: row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<CatalogEntry> {
    Ok(CatalogEntry {
      id:      self.id,
      name:    self.name,
      admins:  decode_ids(&self.admins)?,
      readers: decode_ids(&self.readers)?,
      writers: decode_ids(&self.writers)?,
      version: self.version,
    })
  }
}

pub const ENTRY_EVENT_COLUMNS: &str = "seq, kind, entry_id, name, admins, readers, writers";

/// Raw column values of a `catalog_change_event` row; also used to bind one
/// for insertion.
pub struct RawEntryEvent {
  pub seq:      i64,
  pub kind:     String,
  pub entry_id: i64,
  pub name:     Option<String>,
  pub admins:   Option<String>,
  pub readers:  Option<String>,
  pub writers:  Option<String>,
}

impl RawEntryEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      seq:      row.get(0)?,
      kind:     row.get(1)?,
      entry_id: row.get(2)?,
      name:     row.get(3)?,
      admins:   row.get(4)?,
      readers:  row.get(5)?,
      writers:  row.get(6)?,
    })
  }

  pub fn encode(event: &ChangeEvent<EntryPatch>) -> Result<Self> {
    let patch = &event.patch;
    Ok(Self {
      seq:      event.seq,
      kind:     encode_kind(event.kind).to_owned(),
      entry_id: event.target,
      name:     patch.name.clone(),
      admins:   encode_opt_ids(patch.admins.as_ref())?,
      readers:  encode_opt_ids(patch.readers.as_ref())?,
      writers:  encode_opt_ids(patch.writers.as_ref())?,
    })
  }

  pub fn into_event(self) -> Result<ChangeEvent<EntryPatch>> {
    Ok(ChangeEvent {
      seq:    self.seq,
      kind:   decode_kind(&self.kind)?,
      target: self.entry_id,
      patch:  EntryPatch {
        name:    self.name,
        admins:  decode_opt_ids(self.admins.as_deref())?,
        readers: decode_opt_ids(self.readers.as_deref())?,
        writers: decode_opt_ids(self.writers.as_deref())?,
      },
    })
  }
}

// ─── Account rows ────────────────────────────────────────────────────────────

pub const ACCOUNT_COLUMNS: &str = "id, name, password_hash, salt, version";

pub fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
  Ok(Account {
    id:            row.get(0)?,
    name:          row.get(1)?,
    password_hash: row.get(2)?,
    salt:          row.get(3)?,
    version:       row.get(4)?,
  })
}

pub const ACCOUNT_EVENT_COLUMNS: &str = "seq, kind, account_id, name, password_hash, salt";

pub struct RawAccountEvent {
  pub seq:           i64,
  pub kind:          String,
  pub account_id:    i64,
  pub name:          Option<String>,
  pub password_hash: Option<String>,
  pub salt:          Option<String>,
}

impl RawAccountEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      seq:           row.get(0)?,
      kind:          row.get(1)?,
      account_id:    row.get(2)?,
      name:          row.get(3)?,
      password_hash: row.get(4)?,
      salt:          row.get(5)?,
    })
  }

  pub fn encode(event: &ChangeEvent<AccountPatch>) -> Self {
    Self {
      seq:           event.seq,
      kind:          encode_kind(event.kind).to_owned(),
      account_id:    event.target,
      name:          event.patch.name.clone(),
      password_hash: event.patch.password_hash.clone(),
      salt:          event.patch.salt.clone(),
    }
  }

  pub fn into_event(self) -> Result<ChangeEvent<AccountPatch>> {
    Ok(ChangeEvent {
      seq:    self.seq,
      kind:   decode_kind(&self.kind)?,
      target: self.account_id,
      patch:  AccountPatch {
        name:          self.name,
        password_hash: self.password_hash,
        salt:          self.salt,
      },
    })
  }
}
