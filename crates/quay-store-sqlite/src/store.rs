//! [`SqliteStore`]: the admin store holding catalog entries, accounts and
//! their change logs.

use rusqlite::OptionalExtension as _;

use quay_core::{
  account::{Account, AccountPatch, NewAccount},
  catalog::{CatalogEntry, EntryPatch, NewEntry},
  entity::{EventSequence, EventStore},
  event::ChangeEvent,
  lookup::Lookup,
};

use crate::{
  Error, Result,
  encode::{
    ACCOUNT_COLUMNS, ACCOUNT_EVENT_COLUMNS, ENTRY_COLUMNS, ENTRY_EVENT_COLUMNS, RawAccountEvent,
    RawEntry, RawEntryEvent, account_from_row, encode_ids,
  },
  schema::{CATALOG, VARIABLES},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The catalog tables of the root database file.
///
/// Cloning is cheap since the inner connection is reference-counted. Usually
/// obtained from [`crate::RootDatabaseFile::store`].
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Wrap a connection whose schema has already been created.
  pub(crate) fn from_connection(conn: tokio_rusqlite::Connection) -> Self { Self { conn } }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    conn
      .call(|conn| {
        conn.execute_batch(VARIABLES)?;
        conn.execute_batch(CATALOG)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn })
  }

  /// Whether an entry other than `except` holds `name`, either as its current
  /// name or as the name its row was inserted under. Row names stay reserved
  /// after a rename since the UNIQUE constraint still covers them.
  pub async fn entry_name_taken(&self, name: &str, except: Option<i64>) -> Result<bool> {
    let name = name.to_owned();
    let taken = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS(
             SELECT 1 FROM catalog_entry t
             WHERE t.id IS NOT ?2
               AND (t.name = ?1 OR COALESCE(
                 (SELECT ev.name FROM catalog_change_event ev
                   WHERE ev.entry_id = t.id AND ev.seq > t.version AND ev.name IS NOT NULL
                   ORDER BY ev.seq DESC LIMIT 1),
                 t.name) = ?1))",
          rusqlite::params![name, except],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(taken)
  }
}

/// Turn a unique-constraint failure into [`Error::Conflict`].
fn conflict_or_database(err: tokio_rusqlite::Error, conflict: impl FnOnce() -> String) -> Error {
  match err {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
      if e.code == rusqlite::ErrorCode::ConstraintViolation =>
    {
      Error::Conflict(conflict())
    }
    other => Error::Database(other),
  }
}

/// `SELECT` resolving a row by the name it carries once renames logged after
/// its checkpoint are applied. `{table}`, `{log}` and `{fk}` are spliced in.
fn current_name_query(columns: &str, table: &str, log: &str, fk: &str) -> String {
  format!(
    "SELECT {columns} FROM {table} t
     WHERE COALESCE(
       (SELECT ev.name FROM {log} ev
         WHERE ev.{fk} = t.id AND ev.seq > t.version AND ev.name IS NOT NULL
         ORDER BY ev.seq DESC LIMIT 1),
       t.name) = ?1
     ORDER BY t.id
     LIMIT 1"
  )
}

// ─── Sequence ────────────────────────────────────────────────────────────────

impl EventSequence for SqliteStore {
  type Error = Error;

  async fn next_seq(&self) -> Result<i64> {
    let seq = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "UPDATE event_sequence SET value = value + 1 WHERE id = 1 RETURNING value",
          [],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(seq)
  }
}

// ─── Catalog entries ─────────────────────────────────────────────────────────

impl EventStore<CatalogEntry> for SqliteStore {
  async fn find(&self, lookup: &Lookup) -> Result<Option<CatalogEntry>> {
    let sql = match lookup {
      Lookup::Id(_) => format!("SELECT {ENTRY_COLUMNS} FROM catalog_entry WHERE id = ?1"),
      Lookup::Name(_) => {
        current_name_query(ENTRY_COLUMNS, "catalog_entry", "catalog_change_event", "entry_id")
      }
    };
    let key = match lookup {
      Lookup::Id(id) => rusqlite::types::Value::Integer(*id),
      Lookup::Name(name) => rusqlite::types::Value::Text(name.clone()),
    };

    let raw: Option<RawEntry> = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [key], RawEntry::from_row).optional()?))
      .await?;

    raw.map(RawEntry::into_entry).transpose()
  }

  async fn list(&self) -> Result<Vec<CatalogEntry>> {
    let raws: Vec<RawEntry> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM catalog_entry ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }

  async fn insert(&self, new: &NewEntry) -> Result<CatalogEntry> {
    let name    = new.name.clone();
    let admins  = encode_ids(&new.admins)?;
    let readers = encode_ids(&new.readers)?;
    let writers = encode_ids(&new.writers)?;

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO catalog_entry (name, admins, readers, writers, version)
           VALUES (?1, ?2, ?3, ?4, 0)",
          rusqlite::params![name, admins, readers, writers],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await
      .map_err(|e| conflict_or_database(e, || format!("catalog entry {:?} already exists", new.name)))?;

    Ok(CatalogEntry {
      id,
      name:    new.name.clone(),
      admins:  new.admins.clone(),
      readers: new.readers.clone(),
      writers: new.writers.clone(),
      version: 0,
    })
  }

  async fn upsert(&self, snapshot: &CatalogEntry) -> Result<CatalogEntry> {
    let id      = snapshot.id;
    let name    = snapshot.name.clone();
    let admins  = encode_ids(&snapshot.admins)?;
    let readers = encode_ids(&snapshot.readers)?;
    let writers = encode_ids(&snapshot.writers)?;
    let version = snapshot.version;

    let raw: RawEntry = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO catalog_entry (id, name, admins, readers, writers, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               admins = excluded.admins,
               readers = excluded.readers,
               writers = excluded.writers,
               version = excluded.version
             RETURNING {ENTRY_COLUMNS}"
          ),
          rusqlite::params![id, name, admins, readers, writers, version],
          RawEntry::from_row,
        )?)
      })
      .await
      .map_err(|e| {
        conflict_or_database(e, || format!("catalog entry {:?} already exists", snapshot.name))
      })?;

    raw.into_entry()
  }

  async fn events_after(&self, id: i64, after: i64) -> Result<Vec<ChangeEvent<EntryPatch>>> {
    let raws: Vec<RawEntryEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTRY_EVENT_COLUMNS} FROM catalog_change_event
           WHERE entry_id = ?1 AND seq > ?2
           ORDER BY seq ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id, after], RawEntryEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntryEvent::into_event).collect()
  }

  async fn append(&self, event: &ChangeEvent<EntryPatch>) -> Result<()> {
    let raw = RawEntryEvent::encode(event)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO catalog_change_event ({ENTRY_EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
          ),
          rusqlite::params![
            raw.seq,
            raw.kind,
            raw.entry_id,
            raw.name,
            raw.admins,
            raw.readers,
            raw.writers,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn purge(&self, id: i64) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM catalog_change_event WHERE entry_id = ?1", [id])?;
        let rows = tx.execute("DELETE FROM catalog_entry WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(rows > 0)
      })
      .await?;
    Ok(removed)
  }
}

// ─── Accounts ────────────────────────────────────────────────────────────────

impl EventStore<Account> for SqliteStore {
  async fn find(&self, lookup: &Lookup) -> Result<Option<Account>> {
    let sql = match lookup {
      Lookup::Id(_) => format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ?1"),
      Lookup::Name(_) => {
        current_name_query(ACCOUNT_COLUMNS, "account", "account_change_event", "account_id")
      }
    };
    let key = match lookup {
      Lookup::Id(id) => rusqlite::types::Value::Integer(*id),
      Lookup::Name(name) => rusqlite::types::Value::Text(name.clone()),
    };

    let account = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [key], account_from_row).optional()?))
      .await?;
    Ok(account)
  }

  async fn list(&self) -> Result<Vec<Account>> {
    let accounts = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM account ORDER BY id"))?;
        let rows = stmt
          .query_map([], account_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(accounts)
  }

  async fn insert(&self, new: &NewAccount) -> Result<Account> {
    let name          = new.name.clone();
    let password_hash = new.password_hash.clone();
    let salt          = new.salt.clone();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO account (name, password_hash, salt, version) VALUES (?1, ?2, ?3, 0)",
          rusqlite::params![name, password_hash, salt],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await
      .map_err(|e| conflict_or_database(e, || format!("account {:?} already exists", new.name)))?;

    Ok(Account {
      id,
      name:          new.name.clone(),
      password_hash: new.password_hash.clone(),
      salt:          new.salt.clone(),
      version:       0,
    })
  }

  async fn upsert(&self, snapshot: &Account) -> Result<Account> {
    let account = snapshot.clone();
    self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO account (id, name, password_hash, salt, version)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               password_hash = excluded.password_hash,
               salt = excluded.salt,
               version = excluded.version
             RETURNING {ACCOUNT_COLUMNS}"
          ),
          rusqlite::params![
            account.id,
            account.name,
            account.password_hash,
            account.salt,
            account.version,
          ],
          account_from_row,
        )?)
      })
      .await
      .map_err(|e| conflict_or_database(e, || format!("account {:?} already exists", snapshot.name)))
  }

  async fn events_after(&self, id: i64, after: i64) -> Result<Vec<ChangeEvent<AccountPatch>>> {
    let raws: Vec<RawAccountEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACCOUNT_EVENT_COLUMNS} FROM account_change_event
           WHERE account_id = ?1 AND seq > ?2
           ORDER BY seq ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id, after], RawAccountEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccountEvent::into_event).collect()
  }

  async fn append(&self, event: &ChangeEvent<AccountPatch>) -> Result<()> {
    let raw = RawAccountEvent::encode(event);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO account_change_event ({ACCOUNT_EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
          ),
          rusqlite::params![
            raw.seq,
            raw.kind,
            raw.account_id,
            raw.name,
            raw.password_hash,
            raw.salt,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn purge(&self, id: i64) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM account_change_event WHERE account_id = ?1", [id])?;
        let rows = tx.execute("DELETE FROM account WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(rows > 0)
      })
      .await?;
    Ok(removed)
  }
}
