//! [`CatalogService`]: the catalog of logical databases and their files.
//!
//! Catalog state lives in the root file's store; every tenant additionally
//! owns a physical file named after it. Mutations write the catalog first
//! and then apply the file-side step under [`with_retry`]. There is no
//! transaction spanning both, so a file step that keeps failing leaves the
//! catalog ahead of the filesystem and surfaces [`Error::TransientFile`].

use std::{collections::BTreeSet, path::Path};

use tracing::{debug, info, warn};

use quay_core::{
  access::{Actor, Capability, authorize},
  account::{Account, AccountPatch, NewAccount, ROOT_ACCOUNT_ID},
  catalog::{CatalogEntry, EntryPatch, NewEntry, ROOT_ID, ROOT_NAME, is_root_lookup},
  entity::{Entity, EventStore},
  gate::{Gate, Validate},
  lookup::Lookup,
  variable::{ScalarValue, VERSION_VARIABLE},
};
use quay_store_sqlite::{DatabaseFile, RootDatabaseFile, SqliteStore};

use crate::{
  Error, Result,
  config::CatalogConfig,
  password::{generate_salt, hash_password, verify_password},
  retry::with_retry,
};

pub type EntryEntity<'s> = Entity<'s, CatalogEntry, SqliteStore>;
pub type AccountEntity<'s> = Entity<'s, Account, SqliteStore>;

/// Password the root account is bootstrapped with.
pub const ROOT_PASSWORD: &str = "admin";

pub struct CatalogService {
  config: CatalogConfig,
  root:   RootDatabaseFile,
  store:  SqliteStore,
}

impl CatalogService {
  /// Open the catalog in `config.data_dir`, bootstrapping it on first use.
  pub async fn open(config: CatalogConfig) -> Result<Self> {
    tokio::fs::create_dir_all(&config.data_dir)
      .await
      .map_err(quay_store_sqlite::Error::from)?;

    let mut root = RootDatabaseFile::new(&config.data_dir);
    root.load().await?;
    let store = root.store()?;
    let service = Self { config, root, store };
    service.init().await?;
    Ok(service)
  }

  pub fn config(&self) -> &CatalogConfig { &self.config }

  /// The catalog tables backing this service.
  pub fn store(&self) -> &SqliteStore { &self.store }

  /// Bootstrap the root entry and root account unless the root file is
  /// already flagged initialized. Each step is skipped if its row exists,
  /// and the flag is written last, so an interrupted bootstrap is simply
  /// redone.
  pub async fn init(&self) -> Result<CatalogEntry> {
    if self.root.is_init().await? {
      return self.load_entry(Lookup::Id(ROOT_ID)).await;
    }

    let root = match EventStore::<CatalogEntry>::find(&self.store, &Lookup::Id(ROOT_ID)).await? {
      Some(_) => self.load_entry(Lookup::Id(ROOT_ID)).await?,
      None => EntryEntity::create(&self.store, NewEntry::root()).await?.into_state(),
    };

    let account_lookup = Lookup::Id(ROOT_ACCOUNT_ID);
    if EventStore::<Account>::find(&self.store, &account_lookup).await?.is_none() {
      let salt = generate_salt();
      let password_hash = hash_password(ROOT_PASSWORD, &salt)?;
      AccountEntity::create(&self.store, NewAccount {
        name: ROOT_NAME.to_owned(),
        password_hash,
        salt,
      })
      .await?;
    }

    self.root.set_init().await?;
    info!(data_dir = %self.config.data_dir.display(), "bootstrapped catalog");
    Ok(root)
  }

  // ─── Catalog entries ───────────────────────────────────────────────────────

  /// Register a new logical database and create its file.
  ///
  /// The new entry's admins are the requested ones plus the actor plus every
  /// admin of the catalog root.
  pub async fn add(&self, actor: Actor, new: NewEntry) -> Result<CatalogEntry> {
    let root = self.load_entry(Lookup::Id(ROOT_ID)).await?;
    authorize(actor, &root, Capability::Admin)?;
    let new = Gate::new(new).into_valid()?;
    self.ensure_name_free(&new.name, None).await?;

    let mut file = DatabaseFile::tenant(&self.config.data_dir, new.name.as_str());
    let existed = file.exists().await?;
    let prepared = async {
      file.load().await?;
      file.set_variable(VERSION_VARIABLE, ScalarValue::Number(0.0)).await?;
      file.set_init().await
    }
    .await;
    file.close_with(prepared).await?;

    // Reread the root so admins granted meanwhile are carried over.
    let root = self.load_entry(Lookup::Id(ROOT_ID)).await?;
    let admins: BTreeSet<i64> = new
      .admins
      .iter()
      .copied()
      .chain([actor.id])
      .chain(root.admins.iter().copied())
      .collect();

    let name = new.name.clone();
    let entry = match EntryEntity::create(&self.store, NewEntry { admins, ..new }).await {
      Ok(entity) => entity.into_state(),
      Err(err) => {
        // Lost a race for the name; drop the file only if it is ours.
        if !existed {
          if let Err(cleanup) = self.delete_file(&name).await {
            warn!(name = %name, error = %cleanup, "could not remove file of failed add");
          }
        }
        return Err(err.into());
      }
    };
    info!(actor = actor.id, id = entry.id, name = %entry.name, "added catalog entry");
    Ok(entry)
  }

  /// Entry `1` comes back as a plain [`CatalogEntry`] with
  /// [`CatalogEntry::is_root`] set. Its restrictions live in `set`, `del` and
  /// [`RootDatabaseFile`] rather than in a separate type.
  pub async fn get(&self, actor: Actor, lookup: impl Into<Lookup>) -> Result<CatalogEntry> {
    let entry = self.load_entry(lookup.into()).await?;
    authorize(actor, &entry, Capability::Read)?;
    Ok(entry)
  }

  /// Every entry the actor may read, ordered by id.
  pub async fn get_all(&self, actor: Actor) -> Result<Vec<CatalogEntry>> {
    let rows = EventStore::<CatalogEntry>::list(&self.store).await?;
    let mut visible = Vec::with_capacity(rows.len());
    for row in rows {
      match self.get(actor, row.id).await {
        Ok(entry) => visible.push(entry),
        Err(Error::Forbidden { .. }) => continue,
        Err(e) => return Err(e),
      }
    }
    Ok(visible)
  }

  /// Change an entry's name or members. A rename also moves its file.
  pub async fn set(&self, actor: Actor, id: i64, patch: EntryPatch) -> Result<CatalogEntry> {
    if id == ROOT_ID {
      return Err(Error::Security(format!("the {ROOT_NAME:?} entry cannot be changed")));
    }
    if patch.name.as_deref() == Some(ROOT_NAME) {
      return Err(Error::Security(format!("no entry may be renamed to {ROOT_NAME:?}")));
    }
    patch.validate()?;

    let mut entity = EntryEntity::load(&self.store, Lookup::Id(id)).await?;
    authorize(actor, entity.state(), Capability::Admin)?;
    let previous = entity.state().name.clone();
    if let Some(name) = &patch.name {
      if *name != previous {
        self.ensure_name_free(name, Some(id)).await?;
      }
    }

    entity.change(patch).await?;
    let entry = entity.into_state();
    info!(actor = actor.id, id, name = %entry.name, "changed catalog entry");

    if entry.name != previous {
      self.rename_file(&previous, &entry.name).await?;
    }
    Ok(entry)
  }

  /// Remove an entry with its whole history, then its file.
  pub async fn del(&self, actor: Actor, lookup: impl Into<Lookup>) -> Result<()> {
    let lookup = lookup.into();
    if is_root_lookup(&lookup) {
      return Err(Error::Security(format!("the {ROOT_NAME:?} entry cannot be deleted")));
    }

    let entity = EntryEntity::load(&self.store, lookup).await?;
    authorize(actor, entity.state(), Capability::Admin)?;
    let CatalogEntry { id, name, .. } = entity.state().clone();
    entity.delete().await?;
    info!(actor = actor.id, id, name = %name, "deleted catalog entry");

    self.delete_file(&name).await
  }

  /// Release the root file. Closing twice is harmless.
  pub async fn close(&mut self) -> Result<()> {
    self.root.close().await?;
    debug!("closed catalog");
    Ok(())
  }

  // ─── Accounts ──────────────────────────────────────────────────────────────

  /// The account named `name`, if `password` matches its digest.
  pub async fn authenticate(&self, name: &str, password: &str) -> Result<Account> {
    let account = match AccountEntity::load(&self.store, Lookup::from(name)).await {
      Ok(entity) => entity.into_state(),
      Err(err) => {
        return match Error::from(err) {
          Error::NotFound(_) | Error::Validation(_) => Err(Error::Unauthenticated),
          other => Err(other),
        };
      }
    };
    if verify_password(password, &account.password_hash) {
      Ok(account)
    } else {
      Err(Error::Unauthenticated)
    }
  }

  pub async fn add_account(&self, actor: Actor, name: &str, password: &str) -> Result<Account> {
    let root = self.load_entry(Lookup::Id(ROOT_ID)).await?;
    authorize(actor, &root, Capability::Admin)?;

    let lookup = Lookup::from(name);
    if EventStore::<Account>::find(&self.store, &lookup).await?.is_some() {
      return Err(Error::Conflict(format!("account {name:?} already exists")));
    }

    let salt = generate_salt();
    let password_hash = hash_password(password, &salt)?;
    let account = AccountEntity::create(&self.store, NewAccount {
      name: name.to_owned(),
      password_hash,
      salt,
    })
    .await?
    .into_state();
    info!(actor = actor.id, id = account.id, name = %account.name, "added account");
    Ok(account)
  }

  pub async fn get_account(&self, actor: Actor, lookup: impl Into<Lookup>) -> Result<Account> {
    let account = AccountEntity::load(&self.store, lookup.into()).await?.into_state();
    self.authorize_account(actor, account.id).await?;
    Ok(account)
  }

  /// Replace an account's password under a fresh salt.
  pub async fn set_password(&self, actor: Actor, id: i64, password: &str) -> Result<Account> {
    self.authorize_account(actor, id).await?;
    let mut entity = AccountEntity::load(&self.store, Lookup::Id(id)).await?;

    let salt = generate_salt();
    let password_hash = hash_password(password, &salt)?;
    entity
      .change(AccountPatch {
        password_hash: Some(password_hash),
        salt: Some(salt),
        ..AccountPatch::default()
      })
      .await?;
    info!(actor = actor.id, id, "changed account password");
    Ok(entity.into_state())
  }

  // ─── Helpers ───────────────────────────────────────────────────────────────

  async fn load_entry(&self, lookup: Lookup) -> Result<CatalogEntry> {
    Ok(EntryEntity::load(&self.store, lookup).await?.into_state())
  }

  /// `except` is the entry being renamed, which may take back its own name.
  async fn ensure_name_free(&self, name: &str, except: Option<i64>) -> Result<()> {
    if self.store.entry_name_taken(name, except).await? {
      return Err(Error::Conflict(format!("catalog entry {name:?} already exists")));
    }
    Ok(())
  }

  /// Accounts may act on themselves; root admins may act on anyone.
  async fn authorize_account(&self, actor: Actor, account_id: i64) -> Result<()> {
    if actor.id == account_id {
      return Ok(());
    }
    let root = self.load_entry(Lookup::Id(ROOT_ID)).await?;
    Ok(authorize(actor, &root, Capability::Admin)?)
  }

  async fn rename_file(&self, from: &str, to: &str) -> Result<()> {
    let dir: &Path = &self.config.data_dir;
    with_retry(self.config.retry, "rename", move || async move {
      let mut file = DatabaseFile::tenant(dir, from);
      if !file.exists().await? {
        // A previous attempt got through.
        if DatabaseFile::tenant(dir, to).exists().await? {
          return Ok(());
        }
        return Err(quay_store_sqlite::Error::Io(std::io::Error::new(
          std::io::ErrorKind::NotFound,
          format!("{} does not exist", file.path().display()),
        )));
      }
      let outcome = async {
        file.load().await?;
        file.rename(to).await
      }
      .await;
      file.close_with(outcome).await
    })
    .await
  }

  async fn delete_file(&self, name: &str) -> Result<()> {
    let dir: &Path = &self.config.data_dir;
    with_retry(self.config.retry, "delete", move || async move {
      let mut file = DatabaseFile::tenant(dir, name);
      if !file.exists().await? {
        return Ok(());
      }
      let outcome = async {
        file.load().await?;
        file.delete().await
      }
      .await;
      file.close_with(outcome).await
    })
    .await
  }
}
