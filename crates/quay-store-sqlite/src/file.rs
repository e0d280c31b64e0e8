//! Physical database files: one SQLite file per logical database.
//!
//! A [`DatabaseFile`] is unopened until [`DatabaseFile::load`] runs, open
//! while it holds a connection, and closed again after
//! [`DatabaseFile::close`]. Renames and deletes only apply to files that
//! have been initialized for their schema.

use std::{
  io,
  path::{Path, PathBuf},
};

use rusqlite::OptionalExtension as _;
use tracing::debug;

use quay_core::{
  catalog::ROOT_NAME,
  lookup::validate_name,
  variable::{SchemaTag, ScalarValue, TYPE_VARIABLE},
};

use crate::{
  Error, Result,
  encode::{decode_value, encode_value},
  schema::{CATALOG, VARIABLES},
  store::SqliteStore,
};

/// File extension of every database file.
pub const EXTENSION: &str = "sqlite";

/// Schema a file is created with, and the tag that marks it initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manifest {
  Catalog,
  Tenant,
}

impl Manifest {
  fn ddl(self) -> &'static [&'static str] {
    match self {
      Self::Catalog => &[VARIABLES, CATALOG],
      Self::Tenant => &[VARIABLES],
    }
  }

  pub fn tag(self) -> SchemaTag {
    match self {
      Self::Catalog => SchemaTag::Catalog,
      Self::Tenant => SchemaTag::Tenant,
    }
  }
}

/// Path of the file backing database `name` inside `dir`.
pub fn database_path(dir: &Path, name: &str) -> PathBuf {
  dir.join(format!("{name}.{EXTENSION}"))
}

// ─── DatabaseFile ────────────────────────────────────────────────────────────

/// Handle on one `<dir>/<name>.sqlite` file.
///
/// Dropping an open handle releases its connection; use
/// [`DatabaseFile::close_with`] to observe close failures.
pub struct DatabaseFile {
  dir:      PathBuf,
  name:     String,
  manifest: Manifest,
  conn:     Option<tokio_rusqlite::Connection>,
}

impl DatabaseFile {
  pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, manifest: Manifest) -> Self {
    Self { dir: dir.into(), name: name.into(), manifest, conn: None }
  }

  pub fn tenant(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
    Self::new(dir, name, Manifest::Tenant)
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn path(&self) -> PathBuf { database_path(&self.dir, &self.name) }

  pub fn is_open(&self) -> bool { self.conn.is_some() }

  pub async fn exists(&self) -> Result<bool> {
    Ok(tokio::fs::try_exists(self.path()).await?)
  }

  /// Open the file, creating it if absent, and apply the manifest's schema.
  /// Loading an open handle does nothing.
  pub async fn load(&mut self) -> Result<()> {
    if self.conn.is_some() {
      return Ok(());
    }
    let path = self.path();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let ddl = self.manifest.ddl();
    conn
      .call(move |conn| {
        for script in ddl {
          conn.execute_batch(script)?;
        }
        Ok(())
      })
      .await?;
    debug!(path = %path.display(), manifest = ?self.manifest, "opened database file");
    self.conn = Some(conn);
    Ok(())
  }

  pub(crate) fn conn(&self) -> Result<&tokio_rusqlite::Connection> {
    self.conn.as_ref().ok_or_else(|| Error::NotOpen(self.name.clone()))
  }

  pub async fn variable(&self, name: &str) -> Result<Option<ScalarValue>> {
    let key = name.to_owned();
    let raw: Option<String> = self
      .conn()?
      .call(move |conn| {
        Ok(
          conn
            .query_row("SELECT value FROM scalar_variable WHERE name = ?1", [key], |row| {
              row.get(0)
            })
            .optional()?,
        )
      })
      .await?;
    raw.as_deref().map(decode_value).transpose()
  }

  pub async fn set_variable(&self, name: &str, value: ScalarValue) -> Result<()> {
    let key = name.to_owned();
    let encoded = encode_value(&value)?;
    self
      .conn()?
      .call(move |conn| {
        conn.execute(
          "INSERT INTO scalar_variable (name, value) VALUES (?1, ?2)
           ON CONFLICT(name) DO UPDATE SET value = excluded.value",
          rusqlite::params![key, encoded],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Whether the `type` variable marks this file as initialized for its
  /// manifest. A file tagged for another schema is an error.
  pub async fn is_init(&self) -> Result<bool> {
    let expected = self.manifest.tag();
    match self.variable(TYPE_VARIABLE).await? {
      None => Ok(false),
      Some(ScalarValue::Text(tag)) if tag == expected.to_string() => Ok(true),
      Some(found) => Err(Error::SchemaMismatch {
        name:     self.name.clone(),
        expected: expected.to_string(),
        found:    found.to_string(),
      }),
    }
  }

  pub async fn set_init(&self) -> Result<()> {
    self.set_variable(TYPE_VARIABLE, self.manifest.tag().into()).await
  }

  async fn require_init(&self) -> Result<()> {
    if self.is_open() && self.is_init().await? {
      Ok(())
    } else {
      Err(Error::Uninitialized(self.name.clone()))
    }
  }

  /// Move the file to `<dir>/<new_name>.sqlite` and reopen it there.
  /// Renaming to the current name does nothing; an existing target is never
  /// overwritten.
  pub async fn rename(&mut self, new_name: &str) -> Result<()> {
    if new_name == self.name {
      return Ok(());
    }
    validate_name(new_name)?;
    self.require_init().await?;

    let from = self.path();
    let to = database_path(&self.dir, new_name);
    if tokio::fs::try_exists(&to).await? {
      return Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{} already exists", to.display()),
      )));
    }

    self.close().await?;
    if let Err(e) = tokio::fs::rename(&from, &to).await {
      self.load().await?;
      return Err(e.into());
    }
    debug!(from = %from.display(), to = %to.display(), "renamed database file");
    self.name = new_name.to_owned();
    self.load().await
  }

  /// Close the connection and remove the file.
  pub async fn delete(&mut self) -> Result<()> {
    self.require_init().await?;
    self.close().await?;
    let path = self.path();
    tokio::fs::remove_file(&path).await?;
    debug!(path = %path.display(), "deleted database file");
    Ok(())
  }

  /// Release the connection. Closing a closed handle is a no-op.
  pub async fn close(&mut self) -> Result<()> {
    let Some(conn) = self.conn.take() else {
      return Ok(());
    };
    match conn.close().await {
      Ok(()) | Err(tokio_rusqlite::Error::ConnectionClosed) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  /// Close the handle after an operation, reporting the operation's error
  /// ahead of any close failure.
  pub async fn close_with<T>(mut self, outcome: Result<T>) -> Result<T> {
    let closed = self.close().await;
    let value = outcome?;
    closed?;
    Ok(value)
  }
}

impl Drop for DatabaseFile {
  fn drop(&mut self) {
    if self.conn.is_some() {
      debug!(name = %self.name, "releasing database file on drop");
    }
  }
}

// ─── RootDatabaseFile ────────────────────────────────────────────────────────

/// The catalog root file, `<dir>/admin.sqlite`. It can be neither renamed
/// nor deleted.
pub struct RootDatabaseFile {
  inner: DatabaseFile,
}

impl RootDatabaseFile {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { inner: DatabaseFile::new(dir, ROOT_NAME, Manifest::Catalog) }
  }

  pub fn path(&self) -> PathBuf { self.inner.path() }

  pub fn is_open(&self) -> bool { self.inner.is_open() }

  pub async fn load(&mut self) -> Result<()> { self.inner.load().await }

  pub async fn is_init(&self) -> Result<bool> { self.inner.is_init().await }

  pub async fn set_init(&self) -> Result<()> { self.inner.set_init().await }

  pub async fn variable(&self, name: &str) -> Result<Option<ScalarValue>> {
    self.inner.variable(name).await
  }

  /// The catalog tables on this file's connection.
  pub fn store(&self) -> Result<SqliteStore> {
    Ok(SqliteStore::from_connection(self.inner.conn()?.clone()))
  }

  pub async fn rename(&mut self, _new_name: &str) -> Result<()> {
    Err(Error::Security(format!("the {ROOT_NAME:?} database cannot be renamed")))
  }

  pub async fn delete(&mut self) -> Result<()> {
    Err(Error::Security(format!("the {ROOT_NAME:?} database cannot be deleted")))
  }

  pub async fn close(&mut self) -> Result<()> { self.inner.close().await }
}
