//! End-to-end tests for `CatalogService` against on-disk catalogs.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
  time::{Duration, Instant, SystemTime},
};

use quay_core::{
  access::Actor,
  account::{Account, ROOT_ACCOUNT_ID},
  catalog::{CatalogEntry, EntryPatch, NewEntry, ROOT_ID},
  entity::EventStore,
  variable::{ScalarValue, SchemaTag, TYPE_VARIABLE, VERSION_VARIABLE},
};
use quay_store_sqlite::DatabaseFile;

use crate::{CatalogConfig, CatalogService, Error, RetryPolicy};

const ADMIN: Actor = Actor { id: 1 };

fn config(dir: &Path) -> CatalogConfig {
  CatalogConfig {
    data_dir: dir.to_path_buf(),
    retry:    RetryPolicy { attempts: 3, min_delay_ms: 20 },
  }
}

async fn open(dir: &Path) -> CatalogService {
  CatalogService::open(config(dir)).await.expect("open catalog")
}

fn ids(list: &[i64]) -> BTreeSet<i64> { list.iter().copied().collect() }

fn db_file(dir: &Path, name: &str) -> std::path::PathBuf { dir.join(format!("{name}.sqlite")) }

/// Tenant files in `dir` with their size and modification time.
fn tenant_files(dir: &Path) -> BTreeMap<String, (u64, SystemTime)> {
  std::fs::read_dir(dir)
    .unwrap()
    .map(|entry| entry.unwrap())
    .filter(|entry| entry.file_name() != "admin.sqlite")
    .map(|entry| {
      let meta = entry.metadata().unwrap();
      let name = entry.file_name().to_string_lossy().into_owned();
      (name, (meta.len(), meta.modified().unwrap()))
    })
    .collect()
}

async fn entry_events(service: &CatalogService, id: i64) -> usize {
  EventStore::<CatalogEntry>::events_after(service.store(), id, 0)
    .await
    .unwrap()
    .len()
}

/// A second account, readable as actor 2.
async fn with_reader(service: &CatalogService) -> Actor {
  let account = service.add_account(ADMIN, "reader", "letmein").await.unwrap();
  Actor::from(&account)
}

// ─── Bootstrap ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_then_add_tenant() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;

  let root = service.get(ADMIN, ROOT_ID).await.unwrap();
  assert_eq!(root.id, 1);
  assert_eq!(root.name, "admin");
  assert_eq!(root.admins, ids(&[1]));
  assert!(root.is_root());

  let account = service.get_account(ADMIN, ROOT_ACCOUNT_ID).await.unwrap();
  assert_eq!(account.name, "admin");

  let tenant = service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap();
  assert_eq!(tenant.id, 2);
  assert_eq!(tenant.name, "tenant1");
  assert_eq!(tenant.admins, ids(&[1]));
  assert!(tenant.readers.is_empty());
  assert!(tenant.writers.is_empty());

  let mut file = DatabaseFile::tenant(dir.path(), "tenant1");
  file.load().await.unwrap();
  assert!(file.is_init().await.unwrap());
  assert_eq!(
    file.variable(TYPE_VARIABLE).await.unwrap(),
    Some(ScalarValue::from(SchemaTag::Tenant))
  );
  assert_eq!(
    file.variable(VERSION_VARIABLE).await.unwrap(),
    Some(ScalarValue::Number(0.0))
  );
  file.close().await.unwrap();
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let mut service = open(dir.path()).await;
  let first_root = service.init().await.unwrap();
  let first_account: Account = service.get_account(ADMIN, ROOT_ACCOUNT_ID).await.unwrap();
  let again = service.init().await.unwrap();
  assert_eq!(again, first_root);
  assert_eq!(entry_events(&service, 1).await, 1);
  service.close().await.unwrap();

  let reopened = open(dir.path()).await;
  assert_eq!(reopened.init().await.unwrap(), first_root);
  let account = reopened.get_account(ADMIN, ROOT_ACCOUNT_ID).await.unwrap();
  assert_eq!(account, first_account);
  assert_eq!(entry_events(&reopened, 1).await, 1);
  assert_eq!(reopened.get_all(ADMIN).await.unwrap().len(), 1);
}

#[tokio::test]
async fn close_is_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let mut service = open(dir.path()).await;
  service.close().await.unwrap();
  service.close().await.unwrap();
}

// ─── Entries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_add_is_conflict() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap();
  let files = tenant_files(dir.path());
  assert_eq!(files.keys().collect::<Vec<_>>(), vec!["tenant1.sqlite"]);

  let err = service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)), "{err:?}");
  let err = service.add(ADMIN, NewEntry::named("admin")).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)), "{err:?}");

  assert_eq!(service.get_all(ADMIN).await.unwrap().len(), 2);
  assert_eq!(tenant_files(dir.path()), files);
}

#[tokio::test]
async fn renamed_away_name_stays_reserved() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let alpha = service.add(ADMIN, NewEntry::named("alpha")).await.unwrap();
  service.set(ADMIN, alpha.id, EntryPatch::rename("beta")).await.unwrap();
  let files = tenant_files(dir.path());

  // The row still holds its first name, so a new entry cannot take it.
  let err = service.add(ADMIN, NewEntry::named("alpha")).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)), "{err:?}");
  assert!(!db_file(dir.path(), "alpha").exists());
  assert_eq!(tenant_files(dir.path()), files);

  let other = service.add(ADMIN, NewEntry::named("gamma")).await.unwrap();
  let err = service.set(ADMIN, other.id, EntryPatch::rename("alpha")).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)), "{err:?}");
  assert_eq!(entry_events(&service, other.id).await, 1);

  let names = service
    .get_all(ADMIN)
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.name)
    .collect::<Vec<_>>();
  assert_eq!(names, vec!["admin", "beta", "gamma"]);

  // The owner may take it back.
  let restored = service.set(ADMIN, alpha.id, EntryPatch::rename("alpha")).await.unwrap();
  assert_eq!(restored.name, "alpha");
  assert!(db_file(dir.path(), "alpha").exists());
  assert!(!db_file(dir.path(), "beta").exists());
}

#[tokio::test]
async fn invalid_name_creates_nothing() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;

  let err = service.add(ADMIN, NewEntry::named("../outside")).await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)), "{err:?}");
  assert_eq!(service.get_all(ADMIN).await.unwrap().len(), 1);
  assert!(!dir.path().parent().unwrap().join("outside.sqlite").exists());
}

#[tokio::test]
async fn add_merges_requested_actor_and_root_admins() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let reader = with_reader(&service).await;

  let new = NewEntry {
    admins: ids(&[reader.id]),
    readers: ids(&[reader.id]),
    ..NewEntry::named("shared")
  };
  let entry = service.add(ADMIN, new).await.unwrap();
  assert_eq!(entry.admins, ids(&[1, reader.id]));
  assert_eq!(entry.readers, ids(&[reader.id]));
}

#[tokio::test]
async fn rename_moves_file() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let tenant = service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap();

  let renamed = service
    .set(ADMIN, tenant.id, EntryPatch::rename("tenant-one"))
    .await
    .unwrap();
  assert_eq!(renamed.name, "tenant-one");
  assert!(!db_file(dir.path(), "tenant1").exists());
  assert!(db_file(dir.path(), "tenant-one").exists());

  let fetched = service.get(ADMIN, "tenant-one").await.unwrap();
  assert_eq!(fetched, renamed);
  let err = service.get(ADMIN, "tenant1").await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn set_members_leaves_file_alone() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let tenant = service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap();

  let patch = EntryPatch { writers: Some(ids(&[9])), ..EntryPatch::default() };
  let updated = service.set(ADMIN, tenant.id, patch).await.unwrap();
  assert_eq!(updated.writers, ids(&[9]));
  assert_eq!(updated.name, "tenant1");
  assert!(db_file(dir.path(), "tenant1").exists());
  assert_eq!(service.get(ADMIN, tenant.id).await.unwrap(), updated);
}

#[tokio::test]
async fn rename_onto_taken_name_is_conflict() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let one = service.add(ADMIN, NewEntry::named("one")).await.unwrap();
  service.add(ADMIN, NewEntry::named("two")).await.unwrap();

  let err = service.set(ADMIN, one.id, EntryPatch::rename("two")).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)), "{err:?}");
  assert_eq!(entry_events(&service, one.id).await, 1);
}

#[tokio::test]
async fn delete_is_final() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let tenant = service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap();
  service.set(ADMIN, tenant.id, EntryPatch::rename("tenant-x")).await.unwrap();

  service.del(ADMIN, "tenant-x").await.unwrap();

  let err = service.get(ADMIN, tenant.id).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)), "{err:?}");
  assert_eq!(entry_events(&service, tenant.id).await, 0);
  assert!(!db_file(dir.path(), "tenant-x").exists());

  let err = service.del(ADMIN, tenant.id).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)), "{err:?}");
}

// ─── Authorization ───────────────────────────────────────────────────────────

#[tokio::test]
async fn readers_read_and_admins_administer() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let reader = with_reader(&service).await;
  let tenant = service
    .add(ADMIN, NewEntry { readers: ids(&[reader.id]), ..NewEntry::named("tenant1") })
    .await
    .unwrap();

  assert_eq!(service.get(reader, tenant.id).await.unwrap().name, "tenant1");

  let forbidden = |err: Error| matches!(err, Error::Forbidden { actor, .. } if actor == reader.id);
  assert!(forbidden(service.add(reader, NewEntry::named("mine")).await.unwrap_err()));
  assert!(forbidden(
    service
      .set(reader, tenant.id, EntryPatch::rename("hijacked"))
      .await
      .unwrap_err()
  ));
  assert!(forbidden(service.del(reader, tenant.id).await.unwrap_err()));
  assert!(db_file(dir.path(), "tenant1").exists());

  // The admin can do all four.
  service.get(ADMIN, tenant.id).await.unwrap();
  let other = service.add(ADMIN, NewEntry::named("other")).await.unwrap();
  service.set(ADMIN, other.id, EntryPatch::rename("other2")).await.unwrap();
  service.del(ADMIN, other.id).await.unwrap();
}

#[tokio::test]
async fn get_all_skips_unreadable_entries() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let reader = with_reader(&service).await;
  service
    .add(ADMIN, NewEntry { readers: ids(&[reader.id]), ..NewEntry::named("visible") })
    .await
    .unwrap();
  service.add(ADMIN, NewEntry::named("hidden")).await.unwrap();

  let names = |entries: Vec<CatalogEntry>| entries.into_iter().map(|e| e.name).collect::<Vec<_>>();
  assert_eq!(names(service.get_all(reader).await.unwrap()), vec!["visible"]);
  assert_eq!(
    names(service.get_all(ADMIN).await.unwrap()),
    vec!["admin", "visible", "hidden"]
  );
}

#[tokio::test]
async fn root_is_protected_before_store_access() {
  let dir = tempfile::tempdir().unwrap();
  let mut service = open(dir.path()).await;
  let tenant = service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap();

  // With the root file closed any store access would fail, so a Security
  // error proves the check ran first.
  service.close().await.unwrap();

  let security = |err: Error| matches!(err, Error::Security(_));
  assert!(security(service.set(ADMIN, 1, EntryPatch::rename("root")).await.unwrap_err()));
  assert!(security(
    service
      .set(ADMIN, tenant.id, EntryPatch::rename("admin"))
      .await
      .unwrap_err()
  ));
  assert!(security(service.del(ADMIN, ROOT_ID).await.unwrap_err()));
  assert!(security(service.del(ADMIN, "admin").await.unwrap_err()));

  let err = service.get(ADMIN, ROOT_ID).await.unwrap_err();
  assert!(matches!(err, Error::Store(_)), "{err:?}");
}

// ─── Retry ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_rename_is_retried_then_surfaced() {
  let dir = tempfile::tempdir().unwrap();
  let config = CatalogConfig {
    data_dir: dir.path().to_path_buf(),
    retry:    RetryPolicy { attempts: 3, min_delay_ms: 50 },
  };
  let service = CatalogService::open(config).await.unwrap();
  let tenant = service.add(ADMIN, NewEntry::named("tenant1")).await.unwrap();

  // A stray file the catalog knows nothing about blocks the move.
  std::fs::write(db_file(dir.path(), "tenant2"), b"stray").unwrap();

  let started = Instant::now();
  let err = service
    .set(ADMIN, tenant.id, EntryPatch::rename("tenant2"))
    .await
    .unwrap_err();
  assert!(started.elapsed() >= Duration::from_millis(100));
  assert!(
    matches!(err, Error::TransientFile { operation: "rename", attempts: 3, .. }),
    "{err:?}"
  );

  // The catalog change is already durable; the file stayed put.
  assert_eq!(service.get(ADMIN, tenant.id).await.unwrap().name, "tenant2");
  assert!(db_file(dir.path(), "tenant1").exists());
  assert_eq!(std::fs::read(db_file(dir.path(), "tenant2")).unwrap(), b"stray");
}

// ─── Accounts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_account_authenticates() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;

  let account = service.authenticate("admin", "admin").await.unwrap();
  assert_eq!(account.id, 1);

  for (name, password) in [("admin", "wrong"), ("nobody", "admin"), ("bad name", "x")] {
    let err = service.authenticate(name, password).await.unwrap_err();
    assert!(matches!(err, Error::Unauthenticated), "{name}: {err:?}");
  }
}

#[tokio::test]
async fn account_management() {
  let dir = tempfile::tempdir().unwrap();
  let service = open(dir.path()).await;
  let reader = with_reader(&service).await;
  assert_eq!(reader.id, 2);

  let err = service.add_account(ADMIN, "reader", "again").await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)), "{err:?}");
  let err = service.add_account(reader, "sneaky", "pw").await.unwrap_err();
  assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");

  // Self-service, but not on others.
  service.get_account(reader, reader.id).await.unwrap();
  let err = service.get_account(reader, ROOT_ACCOUNT_ID).await.unwrap_err();
  assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");
  let err = service.set_password(reader, 1, "owned").await.unwrap_err();
  assert!(matches!(err, Error::Forbidden { .. }), "{err:?}");

  let before = service.get_account(ADMIN, "reader").await.unwrap();
  let after = service.set_password(reader, reader.id, "n3w").await.unwrap();
  assert_ne!(after.salt, before.salt);
  assert!(after.version > before.version);

  let err = service.authenticate("reader", "letmein").await.unwrap_err();
  assert!(matches!(err, Error::Unauthenticated));
  assert_eq!(service.authenticate("reader", "n3w").await.unwrap().id, reader.id);

  // Root admins may reset anyone's password.
  service.set_password(ADMIN, reader.id, "reset").await.unwrap();
  service.authenticate("reader", "reset").await.unwrap();
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[test]
fn config_defaults_and_file_overrides() {
  let dir = tempfile::tempdir().unwrap();

  let missing = CatalogConfig::load(dir.path().join("absent.toml")).unwrap();
  assert_eq!(missing, CatalogConfig::default());
  assert_eq!(missing.retry.min_delay(), Duration::from_millis(200));

  let path = dir.path().join("quay.toml");
  std::fs::write(&path, "data_dir = \"/srv/quay\"\n\n[retry]\nattempts = 2\n").unwrap();
  let loaded = CatalogConfig::load(&path).unwrap();
  assert_eq!(loaded.data_dir, Path::new("/srv/quay"));
  assert_eq!(loaded.retry, RetryPolicy { attempts: 2, min_delay_ms: 200 });
}
