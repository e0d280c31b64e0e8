//! Accounts: the actors catalog permissions refer to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  entity::{Aggregate, Folded},
  event::{ChangeEvent, EventKind},
  gate::Validate,
  lookup::{validate_id, validate_name},
};

/// Id of the bootstrap account.
pub const ROOT_ACCOUNT_ID: i64 = 1;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
  pub id:            i64,
  pub name:          String,
  /// PHC-formatted password digest.
  pub password_hash: String,
  pub salt:          String,
  pub version:       i64,
}

// Keep digests out of logs.
impl fmt::Debug for Account {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Account")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("version", &self.version)
      .finish_non_exhaustive()
  }
}

fn validate_credentials(password_hash: &str, salt: &str) -> Result<()> {
  if password_hash.is_empty() {
    return Err(Error::Validation("password hash must not be empty".into()));
  }
  if salt.is_empty() {
    return Err(Error::Validation("salt must not be empty".into()));
  }
  Ok(())
}

impl Validate for Account {
  fn validate(&self) -> Result<()> {
    validate_id(self.id)?;
    validate_name(&self.name)?;
    validate_credentials(&self.password_hash, &self.salt)
  }
}

#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
  pub name:          String,
  pub password_hash: String,
  pub salt:          String,
}

impl Validate for NewAccount {
  fn validate(&self) -> Result<()> {
    validate_name(&self.name)?;
    validate_credentials(&self.password_hash, &self.salt)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password_hash: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub salt:          Option<String>,
}

impl Validate for AccountPatch {
  fn validate(&self) -> Result<()> {
    if let Some(name) = &self.name {
      validate_name(name)?;
    }
    // A new digest is meaningless without the salt it was made with.
    match (&self.password_hash, &self.salt) {
      (Some(hash), Some(salt)) => validate_credentials(hash, salt),
      (None, None) => Ok(()),
      _ => Err(Error::Validation("password hash and salt must change together".into())),
    }
  }
}

impl Aggregate for Account {
  type New = NewAccount;
  type Patch = AccountPatch;

  const KIND: &'static str = "account";

  fn id(&self) -> i64 { self.id }

  fn name(&self) -> &str { &self.name }

  fn version(&self) -> i64 { self.version }

  fn birth_patch(&self) -> AccountPatch {
    AccountPatch {
      name:          Some(self.name.clone()),
      password_hash: Some(self.password_hash.clone()),
      salt:          Some(self.salt.clone()),
    }
  }

  /// Only `set` deltas change an account; `add` and `delete` records are
  /// lifecycle markers and merely advance the watermark.
  fn apply(self, event: &ChangeEvent<AccountPatch>) -> Folded<Self> {
    let version = self.version.max(event.seq);
    if event.kind != EventKind::Set {
      return Folded::Live(Self { version, ..self });
    }
    let patch = &event.patch;
    Folded::Live(Self {
      id: self.id,
      name: patch.name.clone().unwrap_or(self.name),
      password_hash: patch.password_hash.clone().unwrap_or(self.password_hash),
      salt: patch.salt.clone().unwrap_or(self.salt),
      version,
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

  fn alice() -> Account {
    Account {
      id:            4,
      name:          "alice".into(),
      password_hash: "$argon2id$first".into(),
      salt:          "c2FsdHNhbHQ".into(),
      version:       0,
    }
  }

  #[test]
  fn only_set_events_change_state() {
    let events = vec![
      ChangeEvent::add(2, 4, AccountPatch { name: Some("ignored".into()), ..AccountPatch::default() }),
      ChangeEvent::set(3, 4, AccountPatch {
        password_hash: Some("$argon2id$second".into()),
        salt:          Some("bmV3c2FsdA".into()),
        ..AccountPatch::default()
      }),
      ChangeEvent::delete(4, 4),
    ];

    let Folded::Live(account) = replay(alice(), &events) else {
      panic!("accounts are never folded away");
    };
    assert_eq!(account.name, "alice");
    assert_eq!(account.password_hash, "$argon2id$second");
    assert_eq!(account.salt, "bmV3c2FsdA");
    assert_eq!(account.version, 4);
  }

  #[test]
  fn hash_and_salt_change_together() {
    let half = AccountPatch { password_hash: Some("$x".into()), ..AccountPatch::default() };
    assert!(matches!(half.validate(), Err(Error::Validation(_))));
    assert!(AccountPatch::default().validate().is_ok());
  }

  #[test]
  fn debug_hides_digest() {
    let rendered = format!("{:?}", alice());
    assert!(rendered.contains("alice"));
    assert!(!rendered.contains("argon2"));
  }
}
