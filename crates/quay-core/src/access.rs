//! Capability checks for catalog entries.
//!
//! Membership in an entry's `readers` or `writers` grants read access;
//! membership in `admins` grants admin access, which implies read.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, account::Account, catalog::CatalogEntry};

/// The account on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
  pub id: i64,
}

impl Actor {
  pub fn new(id: i64) -> Self { Self { id } }
}

impl From<&Account> for Actor {
  fn from(account: &Account) -> Self { Self { id: account.id } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Capability {
  Read,
  Admin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
  pub can_read:  bool,
  pub can_admin: bool,
}

impl Capabilities {
  pub fn allows(self, capability: Capability) -> bool {
    match capability {
      Capability::Read => self.can_read,
      Capability::Admin => self.can_admin,
    }
  }
}

pub fn capabilities(actor: Actor, target: &CatalogEntry) -> Capabilities {
  let can_admin = target.admins.contains(&actor.id);
  let can_read =
    can_admin || target.readers.contains(&actor.id) || target.writers.contains(&actor.id);
  Capabilities { can_read, can_admin }
}

/// Fail with [`Error::Forbidden`] unless `actor` holds `capability` on
/// `target`.
pub fn authorize(actor: Actor, target: &CatalogEntry, capability: Capability) -> Result<()> {
  if capabilities(actor, target).allows(capability) {
    Ok(())
  } else {
    Err(Error::Forbidden { capability, actor: actor.id, target: target.id })
  }
}
