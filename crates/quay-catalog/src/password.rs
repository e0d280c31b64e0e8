//! Argon2 password digests.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand_core::OsRng;

use crate::Result;

/// A fresh random salt in its B64 form.
pub fn generate_salt() -> String { SaltString::generate(&mut OsRng).as_str().to_owned() }

/// PHC string for `password` hashed with `salt`.
pub fn hash_password(password: &str, salt: &str) -> Result<String> {
  let salt = SaltString::from_b64(salt)?;
  Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

pub fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
    .is_ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_then_verify() {
    let salt = generate_salt();
    let phc = hash_password("hunter2", &salt).unwrap();
    assert!(phc.starts_with("$argon2"));
    assert!(phc.contains(&salt));
    assert!(verify_password("hunter2", &phc));
    assert!(!verify_password("hunter3", &phc));
  }

  #[test]
  fn salts_are_unique() {
    assert_ne!(generate_salt(), generate_salt());
  }

  #[test]
  fn garbage_digest_never_verifies() {
    assert!(!verify_password("anything", "not-a-phc-string"));
    assert!(hash_password("pw", "").is_err());
  }
}
