//! Service configuration.
//!
//! Values come from an optional TOML file, overridden by `QUAY_*`
//! environment variables. Nested keys use a double underscore, e.g.
//! `QUAY_RETRY__ATTEMPTS=3`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;

use crate::Result;

/// Bounded retry for file-side steps that follow a recorded catalog change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total tries, including the first.
  pub attempts:     u32,
  /// Pause between consecutive tries.
  pub min_delay_ms: u64,
}

impl RetryPolicy {
  pub fn min_delay(&self) -> Duration { Duration::from_millis(self.min_delay_ms) }
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { attempts: 5, min_delay_ms: 200 } }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
  /// Directory holding `admin.sqlite` and every tenant file.
  pub data_dir: PathBuf,
  pub retry:    RetryPolicy,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self { data_dir: PathBuf::from("data"), retry: RetryPolicy::default() }
  }
}

impl CatalogConfig {
  pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
    Self { data_dir: data_dir.into(), ..Self::default() }
  }

  /// Read `path` if it exists, then apply `QUAY_*` overrides.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.as_ref()).required(false))
      .add_source(
        config::Environment::with_prefix("QUAY")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?;
    Ok(settings.try_deserialize()?)
  }
}
