//! Multi-tenant database catalog.
//!
//! [`CatalogService`] keeps a catalog of logical databases, each backed by
//! its own SQLite file in the data directory, plus the accounts that may
//! read or administer them. The catalog itself lives in `admin.sqlite`.
//!
//! ```no_run
//! # async fn demo() -> quay_catalog::Result<()> {
//! use quay_catalog::{CatalogConfig, CatalogService};
//! use quay_core::{access::Actor, catalog::NewEntry};
//!
//! let mut catalog = CatalogService::open(CatalogConfig::with_data_dir("data")).await?;
//! let admin = Actor::new(1);
//! let entry = catalog.add(admin, NewEntry::named("tenant1")).await?;
//! assert_eq!(entry.name, "tenant1");
//! catalog.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod password;
pub mod retry;
pub mod service;

pub use config::{CatalogConfig, RetryPolicy};
pub use error::{Error, Result};
pub use service::CatalogService;

#[cfg(test)]
mod tests;
