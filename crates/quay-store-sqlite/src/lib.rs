//! SQLite backend for the Quay catalog.
//!
//! Every logical database is one SQLite file in the data directory. The
//! catalog root file (`admin.sqlite`) additionally carries the catalog and
//! account tables served by [`SqliteStore`]. All database access goes
//! through [`tokio_rusqlite`] so it runs on a dedicated thread without
//! blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;
pub mod file;

pub use error::{Error, Result};
pub use file::{DatabaseFile, Manifest, RootDatabaseFile};
pub use store::SqliteStore;
