//! # dbmigrate
//!
//! `dbmigrate` applies directories of plain SQL migrations to MySQL or SQLite, records
//! the schema version in the database, and seeds a privileged "root" row from
//! configuration.
//!
//! Migrations are pairs of files named `<version>_<name>.up.sql` and
//! `<version>_<name>.down.sql`, usually stamped with the Unix time they were created at
//! (see [scaffold::create_now]).
//!
//! ## Example
//!
//! ```
//! use dbmigrate::{Migrate, VersionState};
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(
//!     dir.path().join("1700000000_create_users.up.sql"),
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);",
//! )
//! .unwrap();
//! std::fs::write(
//!     dir.path().join("1700000000_create_users.down.sql"),
//!     "DROP TABLE users;",
//! )
//! .unwrap();
//!
//! let mut migrate = Migrate::open(dir.path(), "sqlite::memory:", "schema_migrations").unwrap();
//! migrate.up().unwrap();
//! assert_eq!(migrate.current_version().unwrap(), VersionState::clean(1700000000));
//!
//! // nothing left to apply
//! assert!(migrate.up().unwrap_err().is_no_change());
//!
//! // version 0 reverts everything
//! migrate.migrate(0).unwrap();
//! assert_eq!(migrate.current_version().unwrap().version, None);
//! ```
//!
//! ## Tracing
//!
//! Every applied step is logged through [tracing](https://docs.rs/tracing) inside a
//! `migration` span carrying the direction, version and name.
//!
//! ```no_run
//! let subscriber = tracing_subscriber::fmt()
//!     .with_max_level(tracing::Level::DEBUG)
//!     .finish();
//! tracing::subscriber::set_global_default(subscriber).unwrap();
//! ```

pub mod config;
pub mod driver;
pub mod dsn;
mod error;
pub mod migrate;
pub mod report;
pub mod root;
pub mod scaffold;
pub mod source;
pub mod sql;

#[cfg(all(test, feature = "mysql"))]
pub(crate) mod test_mysql;
#[cfg(all(test, feature = "sqlite"))]
pub(crate) mod test_sqlite;

pub use config::{Config, RootConfig, RootValue};
pub use driver::{Driver, VersionState};
pub use dsn::Dsn;
pub use error::Error;
pub use migrate::Migrate;
pub use report::{run_reported, Command, VersionChange};
pub use root::RootOutcome;
pub use source::{Direction, Migration, Source};
