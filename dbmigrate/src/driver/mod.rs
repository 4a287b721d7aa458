//! Store drivers.
//!
//! A [Driver] owns one connection and knows how to record the schema version, run
//! migration scripts, and execute the few statements the root upsert needs.

use crate::dsn::Dsn;
use crate::error::Error;
use crate::sql::Statement;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Stored in place of a version when the state is "no version, but dirty".
pub(crate) const NIL_VERSION: i64 = -1;

/// The recorded schema version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionState {
    /// `None` when no version has ever been recorded.
    pub version: Option<u64>,
    /// Set while a migration script is running; still set if it failed.
    pub dirty: bool,
}

impl VersionState {
    pub fn clean(version: u64) -> Self {
        Self {
            version: Some(version),
            dirty: false,
        }
    }

    /// The version for reporting, with "never set" shown as 0.
    pub fn or_zero(&self) -> u64 {
        self.version.unwrap_or(0)
    }

    pub(crate) fn from_row(version: i64, dirty: bool) -> Self {
        Self {
            version: u64::try_from(version).ok(),
            dirty,
        }
    }

    pub(crate) fn to_row(version: Option<u64>) -> Result<i64, Error> {
        match version {
            Some(v) => i64::try_from(v)
                .map_err(|_| Error::Generic(format!("version {v} does not fit the version column"))),
            None => Ok(NIL_VERSION),
        }
    }
}

/// Operations the engine and the root upsert need from a store.
pub trait Driver {
    /// Create the version table if it does not exist.
    fn ensure_version_table(&mut self) -> Result<(), Error>;

    /// Take the advisory lock guarding concurrent runs.
    fn lock(&mut self) -> Result<(), Error>;

    fn unlock(&mut self) -> Result<(), Error>;

    fn version(&mut self) -> Result<VersionState, Error>;

    /// Replace the recorded version. `None` with `dirty = false` clears it.
    fn set_version(&mut self, version: Option<u64>, dirty: bool) -> Result<(), Error>;

    /// Execute a script that may contain several statements.
    fn run(&mut self, script: &str) -> Result<(), Error>;

    /// Whether the query returns at least one row.
    fn exists(&mut self, stmt: &Statement) -> Result<bool, Error>;

    fn execute(&mut self, stmt: &Statement) -> Result<(), Error>;

    /// Run `insert`, then the statement `reassign` builds from the generated row id,
    /// as one transaction. Returns the generated id.
    fn insert_and_reassign_id(
        &mut self,
        insert: &Statement,
        reassign: &dyn Fn(i64) -> Result<Statement, Error>,
    ) -> Result<i64, Error>;
}

/// Connect to the store behind `dsn` and make sure `version_table` exists.
pub fn open(dsn: &Dsn, version_table: &str) -> Result<Box<dyn Driver>, Error> {
    let mut driver = connect(dsn, version_table)?;
    driver.ensure_version_table()?;
    Ok(driver)
}

/// Connect without touching the version table, for callers that never read or record
/// versions.
pub fn connect(dsn: &Dsn, version_table: &str) -> Result<Box<dyn Driver>, Error> {
    crate::sql::validate_identifier(version_table)?;
    let driver: Box<dyn Driver> = match dsn {
        #[cfg(feature = "mysql")]
        Dsn::Mysql(url) => Box::new(mysql::MysqlDriver::open(url, version_table)?),
        #[cfg(feature = "sqlite")]
        Dsn::Sqlite(path) => Box::new(sqlite::SqliteDriver::open(path, version_table)?),
        #[cfg(feature = "sqlite")]
        Dsn::SqliteMemory => Box::new(sqlite::SqliteDriver::open_in_memory(version_table)?),
        #[allow(unreachable_patterns)]
        other => return Err(Error::UnsupportedDsn(other.redacted())),
    };
    tracing::debug!(dsn = %dsn.redacted(), table = version_table, "connected");
    Ok(driver)
}
