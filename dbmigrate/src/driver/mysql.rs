//!
//! # MySQL driver
//!
//! Note that DDL statements in MySQL commit implicitly, so a failing script can leave
//! part of its changes applied. The version row stays dirty in that case and has to be
//! repaired with `force`.
//!

use mysql::prelude::*;
use mysql::{Conn, Opts, Params, TxOpts};
use sha2::{Digest, Sha256};

use super::{Driver, VersionState};
use crate::error::Error;
use crate::sql::{Statement, Value};

/// Seconds to wait for the advisory lock.
const LOCK_TIMEOUT_SECS: u32 = 10;

impl From<&Value> for mysql::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Text(s) => mysql::Value::from(s.as_str()),
            Value::Integer(i) => mysql::Value::Int(*i),
            Value::Float(f) => mysql::Value::Double(*f),
            Value::Boolean(b) => mysql::Value::Int(i64::from(*b)),
        }
    }
}

fn params(stmt: &Statement) -> Params {
    if stmt.params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(stmt.params.iter().map(mysql::Value::from).collect())
    }
}

pub struct MysqlDriver {
    conn: Conn,
    version_table: String,
    lock_name: Option<String>,
}

impl std::fmt::Debug for MysqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlDriver")
            .field("connection_id", &self.conn.connection_id())
            .field("version_table", &self.version_table)
            .field("lock_name", &self.lock_name)
            .finish()
    }
}

impl MysqlDriver {
    pub fn open(url: &str, version_table: &str) -> Result<Self, Error> {
        let opts = Opts::from_url(url).map_err(|e| Error::Mysql(e.to_string()))?;
        Ok(Self::from_connection(Conn::new(opts)?, version_table))
    }

    pub fn from_connection(conn: Conn, version_table: &str) -> Self {
        Self {
            conn,
            version_table: version_table.to_string(),
            lock_name: None,
        }
    }

    pub fn connection(&mut self) -> &mut Conn {
        &mut self.conn
    }

    /// Lock names are capped at 64 characters, so the database and table are hashed.
    fn advisory_lock_name(&mut self) -> Result<String, Error> {
        let database: Option<Option<String>> = self.conn.query_first("SELECT DATABASE()")?;
        let database = database.flatten().unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(database.as_bytes());
        hasher.update(b"|");
        hasher.update(self.version_table.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Ok(format!("dbmigrate-{}", &digest[..32]))
    }
}

impl Driver for MysqlDriver {
    fn ensure_version_table(&mut self) -> Result<(), Error> {
        self.conn.query_drop(format!(
            "CREATE TABLE IF NOT EXISTS `{}` (
                version BIGINT NOT NULL PRIMARY KEY,
                dirty BOOLEAN NOT NULL
            )",
            self.version_table
        ))?;
        Ok(())
    }

    fn lock(&mut self) -> Result<(), Error> {
        if self.lock_name.is_some() {
            return Err(Error::Locked);
        }
        let name = self.advisory_lock_name()?;
        let acquired: Option<Option<i64>> = self
            .conn
            .exec_first("SELECT GET_LOCK(?, ?)", (name.as_str(), LOCK_TIMEOUT_SECS))?;
        if acquired.flatten() != Some(1) {
            return Err(Error::Locked);
        }
        tracing::debug!(lock = %name, "acquired advisory lock");
        self.lock_name = Some(name);
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), Error> {
        let Some(name) = self.lock_name.take() else {
            return Ok(());
        };
        self.conn.exec_drop("SELECT RELEASE_LOCK(?)", (name.as_str(),))?;
        tracing::debug!(lock = %name, "released advisory lock");
        Ok(())
    }

    fn version(&mut self) -> Result<VersionState, Error> {
        let row: Option<(i64, bool)> = self.conn.query_first(format!(
            "SELECT version, dirty FROM `{}` LIMIT 1",
            self.version_table
        ))?;
        Ok(row
            .map(|(version, dirty)| VersionState::from_row(version, dirty))
            .unwrap_or_default())
    }

    fn set_version(&mut self, version: Option<u64>, dirty: bool) -> Result<(), Error> {
        let row = VersionState::to_row(version)?;
        let mut tx = self.conn.start_transaction(TxOpts::default())?;
        tx.query_drop(format!("DELETE FROM `{}`", self.version_table))?;
        if version.is_some() || dirty {
            tx.exec_drop(
                format!(
                    "INSERT INTO `{}` (version, dirty) VALUES (?, ?)",
                    self.version_table
                ),
                (row, dirty),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Errors from later statements only surface while reading their result sets,
    /// so every set is drained here.
    fn run(&mut self, script: &str) -> Result<(), Error> {
        let mut result = self.conn.query_iter(script)?;
        while let Some(set) = result.iter() {
            for row in set {
                row?;
            }
        }
        Ok(())
    }

    fn exists(&mut self, stmt: &Statement) -> Result<bool, Error> {
        let row: Option<mysql::Row> = self.conn.exec_first(stmt.sql.as_str(), params(stmt))?;
        Ok(row.is_some())
    }

    fn execute(&mut self, stmt: &Statement) -> Result<(), Error> {
        self.conn.exec_drop(stmt.sql.as_str(), params(stmt))?;
        Ok(())
    }

    fn insert_and_reassign_id(
        &mut self,
        insert: &Statement,
        reassign: &dyn Fn(i64) -> Result<Statement, Error>,
    ) -> Result<i64, Error> {
        let mut tx = self.conn.start_transaction(TxOpts::default())?;
        tx.exec_drop(insert.sql.as_str(), params(insert))?;
        let id = tx
            .last_insert_id()
            .ok_or_else(|| Error::Generic("insert did not generate an id".to_string()))?;
        let id = i64::try_from(id)
            .map_err(|_| Error::Generic(format!("generated id {id} out of range")))?;
        let fixup = reassign(id)?;
        tx.exec_drop(fixup.sql.as_str(), params(&fixup))?;
        tx.commit()?;
        Ok(id)
    }
}
