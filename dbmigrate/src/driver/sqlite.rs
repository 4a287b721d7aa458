//!
//! # SQLite driver
//!
//! Useful for local development and for exercising migrations without a server.
//! SQLite serialises writers itself, so [lock](Driver::lock) is a no-op.
//!

use std::path::Path;

use rusqlite::types::ToSqlOutput;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};

use super::{Driver, VersionState};
use crate::error::Error;
use crate::sql::{Statement, Value};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Text(s) => s.to_sql(),
            Value::Integer(i) => i.to_sql(),
            Value::Float(f) => f.to_sql(),
            Value::Boolean(b) => b.to_sql(),
        }
    }
}

#[derive(Debug)]
pub struct SqliteDriver {
    conn: Connection,
    version_table: String,
}

impl SqliteDriver {
    pub fn open(path: &Path, version_table: &str) -> Result<Self, Error> {
        Ok(Self::from_connection(Connection::open(path)?, version_table))
    }

    pub fn open_in_memory(version_table: &str) -> Result<Self, Error> {
        Ok(Self::from_connection(
            Connection::open_in_memory()?,
            version_table,
        ))
    }

    pub fn from_connection(conn: Connection, version_table: &str) -> Self {
        Self {
            conn,
            version_table: version_table.to_string(),
        }
    }

    /// The underlying connection, for setting up or inspecting application tables.
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Driver for SqliteDriver {
    fn ensure_version_table(&mut self) -> Result<(), Error> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS `{}` (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)",
                self.version_table
            ),
            [],
        )?;
        Ok(())
    }

    fn lock(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn version(&mut self) -> Result<VersionState, Error> {
        let row: Option<(i64, bool)> = self
            .conn
            .query_row(
                &format!("SELECT version, dirty FROM `{}` LIMIT 1", self.version_table),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row
            .map(|(version, dirty)| VersionState::from_row(version, dirty))
            .unwrap_or_default())
    }

    fn set_version(&mut self, version: Option<u64>, dirty: bool) -> Result<(), Error> {
        let row = VersionState::to_row(version)?;
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM `{}`", self.version_table), [])?;
        if version.is_some() || dirty {
            tx.execute(
                &format!(
                    "INSERT INTO `{}` (version, dirty) VALUES (?1, ?2)",
                    self.version_table
                ),
                params![row, dirty],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn run(&mut self, script: &str) -> Result<(), Error> {
        self.conn.execute_batch(script)?;
        Ok(())
    }

    fn exists(&mut self, stmt: &Statement) -> Result<bool, Error> {
        let mut prepared = self.conn.prepare(&stmt.sql)?;
        Ok(prepared.exists(params_from_iter(stmt.params.iter()))?)
    }

    fn execute(&mut self, stmt: &Statement) -> Result<(), Error> {
        self.conn
            .execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
        Ok(())
    }

    fn insert_and_reassign_id(
        &mut self,
        insert: &Statement,
        reassign: &dyn Fn(i64) -> Result<Statement, Error>,
    ) -> Result<i64, Error> {
        let tx = self.conn.transaction()?;
        tx.execute(&insert.sql, params_from_iter(insert.params.iter()))?;
        let id = tx.last_insert_rowid();
        let fixup = reassign(id)?;
        tx.execute(&fixup.sql, params_from_iter(fixup.params.iter()))?;
        tx.commit()?;
        Ok(id)
    }
}
