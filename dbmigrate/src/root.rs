//!
//! # Root record
//!
//! Keeps a single privileged row, identified by `id = 1`, in sync with the `root`
//! configuration section.
//!
//! The row is created in two steps: a plain insert that lets the store assign an
//! identifier, then an update that moves the row to `id = 1`. Both run in one
//! transaction so a failed fixup never leaves a stray row behind.
//!

use crate::config::{Config, RootConfig, RootValue};
use crate::driver::{self, Driver};
use crate::dsn::Dsn;
use crate::error::Error;
use crate::sql::{self, Value};

/// bcrypt cost used for the stored password.
pub const DEFAULT_COST: u32 = 10;

/// Identifier the root row always ends up with.
pub const ROOT_ID: i64 = 1;

/// Ordered column/value pairs for the root row.
#[derive(Debug, Clone, PartialEq)]
pub struct RootRecord {
    pub table: String,
    pub columns: Vec<(String, Value)>,
}

impl RootRecord {
    /// `name`, then the hashed `passwd`, then the extra columns. [RootValue::Now] becomes `now`.
    pub fn build<H>(config: &RootConfig, now: i64, hash: H) -> Result<Self, Error>
    where
        H: FnOnce(&str) -> Result<String, Error>,
    {
        let mut columns = Vec::with_capacity(config.extra.len() + 2);
        columns.push(("name".to_string(), Value::Text(config.name.clone())));
        columns.push(("passwd".to_string(), Value::Text(hash(&config.passwd)?)));
        for (column, value) in &config.extra {
            let value = match value {
                RootValue::Text(s) => Value::Text(s.clone()),
                RootValue::Integer(i) => Value::Integer(*i),
                RootValue::Float(f) => Value::Float(*f),
                RootValue::Boolean(b) => Value::Boolean(*b),
                RootValue::Now => Value::Integer(now),
            };
            columns.push((column.clone(), value));
        }
        Ok(Self {
            table: config.table.clone(),
            columns,
        })
    }
}

/// Hash a password with bcrypt at [DEFAULT_COST].
pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(bcrypt::hash(password, DEFAULT_COST)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOutcome {
    /// A new row was inserted; the store first gave it `assigned_id`.
    Inserted { assigned_id: i64 },
    Updated,
}

/// Insert or update the root row described by `config`.
pub fn upsert(driver: &mut dyn Driver, config: &RootConfig) -> Result<RootOutcome, Error> {
    let now = chrono::Utc::now().timestamp();
    let record = RootRecord::build(config, now, hash_password)?;
    upsert_record(driver, &record)
}

/// Connect to `mysql.dsn` and upsert the `root` section. Neither the migrations
/// directory nor the version table is touched.
pub fn upsert_from_config(config: &Config) -> Result<RootOutcome, Error> {
    let root = config.root()?;
    let mut driver = driver::connect(&Dsn::parse(&config.mysql.dsn)?, &config.migrations_table)?;
    upsert(driver.as_mut(), root)
}

pub fn upsert_record(driver: &mut dyn Driver, record: &RootRecord) -> Result<RootOutcome, Error> {
    let table = record.table.as_str();
    let existing = sql::select_by_id(table, ROOT_ID)?;

    if driver.exists(&existing)? {
        driver.execute(&sql::update_by_id(table, ROOT_ID, &record.columns)?)?;
        tracing::info!(table, "root update success");
        return Ok(RootOutcome::Updated);
    }

    let insert = sql::insert(table, &record.columns)?;
    let assigned_id =
        driver.insert_and_reassign_id(&insert, &|id| sql::reassign_id(table, id, ROOT_ID))?;
    tracing::info!(table, assigned_id, "root insert success");
    Ok(RootOutcome::Inserted { assigned_id })
}
