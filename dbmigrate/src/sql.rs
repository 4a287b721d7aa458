//! Minimal statement construction for the root-record upsert.
//!
//! Identifiers are validated and quoted with backticks, which both MySQL and SQLite accept.
//! Values are always bound through `?` placeholders.

use crate::error::Error;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// A SQL string together with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Checks that `name` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn validate_identifier(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

fn quote(name: &str) -> Result<String, Error> {
    validate_identifier(name)?;
    Ok(format!("`{name}`"))
}

/// `SELECT 1 FROM table WHERE id = ? LIMIT 1`
pub fn select_by_id(table: &str, id: i64) -> Result<Statement, Error> {
    Ok(Statement {
        sql: format!("SELECT 1 FROM {} WHERE `id` = ? LIMIT 1", quote(table)?),
        params: vec![Value::Integer(id)],
    })
}

/// `INSERT INTO table (c1, c2, ...) VALUES (?, ?, ...)`
pub fn insert(table: &str, columns: &[(String, Value)]) -> Result<Statement, Error> {
    if columns.is_empty() {
        return Err(Error::Generic(format!("insert into {table} without columns")));
    }
    let names = columns
        .iter()
        .map(|(name, _)| quote(name))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table)?,
            names.join(", "),
            placeholders
        ),
        params: columns.iter().map(|(_, value)| value.clone()).collect(),
    })
}

/// `UPDATE table SET c1 = ?, c2 = ? WHERE id = ?`
pub fn update_by_id(table: &str, id: i64, columns: &[(String, Value)]) -> Result<Statement, Error> {
    if columns.is_empty() {
        return Err(Error::Generic(format!("update of {table} without columns")));
    }
    let assignments = columns
        .iter()
        .map(|(name, _)| quote(name).map(|quoted| format!("{quoted} = ?")))
        .collect::<Result<Vec<_>, _>>()?;
    let mut params: Vec<Value> = columns.iter().map(|(_, value)| value.clone()).collect();
    params.push(Value::Integer(id));
    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE `id` = ?",
            quote(table)?,
            assignments.join(", ")
        ),
        params,
    })
}

/// `UPDATE table SET id = ? WHERE id = ?`, moving a row from `from` to `to`.
pub fn reassign_id(table: &str, from: i64, to: i64) -> Result<Statement, Error> {
    Ok(Statement {
        sql: format!("UPDATE {} SET `id` = ? WHERE `id` = ?", quote(table)?),
        params: vec![Value::Integer(to), Value::Integer(from)],
    })
}
