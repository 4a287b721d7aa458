//! Connection-string handling.
//!
//! Configuration files written for Go tooling carry DSNs like
//! `user:pass@tcp(host:3306)/app?parseTime=true`; those are rewritten into the
//! `mysql://` URL form the `mysql` crate understands, with the credentials
//! percent-encoded.

use std::path::PathBuf;

use url::Url;

use crate::error::Error;

/// Address the Go driver uses when a DSN names none.
const DEFAULT_ADDRESS: &str = "127.0.0.1:3306";

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dsn {
    /// A `mysql://` URL.
    Mysql(String),
    /// A SQLite database file.
    Sqlite(PathBuf),
    /// A private in-memory SQLite database.
    SqliteMemory,
}

impl Dsn {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::UnsupportedDsn(raw.to_string()));
        }
        if raw.starts_with("mysql://") {
            Url::parse(raw).map_err(|e| Error::UnsupportedDsn(format!("{}: {e}", redact(raw))))?;
            return Ok(Self::Mysql(raw.to_string()));
        }
        if raw == "sqlite::memory:" || raw == "sqlite://:memory:" {
            return Ok(Self::SqliteMemory);
        }
        if let Some(path) = raw.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(Error::UnsupportedDsn(raw.to_string()));
            }
            return Ok(Self::Sqlite(PathBuf::from(path)));
        }
        if raw.contains("://") {
            return Err(Error::UnsupportedDsn(raw.to_string()));
        }
        Ok(Self::Mysql(from_go_dsn(raw)?.into()))
    }

    /// The DSN with any password replaced, safe for logs.
    pub fn redacted(&self) -> String {
        match self {
            Self::Mysql(url) => redact(url),
            Self::Sqlite(path) => format!("sqlite://{}", path.display()),
            Self::SqliteMemory => "sqlite::memory:".to_string(),
        }
    }
}

/// Builds a `mysql://` URL from `[user[:password]@][tcp(address)|address][/db[?params]]`.
///
/// Credentials end at the last `@` before the database slash, so passwords may contain
/// `@`, `/` or `:`. Query parameters belong to the Go driver and are dropped.
fn from_go_dsn(raw: &str) -> Result<Url, Error> {
    let unsupported = || Error::UnsupportedDsn(redact_go(raw));

    let (head, database) = match raw.rsplit_once('/') {
        Some((head, tail)) => (head, tail.split('?').next().unwrap_or_default()),
        None => (raw, ""),
    };
    let (credentials, net) = match head.rsplit_once('@') {
        Some((credentials, net)) => (Some(credentials), net),
        None => (None, head),
    };

    let address = if let Some(inner) = net.strip_prefix("tcp(") {
        inner.strip_suffix(')').ok_or_else(unsupported)?
    } else if net.contains('(') || net.contains(')') {
        // unix sockets and other networks
        return Err(unsupported());
    } else {
        net
    };
    let address = if address.is_empty() {
        DEFAULT_ADDRESS
    } else {
        address
    };

    let mut url = Url::parse(&format!("mysql://{address}")).map_err(|_| unsupported())?;
    if let Some(credentials) = credentials {
        let (user, password) = match credentials.split_once(':') {
            Some((user, password)) => (user, Some(password)),
            None => (credentials, None),
        };
        url.set_username(&escape_percent(user))
            .map_err(|_| unsupported())?;
        if let Some(password) = password {
            url.set_password(Some(&escape_percent(password)))
                .map_err(|_| unsupported())?;
        }
    }
    if !database.is_empty() {
        url.set_path(&format!("/{database}"));
    }
    Ok(url)
}

/// `Url` encodes userinfo but leaves `%` alone, and the mysql crate decodes it.
fn escape_percent(s: &str) -> String {
    s.replace('%', "%25")
}

fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() && parsed.set_password(Some("***")).is_err() {
                return "mysql://***".to_string();
            }
            parsed.into()
        }
        Err(_) => "mysql://***".to_string(),
    }
}

fn redact_go(raw: &str) -> String {
    match raw.rsplit_once('@') {
        Some((_, rest)) => format!("***@{rest}"),
        None => raw.to_string(),
    }
}
