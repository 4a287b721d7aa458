/// Error type for the dbmigrate crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "mysql")]
    #[error("{0}")]
    Mysql(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    /// The store is already at the requested version. Callers treat this as success.
    #[error("no change")]
    NoChange,
    /// A migration script failed. The recorded version is left dirty.
    #[error("migration {version} ({name}) {direction} failed: {source}")]
    Migration {
        version: u64,
        name: String,
        direction: &'static str,
        source: Box<Error>,
    },
    #[error("dirty database version {version}, fix and force version")]
    Dirty { version: u64 },
    #[error("version {0} has no migration in the source directory")]
    UnknownVersion(u64),
    #[error("invalid version {0}, must be -1 or greater")]
    InvalidVersion(i64),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("could not acquire migration lock")]
    Locked,
    #[error("unsupported dsn '{0}'")]
    UnsupportedDsn(String),
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Whether this is the benign "nothing to do" outcome of `up` or `migrate`.
    pub fn is_no_change(&self) -> bool {
        matches!(self, Self::NoChange)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for Error {
    fn from(value: mysql::Error) -> Self {
        Self::Mysql(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}
