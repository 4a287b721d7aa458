//! Configuration loading.
//!
//! A [Config] is read once at startup from a YAML, TOML or JSON file and passed
//! by reference to every component afterwards.
//!
//! ```yaml
//! migrations: db/migrations
//! mysql:
//!   dsn: app:secret@tcp(127.0.0.1:3306)/app
//! root:
//!   table: admins
//!   name: root
//!   passwd: change-me
//!   role: 1
//!   created_at: now
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Keys of the `root` section that never become extra columns.
pub const RESERVED_ROOT_KEYS: [&str; 3] = ["table", "name", "passwd"];

/// Column the root row is keyed on; it is always 1 and never configurable.
pub const ROOT_ID_COLUMN: &str = "id";

/// Key the `toml` crate wraps datetimes in when deserializing into untyped values.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// Sentinel value that resolves to the current Unix timestamp.
pub const NOW_SENTINEL: &str = "now";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Directory holding `<version>_<name>.{up,down}.sql` pairs.
    #[serde(default = "default_migrations")]
    pub migrations: PathBuf,
    /// Table the engine records the schema version in.
    #[serde(default = "default_migrations_table")]
    pub migrations_table: String,
    #[serde(default)]
    pub mysql: MysqlConfig,
    #[serde(default)]
    pub root: Option<RootConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MysqlConfig {
    #[serde(default = "default_dsn")]
    pub dsn: String,
}

fn default_migrations() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_migrations_table() -> String {
    "schema_migrations".to_string()
}

fn default_dsn() -> String {
    "localhost:3306".to_string()
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self { dsn: default_dsn() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            migrations: default_migrations(),
            migrations_table: default_migrations_table(),
            mysql: MysqlConfig::default(),
            root: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from [DEFAULT_CONFIG_FILE] if it exists, or fall
    /// back to defaults. An explicitly given path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    tracing::debug!("no config file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a config file, choosing the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config = Self::from_str_with_format(&text, &extension)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn from_str_with_format(text: &str, extension: &str) -> Result<Self, String> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        match extension {
            "yml" | "yaml" => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            "toml" => toml::from_str(text).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(text).map_err(|e| e.to_string()),
            other => Err(format!("unsupported config format '{other}'")),
        }
    }

    /// Replace `mysql.dsn`, typically from `--dsn` or `DATABASE_URL`.
    pub fn with_dsn(mut self, dsn: Option<String>) -> Self {
        if let Some(dsn) = dsn {
            self.mysql.dsn = dsn;
        }
        self
    }

    /// Replace the migrations directory.
    pub fn with_migrations(mut self, migrations: Option<PathBuf>) -> Self {
        if let Some(migrations) = migrations {
            self.migrations = migrations;
        }
        self
    }

    /// The `root` section, which only the `root` command requires.
    pub fn root(&self) -> Result<&RootConfig, Error> {
        self.root
            .as_ref()
            .ok_or_else(|| Error::Config("missing `root` section".to_string()))
    }
}

/// A value for an extra root column, resolved while loading.
#[derive(Debug, Clone, PartialEq)]
pub enum RootValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// The literal `now`; becomes the Unix timestamp at execution time.
    Now,
}

impl TryFrom<serde_json::Value> for RootValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;
        match value {
            Json::String(s) if s == NOW_SENTINEL => Ok(Self::Now),
            Json::String(s) => Ok(Self::Text(s)),
            Json::Bool(b) => Ok(Self::Boolean(b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Integer(i)),
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| format!("number {n} out of range")),
            },
            Json::Null => Err("null is not a column value".to_string()),
            Json::Object(map) if map.len() == 1 && map.contains_key(TOML_DATETIME_KEY) => {
                match map.get(TOML_DATETIME_KEY) {
                    Some(Json::String(datetime)) => Ok(Self::Text(datetime.clone())),
                    _ => Err("unreadable datetime value".to_string()),
                }
            }
            Json::Array(_) => Err("lists are not column values".to_string()),
            Json::Object(_) => Err("nested tables are not column values".to_string()),
        }
    }
}

/// The `root` section: the target table, the account name and password, and any
/// extra columns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, serde_json::Value>")]
pub struct RootConfig {
    pub table: String,
    pub name: String,
    pub passwd: String,
    pub extra: BTreeMap<String, RootValue>,
}

fn is_reserved(key: &str) -> bool {
    RESERVED_ROOT_KEYS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(key))
}

fn required_scalar(
    raw: &mut BTreeMap<String, serde_json::Value>,
    key: &str,
) -> Result<String, String> {
    match raw.remove(key) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Some(serde_json::Value::String(_)) => Err(format!("root.{key} must not be empty")),
        Some(_) => Err(format!("root.{key} must be a string")),
        None => Err(format!("missing root.{key}")),
    }
}

impl TryFrom<BTreeMap<String, serde_json::Value>> for RootConfig {
    type Error = String;

    fn try_from(mut raw: BTreeMap<String, serde_json::Value>) -> Result<Self, Self::Error> {
        let table = match raw.remove("table") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(_) => return Err("root.table must be a non-empty string".to_string()),
            None => return Err("missing root.table".to_string()),
        };
        let name = required_scalar(&mut raw, "name")?;
        let passwd = required_scalar(&mut raw, "passwd")?;

        let mut extra = BTreeMap::new();
        for (key, value) in raw {
            if is_reserved(&key) {
                continue;
            }
            if key.eq_ignore_ascii_case(ROOT_ID_COLUMN) {
                return Err(format!(
                    "root.{key} cannot be set, the root row always has {ROOT_ID_COLUMN} 1"
                ));
            }
            let value = RootValue::try_from(value).map_err(|e| format!("root.{key}: {e}"))?;
            extra.insert(key, value);
        }

        Ok(Self {
            table,
            name,
            passwd,
            extra,
        })
    }
}
