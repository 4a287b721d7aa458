//! Migration definitions read from a directory of SQL files.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;

/// Which script of a migration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// One schema change, identified by `(version, name)`.
/// Either script may be absent, in which case applying it only moves the recorded version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u64,
    pub name: String,
    pub up: Option<PathBuf>,
    pub down: Option<PathBuf>,
}

impl Migration {
    /// Read the script for `direction`. Missing scripts read as empty.
    pub fn script(&self, direction: Direction) -> Result<String, Error> {
        let path = match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        };
        match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                Error::Generic(format!("reading {}: {e}", path.display()))
            }),
            None => Ok(String::new()),
        }
    }
}

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9]+)_(.*)\.(up|down)\.sql$").expect("migration file pattern is valid")
    })
}

/// Split `<version>_<name>.<direction>.sql` into its parts.
pub fn parse_file_name(file_name: &str) -> Option<(u64, String, Direction)> {
    let captures = file_name_pattern().captures(file_name)?;
    let version = captures[1].parse().ok()?;
    let direction = match &captures[3] {
        "up" => Direction::Up,
        _ => Direction::Down,
    };
    Some((version, captures[2].to_string(), direction))
}

/// All migrations in a directory, ordered by version.
#[derive(Debug, Clone, Default)]
pub struct Source {
    dir: PathBuf,
    migrations: BTreeMap<u64, Migration>,
}

impl Source {
    /// Scan `dir`. Files that do not follow the naming convention are ignored.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&dir)
            .map_err(|e| Error::Generic(format!("reading {}: {e}", dir.display())))?;

        let mut migrations: BTreeMap<u64, Migration> = BTreeMap::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some((version, name, direction)) = parse_file_name(file_name) else {
                tracing::debug!(file = file_name, "skipping file outside naming convention");
                continue;
            };

            let migration = migrations.entry(version).or_insert_with(|| Migration {
                version,
                name,
                up: None,
                down: None,
            });
            let slot = match direction {
                Direction::Up => &mut migration.up,
                Direction::Down => &mut migration.down,
            };
            if slot.is_some() {
                return Err(Error::Generic(format!(
                    "duplicate {} migration for version {version} in {}",
                    direction.as_str(),
                    dir.display()
                )));
            }
            *slot = Some(entry.path());
        }

        tracing::debug!(
            dir = %dir.display(),
            versions = ?migrations.keys().collect::<Vec<_>>(),
            "scanned migration source"
        );
        Ok(Self { dir, migrations })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// All migrations in ascending version order.
    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn versions(&self) -> Vec<u64> {
        self.migrations.keys().copied().collect()
    }

    pub fn get(&self, version: u64) -> Option<&Migration> {
        self.migrations.get(&version)
    }

    pub fn contains(&self, version: u64) -> bool {
        self.migrations.contains_key(&version)
    }

    pub fn first(&self) -> Option<&Migration> {
        self.migrations.values().next()
    }

    pub fn last(&self) -> Option<&Migration> {
        self.migrations.values().next_back()
    }

    /// The migration just before `version`, if any.
    pub fn prev(&self, version: u64) -> Option<&Migration> {
        self.migrations.range(..version).next_back().map(|(_, m)| m)
    }

    /// The migration just after `version`, if any.
    pub fn next(&self, version: u64) -> Option<&Migration> {
        self.migrations
            .range((Bound::Excluded(version), Bound::Unbounded))
            .next()
            .map(|(_, m)| m)
    }

    /// Migrations with `after < version <= up_to`, ascending. `after = None` starts at the beginning.
    pub fn between(&self, after: Option<u64>, up_to: u64) -> Vec<&Migration> {
        self.migrations
            .values()
            .filter(|m| after.map_or(true, |after| m.version > after) && m.version <= up_to)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_names() {
        assert_eq!(
            parse_file_name("1700000000_add_users.up.sql"),
            Some((1700000000, "add_users".to_string(), Direction::Up))
        );
        assert_eq!(
            parse_file_name("2_drop.index.down.sql"),
            Some((2, "drop.index".to_string(), Direction::Down))
        );
        assert_eq!(parse_file_name("add_users.up.sql"), None);
        assert_eq!(parse_file_name("1_add_users.sql"), None);
        assert_eq!(parse_file_name("1_add_users.up.sql.bak"), None);
        assert_eq!(parse_file_name("99999999999999999999999_x.up.sql"), None);
    }

    #[test]
    fn scans_directory() {
        let dir = tempfile::tempdir().unwrap();
        for file in [
            "3_c.up.sql",
            "1_a.up.sql",
            "1_a.down.sql",
            "2_b.down.sql",
            "README.md",
        ] {
            fs::write(dir.path().join(file), "").unwrap();
        }
        fs::create_dir(dir.path().join("4_nested.up.sql")).unwrap();

        let source = Source::open(dir.path()).unwrap();
        assert_eq!(source.versions(), vec![1, 2, 3]);
        assert!(source.get(1).unwrap().up.is_some());
        assert!(source.get(1).unwrap().down.is_some());
        assert!(source.get(2).unwrap().up.is_none());
        assert!(source.get(3).unwrap().down.is_none());
        assert_eq!(source.get(2).unwrap().name, "b");

        assert_eq!(source.first().unwrap().version, 1);
        assert_eq!(source.last().unwrap().version, 3);
        assert_eq!(source.prev(3).unwrap().version, 2);
        assert!(source.prev(1).is_none());
        assert_eq!(source.next(1).unwrap().version, 2);
        assert!(source.next(3).is_none());
        assert_eq!(
            source
                .between(Some(1), 3)
                .iter()
                .map(|m| m.version)
                .collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(source.between(None, 1).len(), 1);
    }

    #[test]
    fn missing_script_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1_a.up.sql"), "CREATE TABLE a (id INT);").unwrap();
        let source = Source::open(dir.path()).unwrap();
        let migration = source.get(1).unwrap();
        assert_eq!(
            migration.script(Direction::Up).unwrap(),
            "CREATE TABLE a (id INT);"
        );
        assert_eq!(migration.script(Direction::Down).unwrap(), "");
    }

    #[test]
    fn duplicate_direction_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1_a.up.sql"), "").unwrap();
        fs::write(dir.path().join("1_b.up.sql"), "").unwrap();
        let err = Source::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate up migration for version 1"));
    }

    #[test]
    fn missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Source::open(dir.path().join("absent")).is_err());
    }
}
