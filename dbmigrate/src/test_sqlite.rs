//! Fixtures for tests that run against a SQLite file.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::TempDir;

/// A temporary migrations directory next to a SQLite database file.
pub struct Fixture {
    _root: TempDir,
    pub migrations: PathBuf,
    pub db_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let migrations = root.path().join("migrations");
        fs::create_dir(&migrations).unwrap();
        let db_path = root.path().join("app.db");
        Self {
            _root: root,
            migrations,
            db_path,
        }
    }

    pub fn dsn(&self) -> String {
        format!("sqlite://{}", self.db_path.display())
    }

    /// Write `<version>_<name>.up.sql` and, when given, the matching down script.
    pub fn write(&self, version: u64, name: &str, up: &str, down: Option<&str>) -> &Self {
        write_script(&self.migrations, version, name, "up", up);
        if let Some(down) = down {
            write_script(&self.migrations, version, name, "down", down);
        }
        self
    }

    /// A fresh connection for inspecting the database.
    pub fn conn(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }

    pub fn table_exists(&self, table: &str) -> bool {
        let count: i64 = self
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }
}

fn write_script(dir: &Path, version: u64, name: &str, direction: &str, body: &str) {
    fs::write(dir.join(format!("{version}_{name}.{direction}.sql")), body).unwrap();
}

/// Three migrations creating `users`, `posts` and an index, each reversible.
pub fn three_step_fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture
        .write(
            1,
            "create_users",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);",
            Some("DROP TABLE users;"),
        )
        .write(
            2,
            "create_posts",
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER);",
            Some("DROP TABLE posts;"),
        )
        .write(
            3,
            "index_posts",
            "CREATE INDEX idx_posts_user ON posts (user_id);",
            Some("DROP INDEX idx_posts_user;"),
        );
    fixture
}
