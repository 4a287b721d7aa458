//!
//! # Migration engine
//!
//! [Migrate] pairs a [Source] of SQL files with a [Driver] and moves the recorded schema
//! version between migrations.
//!
//! Every step follows the same protocol: record the destination version as dirty, run
//! the script, then record it clean. A script that fails therefore leaves the version
//! dirty, and further `up`/`migrate` calls refuse to run until an operator inspects the
//! database and calls [Migrate::force].
//!

use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::driver::{self, Driver, VersionState};
use crate::dsn::Dsn;
use crate::error::Error;
use crate::source::{Direction, Migration, Source};

pub struct Migrate {
    source: Source,
    driver: Box<dyn Driver>,
}

impl std::fmt::Debug for Migrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrate")
            .field("source", &self.source.dir())
            .field("versions", &self.source.versions())
            .finish()
    }
}

impl Migrate {
    pub fn new(source: Source, driver: Box<dyn Driver>) -> Self {
        Self { source, driver }
    }

    /// Scan `source_dir` and connect to `dsn`, recording versions in `version_table`.
    pub fn open(source_dir: &Path, dsn: &str, version_table: &str) -> Result<Self, Error> {
        let source = Source::open(source_dir)?;
        let driver = driver::open(&Dsn::parse(dsn)?, version_table)?;
        Ok(Self::new(source, driver))
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::open(
            &config.migrations,
            &config.mysql.dsn,
            &config.migrations_table,
        )
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    /// The recorded version. A version that was never set is `None`, not an error.
    pub fn current_version(&mut self) -> Result<VersionState, Error> {
        self.driver.version()
    }

    /// Migrations above the recorded version, in the order `up` would apply them.
    pub fn pending(&mut self) -> Result<Vec<Migration>, Error> {
        let current = self.driver.version()?.version;
        Ok(self
            .source
            .iter()
            .filter(|m| current.map_or(true, |current| m.version > current))
            .cloned()
            .collect())
    }

    /// Apply every pending migration in ascending order.
    /// Returns [Error::NoChange] when there is nothing to apply.
    pub fn up(&mut self) -> Result<(), Error> {
        self.with_lock(|this| {
            let current = this.clean_version()?;
            let last = match this.source.last() {
                Some(last) => last.version,
                None => return Err(Error::NoChange),
            };
            let pending = this.source.between(current, last);

            tracing::debug!(
                current_version = ?current,
                pending = ?pending.iter().map(|m| m.version).collect::<Vec<_>>(),
                "Considering migrations to run"
            );

            if pending.is_empty() {
                return Err(Error::NoChange);
            }
            for migration in pending {
                step(
                    this.driver.as_mut(),
                    migration,
                    Direction::Up,
                    Some(migration.version),
                )?;
            }
            Ok(())
        })
    }

    /// Apply or revert migrations until the recorded version is exactly `target`.
    /// A target of 0 reverts every migration. Returns [Error::NoChange] when already there.
    pub fn migrate(&mut self, target: u64) -> Result<(), Error> {
        self.with_lock(|this| {
            let current = this.clean_version()?;
            let target = (target != 0).then_some(target);
            if let Some(target) = target {
                if !this.source.contains(target) {
                    return Err(Error::UnknownVersion(target));
                }
            }
            if current == target {
                return Err(Error::NoChange);
            }

            match target {
                Some(target) if Some(target) > current => {
                    for migration in this.source.between(current, target) {
                        step(
                            this.driver.as_mut(),
                            migration,
                            Direction::Up,
                            Some(migration.version),
                        )?;
                    }
                }
                _ => {
                    // current > target here, so current is set
                    let Some(current) = current else {
                        return Err(Error::NoChange);
                    };
                    for migration in this.source.between(target, current).into_iter().rev() {
                        let previous = this.source.prev(migration.version).map(|m| m.version);
                        step(this.driver.as_mut(), migration, Direction::Down, previous)?;
                    }
                }
            }
            Ok(())
        })
    }

    /// Record `version` as the clean current version without running any script.
    /// `-1` clears the recorded version. The version does not need a migration file.
    pub fn force(&mut self, version: i64) -> Result<(), Error> {
        if version < -1 {
            return Err(Error::InvalidVersion(version));
        }
        let target = u64::try_from(version).ok();
        self.with_lock(|this| {
            tracing::info!(version = ?target, "Forcing version");
            this.driver.set_version(target, false)
        })
    }

    /// The recorded version, rejecting a dirty state and versions unknown to the source.
    fn clean_version(&mut self) -> Result<Option<u64>, Error> {
        let state = self.driver.version()?;
        if state.dirty {
            return Err(Error::Dirty {
                version: state.or_zero(),
            });
        }
        if let Some(version) = state.version {
            if !self.source.contains(version) {
                return Err(Error::UnknownVersion(version));
            }
        }
        Ok(state.version)
    }

    /// Run `f` while holding the driver lock, releasing it even when `f` fails.
    fn with_lock<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        self.driver.lock()?;
        let result = f(self);
        let unlocked = self.driver.unlock();
        match (result, unlocked) {
            (Err(error), Err(unlock_error)) => {
                tracing::warn!(error = %unlock_error, "Failed to release migration lock");
                Err(error)
            }
            (Err(error), Ok(())) => Err(error),
            (Ok(_), Err(unlock_error)) => Err(unlock_error),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

/// Run one script, recording `record` as dirty before and clean after.
fn step(
    driver: &mut dyn Driver,
    migration: &Migration,
    direction: Direction,
    record: Option<u64>,
) -> Result<(), Error> {
    let _span = tracing::info_span!(
        "migration",
        direction = direction.as_str(),
        version = migration.version,
        name = %migration.name
    )
    .entered();
    tracing::info!("Starting migration");

    let started = Instant::now();
    let script = migration.script(direction)?;

    driver.set_version(record, true)?;
    if !script.trim().is_empty() {
        if let Err(error) = driver.run(&script) {
            tracing::error!(error = %error, "Migration failed");
            return Err(Error::Migration {
                version: migration.version,
                name: migration.name.clone(),
                direction: direction.as_str(),
                source: Box::new(error),
            });
        }
    }
    driver.set_version(record, false)?;

    tracing::info!(
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Migration completed successfully"
    );
    Ok(())
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::test_sqlite::{three_step_fixture, Fixture};

    fn open(fixture: &Fixture) -> Migrate {
        Migrate::open(&fixture.migrations, &fixture.dsn(), "schema_migrations").unwrap()
    }

    #[test]
    fn fresh_database_has_no_version() {
        let fixture = three_step_fixture();
        let mut migrate = open(&fixture);
        assert_eq!(migrate.current_version().unwrap(), VersionState::default());
        assert_eq!(migrate.pending().unwrap().len(), 3);
    }

    #[test]
    fn up_applies_all_then_is_no_change() {
        let fixture = three_step_fixture();
        let mut migrate = open(&fixture);

        migrate.up().unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(3));
        assert!(fixture.table_exists("users"));
        assert!(fixture.table_exists("posts"));
        assert!(migrate.pending().unwrap().is_empty());

        let err = migrate.up().unwrap_err();
        assert!(err.is_no_change());
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(3));
    }

    #[test]
    fn up_picks_up_new_files() {
        let fixture = three_step_fixture();
        open(&fixture).up().unwrap();

        fixture.write(
            1700000000,
            "create_tags",
            "CREATE TABLE tags (id INTEGER PRIMARY KEY);",
            Some("DROP TABLE tags;"),
        );
        let mut migrate = open(&fixture);
        assert_eq!(
            migrate
                .pending()
                .unwrap()
                .iter()
                .map(|m| m.version)
                .collect::<Vec<_>>(),
            vec![1700000000]
        );
        migrate.up().unwrap();
        assert_eq!(
            migrate.current_version().unwrap(),
            VersionState::clean(1700000000)
        );
        assert!(fixture.table_exists("tags"));
    }

    #[test]
    fn up_with_empty_source_is_no_change() {
        let fixture = Fixture::new();
        let mut migrate = open(&fixture);
        assert!(migrate.up().unwrap_err().is_no_change());
        assert_eq!(migrate.current_version().unwrap(), VersionState::default());
    }

    #[test]
    fn empty_scripts_only_move_the_version() {
        let fixture = Fixture::new();
        fixture.write(1700000000, "add_users", "", Some("   \n"));
        let mut migrate = open(&fixture);

        migrate.up().unwrap();
        assert_eq!(
            migrate.current_version().unwrap(),
            VersionState::clean(1700000000)
        );
        migrate.migrate(0).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::default());
    }

    #[test]
    fn migrate_down_and_up_to_target() {
        let fixture = three_step_fixture();
        let mut migrate = open(&fixture);
        migrate.up().unwrap();

        migrate.migrate(1).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(1));
        assert!(fixture.table_exists("users"));
        assert!(!fixture.table_exists("posts"));

        assert!(migrate.migrate(1).unwrap_err().is_no_change());
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(1));

        migrate.migrate(2).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(2));
        assert!(fixture.table_exists("posts"));
        assert!(migrate.migrate(2).unwrap_err().is_no_change());
    }

    #[test]
    fn migrate_forward_from_nothing() {
        let fixture = three_step_fixture();
        let mut migrate = open(&fixture);
        migrate.migrate(2).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(2));
        assert!(fixture.table_exists("posts"));
    }

    #[test]
    fn migrate_to_zero_reverts_everything() {
        let fixture = three_step_fixture();
        let mut migrate = open(&fixture);
        migrate.up().unwrap();

        migrate.migrate(0).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::default());
        assert!(!fixture.table_exists("users"));
        assert!(migrate.migrate(0).unwrap_err().is_no_change());
    }

    #[test]
    fn migrate_to_unknown_version_fails_without_change() {
        let fixture = three_step_fixture();
        let mut migrate = open(&fixture);
        migrate.up().unwrap();

        assert!(matches!(
            migrate.migrate(42),
            Err(Error::UnknownVersion(42))
        ));
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(3));
    }

    #[test]
    fn failed_script_leaves_dirty_version() {
        let fixture = three_step_fixture();
        fixture.write(4, "broken", "THIS IS NOT VALID SQL;", None);
        let mut migrate = open(&fixture);

        let err = migrate.up().unwrap_err();
        assert!(
            matches!(err, Error::Migration { version: 4, .. }),
            "unexpected error: {err}"
        );
        assert_eq!(
            migrate.current_version().unwrap(),
            VersionState {
                version: Some(4),
                dirty: true
            }
        );
        // earlier steps stay applied
        assert!(fixture.table_exists("posts"));

        assert!(matches!(migrate.up(), Err(Error::Dirty { version: 4 })));
        assert!(matches!(migrate.migrate(1), Err(Error::Dirty { version: 4 })));
    }

    #[test]
    fn force_recovers_from_dirty_state() {
        let fixture = three_step_fixture();
        fixture.write(4, "broken", "THIS IS NOT VALID SQL;", None);
        let mut migrate = open(&fixture);
        assert!(migrate.up().is_err());

        migrate.force(3).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(3));
        migrate.migrate(2).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(2));
    }

    #[test]
    fn force_does_not_require_a_migration_file() {
        let fixture = three_step_fixture();
        let mut migrate = open(&fixture);

        migrate.force(999).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(999));
        assert!(!fixture.table_exists("users"));

        // the engine will not move from a version it cannot find
        assert!(matches!(migrate.up(), Err(Error::UnknownVersion(999))));

        migrate.force(-1).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::default());
        assert!(matches!(migrate.force(-2), Err(Error::InvalidVersion(-2))));
    }

    #[test]
    fn down_without_script_only_moves_version() {
        let fixture = Fixture::new();
        fixture
            .write(1, "a", "CREATE TABLE a (id INTEGER PRIMARY KEY);", None)
            .write(2, "b", "CREATE TABLE b (id INTEGER PRIMARY KEY);", None);
        let mut migrate = open(&fixture);
        migrate.up().unwrap();

        migrate.migrate(1).unwrap();
        assert_eq!(migrate.current_version().unwrap(), VersionState::clean(1));
        assert!(fixture.table_exists("b"));
    }

    #[test]
    fn open_fails_for_missing_source_dir() {
        let fixture = Fixture::new();
        let missing = fixture.migrations.join("absent");
        assert!(Migrate::open(&missing, &fixture.dsn(), "schema_migrations").is_err());
    }
}
