//! Before/after version logging around engine operations.

use crate::error::Error;
use crate::migrate::Migrate;

/// The engine commands whose effect on the version is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Up,
    Rollback,
    Force,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "migrate up",
            Self::Rollback => "migrate rollback",
            Self::Force => "migrate force",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded versions around one command. A version that was never set is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChange {
    pub from: u64,
    pub to: u64,
}

/// Run `op` and log the version observed before and after it.
/// [Error::NoChange] counts as success. Any other error is returned without a report line.
pub fn run_reported<F>(
    migrate: &mut Migrate,
    command: Command,
    op: F,
) -> Result<VersionChange, Error>
where
    F: FnOnce(&mut Migrate) -> Result<(), Error>,
{
    let from = migrate.current_version()?.or_zero();

    match op(migrate) {
        Ok(()) => {}
        Err(Error::NoChange) => tracing::debug!(command = %command, "no change"),
        Err(e) => return Err(e),
    }

    let to = migrate.current_version()?.or_zero();
    tracing::info!(from, to, "{command}");
    Ok(VersionChange { from, to })
}
