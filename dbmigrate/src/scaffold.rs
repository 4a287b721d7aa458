//! Creating empty migration file pairs.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::source::parse_file_name;

/// Create `<timestamp>_<name>.up.sql` and `<timestamp>_<name>.down.sql` in `dir`.
///
/// The directory is created if needed. Existing files are never overwritten.
/// Returns the up and down paths, in that order.
pub fn create(dir: &Path, name: &str, timestamp: i64) -> Result<(PathBuf, PathBuf), Error> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(Error::Generic(format!("invalid migration name '{name}'")));
    }
    let timestamp = u64::try_from(timestamp)
        .map_err(|_| Error::Generic(format!("invalid migration timestamp {timestamp}")))?;

    let up = format!("{timestamp}_{name}.up.sql");
    let down = format!("{timestamp}_{name}.down.sql");
    // the pair must be picked up by the source scanner
    if parse_file_name(&up).is_none() {
        return Err(Error::Generic(format!("invalid migration name '{name}'")));
    }

    fs::create_dir_all(dir)
        .map_err(|e| Error::Generic(format!("creating {}: {e}", dir.display())))?;

    let up = dir.join(up);
    let down = dir.join(down);
    for path in [&up, &down] {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::Generic(format!("creating {}: {e}", path.display())))?;
        tracing::info!(name = %path.display(), "migrate create");
    }
    Ok((up, down))
}

/// [create] stamped with the current Unix time.
pub fn create_now(dir: &Path, name: &str) -> Result<(PathBuf, PathBuf), Error> {
    create(dir, name, chrono::Utc::now().timestamp())
}
