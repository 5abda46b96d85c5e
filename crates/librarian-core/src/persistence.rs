//! Filesystem primitives shared by the archive and link components
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so a file is never left half-written. Symlinks are replaced the same way:
//! the new link is created beside the old one and renamed over it.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{LibraryError, LibraryResult};

/// Format of the added/accessed side records
const SIDE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Write data to a file atomically
pub fn atomic_write(path: &Path, data: &[u8]) -> LibraryResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LibraryError::from_io(e, parent))?;
    }

    let temp_path = sibling_temp_path(path);

    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        LibraryError::from_io(e, path)
    })
}

/// Create a symlink at `link` pointing to `target`
pub fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}

/// Point an existing symlink at a new target
///
/// The link is never observed missing: a replacement is created beside it
/// and renamed over the original. On failure the original is untouched.
pub fn replace_symlink(link: &Path, new_target: &Path) -> std::io::Result<()> {
    let temp_path = sibling_temp_path(link);
    let _ = fs::remove_file(&temp_path);

    make_symlink(new_target, &temp_path)?;
    if let Err(e) = fs::rename(&temp_path, link) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}

/// Hidden temp path next to `path`
fn sibling_temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.librarian-tmp", name))
}

/// Read a side-record date; `None` when missing or malformed
pub fn read_side_date(path: &Path) -> Option<DateTime<Utc>> {
    let content = fs::read_to_string(path).ok()?;
    let date = NaiveDate::parse_from_str(content.trim(), SIDE_DATE_FORMAT).ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Record a date in a side record
pub fn write_side_date(path: &Path, date: DateTime<Utc>) -> LibraryResult<()> {
    let content = date.format(SIDE_DATE_FORMAT).to_string();
    atomic_write(path, content.as_bytes())
}
