//! Link command handlers

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use librarian_core::{Library, LinkKind, LinkReport};

use crate::output::Output;

/// Link an entry at `path`, or into the shelves when no path is given
pub fn link(library: &Library, key: &str, path: Option<PathBuf>, output: &Output) -> Result<()> {
    let entry = library.resolve(key)?;
    let path = match path {
        Some(path) => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            anchor(path, &cwd)
        }
        None => library
            .config()
            .shelves_dir()
            .join(format!("{}.{}", entry.key, library.config().document_ext)),
    };

    let link = library.link(&entry.key, &path)?;
    output.print_link(&link);
    Ok(())
}

/// Relative paths on the command line name places under the working directory
fn anchor(path: PathBuf, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Bookmark an entry
pub fn bookmark(library: &Library, key: &str, name: Option<&str>, output: &Output) -> Result<()> {
    let link = library.bookmark(key, name)?;
    output.print_link(&link);
    Ok(())
}

/// Repair one link or every dangling link under a directory
pub fn fix(library: &Library, path: Option<PathBuf>, output: &Output) -> Result<()> {
    let path = path.unwrap_or_else(|| library.config().shelves_dir());

    if path.is_dir() && !path.is_symlink() {
        let report = library.fix_links(&path);
        output.success(&format!("Fixed {} link(s)", report.fixed.len()));
        output.problems(&report.failed);
        if !report.failed.is_empty() {
            bail!("{} link(s) could not be fixed", report.failed.len());
        }
    } else if library.fix_link(&path)? {
        output.success(&format!("Fixed {}", path.display()));
    } else {
        output.message(&format!("{} is already valid", path.display()));
    }
    Ok(())
}

/// Check links, optionally only those pointing at one key
pub fn check(
    library: &Library,
    roots: &[PathBuf],
    verbose: bool,
    to: Option<&str>,
    output: &Output,
) -> Result<()> {
    let report = match to {
        Some(key) => {
            let (links, errors) = library.links_to(key, roots);
            let mut report = LinkReport {
                errors,
                ..LinkReport::default()
            };
            for link in links {
                match link.kind {
                    LinkKind::Valid => report.valid.push(link),
                    _ => report.dangling.push(link),
                }
            }
            report
        }
        None => library.check_links(roots),
    };

    output.print_link_report(&report, verbose || to.is_some());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_anchor_relative_to_working_directory() {
        let cwd = Path::new("/home/me/library/shelves/ai");
        assert_eq!(
            anchor(PathBuf::from("here.pdf"), cwd),
            PathBuf::from("/home/me/library/shelves/ai/here.pdf")
        );
        assert_eq!(
            anchor(PathBuf::from("/tmp/x.pdf"), cwd),
            PathBuf::from("/tmp/x.pdf")
        );
    }
}
