//! Entry command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use librarian_core::{AddMode, Config, Hit, Library};

use crate::output::{Output, OutputFormat};
use crate::prompt::confirm;

/// Archive a document
pub fn add(
    library: &Library,
    document: &Path,
    metadata: &Path,
    delete: bool,
    bookmark: bool,
    output: &Output,
) -> Result<()> {
    let mode = if delete { AddMode::Move } else { AddMode::Copy };
    let entry = library.add(document, metadata, mode)?;

    if bookmark {
        library.bookmark(&entry.key, None)?;
    }

    let record = library.record(&entry.key)?;
    output.success(&format!("Archived {}", entry.key));
    output.print_hit(&Hit { entry, record });
    Ok(())
}

/// Change an entry's key
pub fn rekey(library: &Library, key: &str, new_key: &str, output: &Output) -> Result<()> {
    let report = library.rekey(key, new_key)?;
    output.print_rekey(&report);
    if !report.is_complete() {
        bail!(
            "{} link(s) could not be repaired",
            report.unrepaired_paths().len()
        );
    }
    Ok(())
}

/// Adopt the key from an entry's metadata
pub fn rename(library: &Library, key: &str, yes: bool, output: &Output) -> Result<()> {
    let entry = library.resolve(key)?;
    let metadata_key = librarian_core::metadata::MetadataFile::read(&entry.metadata_path)?
        .key()
        .to_string();

    if !yes && metadata_key != entry.key && output.should_prompt() {
        let question = format!("Rename {} to {}?", entry.key, metadata_key);
        if !confirm(&question)? {
            output.message("Cancelled.");
            return Ok(());
        }
    }

    let report = library.rename(&entry.key)?;
    output.print_rekey(&report);
    if !report.is_complete() {
        bail!(
            "{} link(s) could not be repaired",
            report.unrepaired_paths().len()
        );
    }
    Ok(())
}

/// Show one entry
pub fn show(library: &Library, key: &str, output: &Output) -> Result<()> {
    let entry = library.resolve(key)?;
    let record = library.record(&entry.key)?;
    output.print_hit(&Hit { entry, record });
    Ok(())
}

/// Open an entry in the system viewer
pub fn open(library: &Library, key: &str, bib: bool, output: &Output) -> Result<()> {
    let entry = library.resolve(key)?;
    let path = if bib {
        &entry.metadata_path
    } else {
        &entry.document_path
    };

    open::that(path).with_context(|| format!("Failed to open {}", path.display()))?;
    library.touch_accessed(&entry.key)?;

    if !output.is_quiet() && !output.is_json() {
        println!("Opened {}", path.display());
    }
    Ok(())
}

/// Replace an entry's tags
pub fn tag(library: &Library, key: &str, tags: &str, output: &Output) -> Result<()> {
    let tags = parse_tags(tags);
    let record = library.set_tags(key, &tags)?;
    let entry = library.resolve(&record.key)?;

    if tags.is_empty() {
        output.success(&format!("Cleared tags on {}", record.key));
    } else {
        output.success(&format!("Tagged {}: {}", record.key, tags.join(", ")));
    }
    if output.is_json() {
        output.print_hit(&Hit { entry, record });
    }
    Ok(())
}

/// Print every entry's metadata
pub fn compile(library: &Library) -> Result<()> {
    print!("{}", library.compile_bibtex()?);
    Ok(())
}

/// Print library paths
pub fn where_(
    config: &Config,
    archive: bool,
    shelves: bool,
    bookmarks: bool,
    output: &Output,
) -> Result<()> {
    let single = if archive {
        Some(config.archive_dir())
    } else if shelves {
        Some(config.shelves_dir())
    } else if bookmarks {
        Some(config.bookmarks_dir())
    } else {
        None
    };

    if let Some(path) = single {
        println!("{}", path.display());
        return Ok(());
    }

    match output.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "library": config.library_dir,
                "archive": config.archive_dir(),
                "shelves": config.shelves_dir(),
                "bookmarks": config.bookmarks_dir(),
            })
        ),
        OutputFormat::Quiet => println!("{}", config.library_dir.display()),
        OutputFormat::Human => {
            println!("library:   {}", config.library_dir.display());
            println!("archive:   {}", config.archive_dir().display());
            println!("shelves:   {}", config.shelves_dir().display());
            println!("bookmarks: {}", config.bookmarks_dir().display());
        }
    }
    Ok(())
}

/// Split a comma-separated tag list
fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("ml, robotics,,"), vec!["ml", "robotics"]);
        assert!(parse_tags("").is_empty());
    }
}
