//! Metadata parsing
//!
//! Turns an entry's BibTeX file into a `Record`. Only the key is required;
//! every other field is optional and left `None`/empty when absent.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::bibtex::{self, BibEntry};
use crate::error::{LibraryError, LibraryResult};
use crate::models::{Entry, Record};
use crate::persistence::read_side_date;

/// A metadata file read from disk, with its single entry parsed
#[derive(Debug, Clone)]
pub struct MetadataFile {
    /// The raw file contents
    pub text: String,
    /// The one entry in the file
    pub entry: BibEntry,
}

impl MetadataFile {
    /// Read and parse a metadata file
    ///
    /// Fails with `MalformedMetadata` when no entry (or more than one) can
    /// be located.
    pub fn read(path: &Path) -> LibraryResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| LibraryError::MalformedMetadata {
            path: path.to_path_buf(),
            details: format!("unreadable: {}", e),
        })?;
        let entry = single_entry(&text, path)?;
        Ok(Self { text, entry })
    }

    /// The key the metadata declares
    pub fn key(&self) -> &str {
        &self.entry.cite_key
    }

    /// Build a record from the parsed entry (dates are not filled in)
    pub fn record(&self) -> Record {
        record_from_entry(&self.entry)
    }
}

/// Parse a metadata file into a record
pub fn parse(path: &Path) -> LibraryResult<Record> {
    Ok(MetadataFile::read(path)?.record())
}

/// Load the full record of an archived entry
///
/// Checks that the metadata key equals the entry key and fills in the
/// added/accessed dates from side records or filesystem timestamps.
pub fn load_record(entry: &Entry) -> LibraryResult<Record> {
    let file = MetadataFile::read(&entry.metadata_path)?;
    if file.key() != entry.key {
        return Err(LibraryError::KeyMismatch {
            key: entry.key.clone(),
            metadata_key: file.key().to_string(),
            path: entry.metadata_path.clone(),
        });
    }

    let mut record = file.record();
    record.added = added_time(entry);
    record.accessed = accessed_time(entry);
    Ok(record)
}

fn single_entry(text: &str, path: &Path) -> LibraryResult<BibEntry> {
    let mut parsed = bibtex::parse(text);
    match parsed.entries.len() {
        0 => Err(LibraryError::MalformedMetadata {
            path: path.to_path_buf(),
            details: "no BibTeX entry with a key found".to_string(),
        }),
        1 => Ok(parsed.entries.remove(0)),
        n => Err(LibraryError::MalformedMetadata {
            path: path.to_path_buf(),
            details: format!("expected one entry, found {}", n),
        }),
    }
}

fn record_from_entry(entry: &BibEntry) -> Record {
    let text = |name: &str| {
        entry
            .get(name)
            .map(clean_value)
            .filter(|value| !value.is_empty())
    };

    let authors = text("author")
        .map(|value| split_authors(&value))
        .unwrap_or_default();

    let year = text("year").and_then(|value| value.parse::<i32>().ok());

    let tags = text("tags")
        .map(|value| {
            value
                .split(',')
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Record {
        key: entry.cite_key.clone(),
        title: text("title"),
        authors,
        year,
        venue: text("journal").or_else(|| text("booktitle")),
        entry_type: Some(entry.entry_type.clone()).filter(|t| !t.is_empty()),
        tags,
        added: None,
        accessed: None,
    }
}

/// Strip BibTeX grouping braces and collapse whitespace
pub fn clean_value(value: &str) -> String {
    value
        .replace(['{', '}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a BibTeX author list on the `and` separator
fn split_authors(value: &str) -> Vec<String> {
    value
        .split(" and ")
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Added time: side record, else the document's creation or modification time
fn added_time(entry: &Entry) -> Option<DateTime<Utc>> {
    read_side_date(&entry.added_path()).or_else(|| {
        let meta = fs::metadata(&entry.document_path).ok()?;
        meta.created()
            .or_else(|_| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    })
}

/// Accessed time: side record, else the document's access time
fn accessed_time(entry: &Entry) -> Option<DateTime<Utc>> {
    read_side_date(&entry.accessed_path()).or_else(|| {
        fs::metadata(&entry.document_path)
            .and_then(|meta| meta.accessed())
            .ok()
            .map(DateTime::<Utc>::from)
    })
}
