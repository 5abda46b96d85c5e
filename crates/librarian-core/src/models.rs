//! Data models for the library
//!
//! Defines the core data structures: `Entry` (an archived document and its
//! metadata), `Record` (the parsed metadata) and `Link` (a symlink found in a
//! shelf or bookmark tree), plus the rules that make a key usable as a
//! directory and file name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{LibraryError, LibraryResult};

/// Hidden directory inside an entry holding side records
pub const SIDE_RECORD_DIR: &str = ".metadata";

/// An archived document: one directory named after the key, holding
/// `<key>.<document_ext>` and `<key>.<metadata_ext>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// Unique key, also the directory name
    pub key: String,
    /// The entry directory
    pub directory_path: PathBuf,
    /// The primary document
    pub document_path: PathBuf,
    /// The BibTeX metadata file
    pub metadata_path: PathBuf,
}

impl Entry {
    /// Canonical paths of the entry with this key (no filesystem access)
    pub fn locate(config: &Config, key: &str) -> Self {
        let directory_path = config.archive_dir().join(key);
        Self {
            key: key.to_string(),
            document_path: directory_path.join(format!("{}.{}", key, config.document_ext)),
            metadata_path: directory_path.join(format!("{}.{}", key, config.metadata_ext)),
            directory_path,
        }
    }

    /// Directory holding the added/accessed side records
    pub fn side_record_dir(&self) -> PathBuf {
        self.directory_path.join(SIDE_RECORD_DIR)
    }

    /// Side record holding the date the entry was archived
    pub fn added_path(&self) -> PathBuf {
        self.side_record_dir().join("added.txt")
    }

    /// Side record holding the date the entry was last opened
    pub fn accessed_path(&self) -> PathBuf {
        self.side_record_dir().join("accessed.txt")
    }
}

/// Parsed view of an entry's metadata file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Record {
    pub key: String,
    pub title: Option<String>,
    /// Authors in the order they are listed
    pub authors: Vec<String>,
    pub year: Option<i32>,
    /// Journal, falling back to booktitle
    pub venue: Option<String>,
    /// BibTeX entry type, lowercased
    pub entry_type: Option<String>,
    pub tags: BTreeSet<String>,
    /// When the entry was archived
    pub added: Option<DateTime<Utc>>,
    /// When the entry was last opened
    pub accessed: Option<DateTime<Utc>>,
}

impl Record {
    /// Create an empty record for a key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Check whether the record carries a tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// How a link was classified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Resolves to an existing file or directory of an archive entry
    Valid,
    /// Target does not exist
    Dangling,
    /// Target exists outside the archive
    Foreign,
}

/// What part of an entry a link points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LinkShape {
    /// `archive/<key>/<key>.<ext>`
    File,
    /// `archive/<key>`
    Directory,
    /// Anything else
    Other,
}

/// A symlink discovered under a shelf or bookmark tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    /// Where the link lives
    pub link_path: PathBuf,
    /// The target exactly as stored in the link
    pub target: PathBuf,
    /// The target made absolute and lexically normalized
    pub resolved: PathBuf,
    /// Key named by the target, when it names one
    pub target_key: Option<String>,
    /// Whether the resolved target sits inside this library's archive
    pub in_archive: bool,
    pub kind: LinkKind,
    pub shape: LinkShape,
}

impl Link {
    /// Check whether this link points (or pointed) into the entry `key`
    pub fn targets(&self, key: &str) -> bool {
        self.in_archive && self.target_key.as_deref() == Some(key)
    }
}

/// Validate that a key can be used as a directory and file name
pub fn validate_key(key: &str) -> LibraryResult<()> {
    let invalid = |reason| {
        Err(LibraryError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.is_empty() {
        return invalid("key is empty");
    }
    if key.starts_with('.') {
        return invalid("key must not start with '.'");
    }
    if key.len() > 200 {
        return invalid("key is longer than 200 bytes");
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+')))
    {
        return if c == '/' || c == '\\' {
            invalid("key must not contain path separators")
        } else {
            invalid("key may only contain letters, digits and _-:.+")
        };
    }
    Ok(())
}

/// Clean up a user-supplied key
///
/// Shell completion may leave a trailing slash or a nested path such as
/// `archive/smith2020/`; only the last component is the key.
pub fn sanitize_key(key: &str) -> String {
    let trimmed = key.trim().trim_end_matches('/');
    Path::new(trimmed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_locate() {
        let config = Config::for_library("/lib");
        let entry = Entry::locate(&config, "smith2020");

        assert_eq!(entry.directory_path, PathBuf::from("/lib/archive/smith2020"));
        assert_eq!(
            entry.document_path,
            PathBuf::from("/lib/archive/smith2020/smith2020.pdf")
        );
        assert_eq!(
            entry.metadata_path,
            PathBuf::from("/lib/archive/smith2020/smith2020.bib")
        );
        assert!(entry.added_path().ends_with(".metadata/added.txt"));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("smith2020").is_ok());
        assert!(validate_key("Smith:2020-ml_v2.1+x").is_ok());

        for bad in ["", ".hidden", "a/b", "a\\b", "has space", "semi;colon"] {
            assert!(
                matches!(validate_key(bad), Err(LibraryError::InvalidKey { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("smith2020"), "smith2020");
        assert_eq!(sanitize_key("smith2020/"), "smith2020");
        assert_eq!(sanitize_key("archive/smith2020/"), "smith2020");
        assert_eq!(sanitize_key(" doe2019 "), "doe2019");
    }

    #[test]
    fn test_link_targets_requires_archive() {
        let mut link = Link {
            link_path: PathBuf::from("/lib/shelves/a"),
            target: PathBuf::from("/old/archive/smith2020/smith2020.pdf"),
            resolved: PathBuf::from("/old/archive/smith2020/smith2020.pdf"),
            target_key: Some("smith2020".to_string()),
            in_archive: false,
            kind: LinkKind::Dangling,
            shape: LinkShape::File,
        };
        assert!(!link.targets("smith2020"));

        link.in_archive = true;
        assert!(link.targets("smith2020"));
        assert!(!link.targets("doe2019"));

        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["kind"], "dangling");
        assert_eq!(json["shape"], "file");
    }
}
