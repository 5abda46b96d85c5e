//! Archive store
//!
//! Owns the canonical entries under `<library>/archive`. Each entry is one
//! directory named after its key holding `<key>.<document_ext>` and
//! `<key>.<metadata_ext>`, plus an optional hidden side-record directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::bibtex;
use crate::config::Config;
use crate::error::{LibraryError, LibraryResult};
use crate::metadata::{self, MetadataFile};
use crate::models::{validate_key, Entry, Record};
use crate::persistence::{atomic_write, write_side_date};

/// How `add` treats the source files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddMode {
    /// Leave the sources in place
    #[default]
    Copy,
    /// Remove the sources once the entry is complete
    Move,
}

/// Result of enumerating the archive
#[derive(Debug, Default)]
pub struct ArchiveListing {
    /// Well-formed entries, sorted by key
    pub entries: Vec<Entry>,
    /// Entries that could not be listed (`CorruptEntry`, unreadable dirs)
    pub errors: Vec<LibraryError>,
}

/// The canonical archive
#[derive(Debug, Clone)]
pub struct Archive {
    config: Config,
}

impl Archive {
    /// Create an archive handle for the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The archive directory
    pub fn dir(&self) -> PathBuf {
        self.config.archive_dir()
    }

    /// Canonical paths for a key, without checking the filesystem
    pub fn locate(&self, key: &str) -> Entry {
        Entry::locate(&self.config, key)
    }

    /// Check whether an entry directory exists for this key
    pub fn contains(&self, key: &str) -> bool {
        validate_key(key).is_ok() && self.locate(key).directory_path.is_dir()
    }

    /// Locate the entry with exactly this key
    pub fn resolve(&self, key: &str) -> LibraryResult<Entry> {
        if !self.contains(key) {
            return Err(LibraryError::NotFound {
                key: key.to_string(),
            });
        }

        let entry = self.locate(key);
        check_complete(&entry)?;
        Ok(entry)
    }

    /// Add a document and its metadata as a new entry
    ///
    /// The key comes from the metadata. Either the entry is created with
    /// both files in place or nothing is left behind.
    pub fn add(&self, document: &Path, metadata_src: &Path, mode: AddMode) -> LibraryResult<Entry> {
        let key = MetadataFile::read(metadata_src)?.key().to_string();
        validate_key(&key)?;

        if !document.is_file() {
            return Err(LibraryError::from_io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "document not found"),
                document,
            ));
        }

        let entry = self.locate(&key);
        if entry.directory_path.exists() {
            return Err(LibraryError::DuplicateKey { key });
        }

        let pending = PendingEntry::create(&entry)?;

        fs::copy(document, &entry.document_path)
            .map_err(|e| LibraryError::from_io(e, &entry.document_path))?;
        fs::copy(metadata_src, &entry.metadata_path)
            .map_err(|e| LibraryError::from_io(e, &entry.metadata_path))?;
        write_side_date(&entry.added_path(), Utc::now())?;

        pending.commit();
        info!("Archived {} to {:?}", key, entry.directory_path);

        if mode == AddMode::Move {
            for source in [document, metadata_src] {
                if let Err(e) = fs::remove_file(source) {
                    warn!("Archived {} but could not remove {:?}: {}", key, source, e);
                }
            }
        }

        Ok(entry)
    }

    /// Enumerate every entry
    ///
    /// Incomplete entries are reported as `CorruptEntry` and skipped; the
    /// rest of the archive is still listed.
    pub fn list(&self) -> LibraryResult<ArchiveListing> {
        let dir = self.dir();
        let read = fs::read_dir(&dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LibraryError::MissingDirectory { path: dir.clone() },
            _ => LibraryError::from_io(e, &dir),
        })?;

        let mut listing = ArchiveListing::default();
        for item in read {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    listing.errors.push(LibraryError::from_io(e, &dir));
                    continue;
                }
            };

            let name = item.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !item.path().is_dir() {
                debug!("Skipping non-entry {:?} in archive", item.path());
                continue;
            }

            let entry = self.locate(&name);
            match check_complete(&entry) {
                Ok(()) => listing.entries.push(entry),
                Err(e) => {
                    warn!("{}", e);
                    listing.errors.push(e);
                }
            }
        }

        listing.entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listing)
    }

    /// Keys of all entry directories, sorted
    pub fn keys(&self) -> LibraryResult<Vec<String>> {
        let listing = self.list()?;
        Ok(listing.entries.into_iter().map(|e| e.key).collect())
    }

    /// Load the parsed record of an entry
    pub fn record(&self, key: &str) -> LibraryResult<Record> {
        metadata::load_record(&self.resolve(key)?)
    }

    /// Replace the tags of an entry, rewriting its metadata file
    pub fn set_tags(&self, key: &str, tags: &[String]) -> LibraryResult<Record> {
        let entry = self.resolve(key)?;
        let mut file = MetadataFile::read(&entry.metadata_path)?;
        // Re-emitting a damaged entry would drop the fields after the damage
        if !file.entry.complete {
            return Err(LibraryError::MalformedMetadata {
                path: entry.metadata_path,
                details: "entry is not closed; fix it before editing tags".to_string(),
            });
        }

        let mut tags: Vec<&str> = tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort_unstable();
        tags.dedup();

        if tags.is_empty() {
            file.entry.remove("tags");
        } else {
            file.entry.set("tags", tags.join(", "));
        }

        atomic_write(
            &entry.metadata_path,
            bibtex::format_entry(&file.entry).as_bytes(),
        )?;
        info!("Tagged {} with [{}]", key, tags.join(", "));

        metadata::load_record(&entry)
    }

    /// Record that an entry was accessed now
    pub fn touch_accessed(&self, key: &str) -> LibraryResult<()> {
        let entry = self.resolve(key)?;
        write_side_date(&entry.accessed_path(), Utc::now())
    }

    /// Concatenate every entry's metadata into one BibTeX document
    pub fn compile_bibtex(&self) -> LibraryResult<String> {
        let listing = self.list()?;
        let mut parts = Vec::with_capacity(listing.entries.len());
        for entry in &listing.entries {
            let text = fs::read_to_string(&entry.metadata_path)
                .map_err(|e| LibraryError::from_io(e, &entry.metadata_path))?;
            parts.push(text.trim().to_string());
        }
        Ok(parts.join("\n\n") + "\n")
    }
}

/// Verify both required files of an entry exist
fn check_complete(entry: &Entry) -> LibraryResult<()> {
    for required in [&entry.document_path, &entry.metadata_path] {
        if !required.is_file() {
            return Err(LibraryError::CorruptEntry {
                key: entry.key.clone(),
                missing: required.clone(),
            });
        }
    }
    Ok(())
}

/// An entry directory under construction
///
/// Removed on drop unless `commit` is called, so a failed `add` leaves no
/// partial entry behind.
struct PendingEntry {
    dir: PathBuf,
    committed: bool,
}

impl PendingEntry {
    fn create(entry: &Entry) -> LibraryResult<Self> {
        fs::create_dir(&entry.directory_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => LibraryError::DuplicateKey {
                key: entry.key.clone(),
            },
            std::io::ErrorKind::NotFound => LibraryError::MissingDirectory {
                path: entry
                    .directory_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            },
            _ => LibraryError::from_io(e, &entry.directory_path),
        })?;
        Ok(Self {
            dir: entry.directory_path.clone(),
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                warn!("Could not clean up partial entry {:?}: {}", self.dir, e);
            }
        }
    }
}
