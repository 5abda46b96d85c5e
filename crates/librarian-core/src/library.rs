//! Unified library interface
//!
//! The `Library` ties the archive, the link resolver and the rekey engine to
//! one configuration. It is the entry point callers use; the components stay
//! available for finer-grained work.
//!
//! ## Usage
//!
//! ```ignore
//! let library = Library::open()?;
//!
//! let entry = library.add(Path::new("paper.pdf"), Path::new("paper.bib"), AddMode::Copy)?;
//! library.link(&entry.key, Path::new("shelves/ai/paper.pdf"))?;
//!
//! let report = library.rekey(&entry.key, "smith2020b")?;
//! for path in report.unrepaired_paths() {
//!     eprintln!("fix by hand: {}", path.display());
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::archive::{AddMode, Archive, ArchiveListing};
use crate::config::Config;
use crate::error::{LibraryError, LibraryResult};
use crate::links::{FixReport, LinkReport, LinkResolver, LinkWalk};
use crate::models::{sanitize_key, Entry, Link, Record};
use crate::query::{Query, QueryResult};
use crate::rekey::{RekeyReport, Rekeyer};

/// A document library rooted at `config.library_dir`
pub struct Library {
    archive: Archive,
    resolver: LinkResolver,
    config: Config,
}

impl Library {
    /// Open the library named by the loaded configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config).context("Failed to open library")
    }

    /// Open an existing library
    ///
    /// The library, archive and shelves directories must exist; the
    /// bookmarks tree is optional.
    pub fn open_with_config(config: Config) -> LibraryResult<Self> {
        for dir in [
            config.library_dir.clone(),
            config.archive_dir(),
            config.shelves_dir(),
        ] {
            if !dir.is_dir() {
                return Err(LibraryError::MissingDirectory { path: dir });
            }
        }
        Ok(Self::with_config(config))
    }

    /// Create the library layout if needed and open it
    pub fn create(config: Config) -> LibraryResult<Self> {
        for dir in [config.archive_dir(), config.shelves_dir()] {
            fs::create_dir_all(&dir).map_err(|e| LibraryError::from_io(e, &dir))?;
        }
        info!("Library ready at {:?}", config.library_dir);
        Ok(Self::with_config(config))
    }

    fn with_config(config: Config) -> Self {
        Self {
            archive: Archive::new(config.clone()),
            resolver: LinkResolver::new(config.archive_dir()),
            config,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn resolver(&self) -> &LinkResolver {
        &self.resolver
    }

    // ==================== Archive Operations ====================

    /// Archive a document with its metadata
    pub fn add(&self, document: &Path, metadata: &Path, mode: AddMode) -> LibraryResult<Entry> {
        self.archive.add(document, metadata, mode)
    }

    /// Locate an entry; accepts shell-completed paths such as `archive/key/`
    pub fn resolve(&self, key: &str) -> LibraryResult<Entry> {
        self.archive.resolve(&sanitize_key(key))
    }

    /// Parsed metadata of an entry
    pub fn record(&self, key: &str) -> LibraryResult<Record> {
        self.archive.record(&sanitize_key(key))
    }

    pub fn list(&self) -> LibraryResult<ArchiveListing> {
        self.archive.list()
    }

    /// Replace an entry's tags
    pub fn set_tags(&self, key: &str, tags: &[String]) -> LibraryResult<Record> {
        self.archive.set_tags(&sanitize_key(key), tags)
    }

    /// Record that an entry was opened today
    pub fn touch_accessed(&self, key: &str) -> LibraryResult<()> {
        self.archive.touch_accessed(&sanitize_key(key))
    }

    /// Every entry's metadata as one BibTeX text
    pub fn compile_bibtex(&self) -> LibraryResult<String> {
        self.archive.compile_bibtex()
    }

    pub fn query(&self, query: &Query) -> LibraryResult<QueryResult> {
        query.run(&self.archive)
    }

    // ==================== Rekey Operations ====================

    /// Change an entry's key and repair the links to it
    pub fn rekey(&self, old_key: &str, new_key: &str) -> LibraryResult<RekeyReport> {
        self.rekeyer().rekey(&sanitize_key(old_key), new_key)
    }

    /// Adopt the key an entry's metadata declares
    pub fn rename(&self, key: &str) -> LibraryResult<RekeyReport> {
        self.rekeyer().rename(&sanitize_key(key))
    }

    fn rekeyer(&self) -> Rekeyer<'_> {
        Rekeyer::new(&self.archive, &self.resolver, self.config.link_roots())
    }

    // ==================== Link Operations ====================

    /// Walk the shelves and bookmarks trees
    pub fn walk_links(&self) -> LinkWalk<'_> {
        self.resolver.walk(self.config.link_roots())
    }

    /// Walk arbitrary roots
    pub fn walk_links_under(&self, roots: &[PathBuf]) -> LinkWalk<'_> {
        self.resolver.walk(roots)
    }

    /// Classify every link under `roots` (shelves and bookmarks when empty)
    pub fn check_links(&self, roots: &[PathBuf]) -> LinkReport {
        if roots.is_empty() {
            self.resolver.check(self.config.link_roots())
        } else {
            self.resolver.check(roots)
        }
    }

    /// Links under `roots` pointing at an entry (shelves and bookmarks when empty)
    pub fn links_to(&self, key: &str, roots: &[PathBuf]) -> (Vec<Link>, Vec<LibraryError>) {
        let key = sanitize_key(key);
        if roots.is_empty() {
            self.resolver.links_to(&key, self.config.link_roots())
        } else {
            self.resolver.links_to(&key, roots)
        }
    }

    /// Link an entry's document at `path`
    ///
    /// A relative `path` is taken relative to the shelves directory; an
    /// existing directory gets a `<key>.<ext>` link inside it.
    pub fn link(&self, key: &str, path: &Path) -> LibraryResult<Link> {
        let entry = self.resolve(key)?;
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.shelves_dir().join(path)
        };
        let path = if path.is_dir() && !is_symlink(&path) {
            path.join(document_file_name(&entry))
        } else {
            path
        };
        self.resolver.create_link(&entry.document_path, &path)
    }

    /// Bookmark an entry under `name` (its key when `None`)
    pub fn bookmark(&self, key: &str, name: Option<&str>) -> LibraryResult<Link> {
        let entry = self.resolve(key)?;
        let bookmarks = self.config.bookmarks_dir();
        fs::create_dir_all(&bookmarks).map_err(|e| LibraryError::from_io(e, &bookmarks))?;

        let file_name = match name {
            Some(name) => format!("{}.{}", name, self.config.document_ext),
            None => document_file_name(&entry),
        };
        self.resolver
            .create_link(&entry.document_path, &bookmarks.join(file_name))
    }

    /// Repair one dangling link
    pub fn fix_link(&self, path: &Path) -> LibraryResult<bool> {
        self.resolver.fix_link(&self.archive, path)
    }

    /// Repair every dangling link under a directory
    pub fn fix_links(&self, dir: &Path) -> FixReport {
        self.resolver.fix_links(&self.archive, dir)
    }
}

fn document_file_name(entry: &Entry) -> String {
    entry
        .document_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.key.clone())
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinkKind;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Library) {
        let dir = TempDir::new().unwrap();
        let library = Library::create(Config::for_library(dir.path().join("lib"))).unwrap();
        (dir, library)
    }

    fn add(dir: &TempDir, library: &Library, key: &str) -> Entry {
        let doc = dir.path().join(format!("{}.pdf", key));
        let bib = dir.path().join(format!("{}.bib", key));
        fs::write(&doc, b"%PDF").unwrap();
        fs::write(&bib, format!("@article{{{}, title = {{T}}}}", key)).unwrap();
        library.add(&doc, &bib, AddMode::Copy).unwrap()
    }

    #[test]
    fn test_open_requires_layout() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_library(dir.path().join("nowhere"));
        assert!(matches!(
            Library::open_with_config(config.clone()),
            Err(LibraryError::MissingDirectory { .. })
        ));

        Library::create(config.clone()).unwrap();
        assert!(Library::open_with_config(config).is_ok());
    }

    #[test]
    fn test_resolve_sanitizes_key() {
        let (dir, library) = setup();
        add(&dir, &library, "smith2020");
        assert_eq!(library.resolve("archive/smith2020/").unwrap().key, "smith2020");
    }

    #[cfg(unix)]
    #[test]
    fn test_link_into_directory_and_bookmark() {
        let (dir, library) = setup();
        let entry = add(&dir, &library, "smith2020");
        fs::create_dir_all(library.config().shelves_dir().join("ai")).unwrap();

        let link = library.link("smith2020", Path::new("ai")).unwrap();
        assert_eq!(
            link.link_path,
            library.config().shelves_dir().join("ai/smith2020.pdf")
        );
        assert_eq!(link.kind, LinkKind::Valid);

        assert!(matches!(
            library.link("smith2020", Path::new("ai")),
            Err(LibraryError::LinkExists { .. })
        ));

        let mark = library.bookmark("smith2020", Some("grasping")).unwrap();
        assert_eq!(
            mark.link_path,
            library.config().bookmarks_dir().join("grasping.pdf")
        );
        assert_eq!(fs::read_link(&mark.link_path).unwrap(), entry.document_path);

        let (links, errors) = library.links_to("smith2020", &[]);
        assert!(errors.is_empty());
        assert_eq!(links.len(), 2);

        let bookmarks = vec![library.config().bookmarks_dir()];
        let (links, _) = library.links_to("smith2020", &bookmarks);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_path, mark.link_path);
    }

    #[test]
    fn test_check_links_defaults_to_library_roots() {
        let (dir, library) = setup();
        add(&dir, &library, "smith2020");
        library.link("smith2020", Path::new("a.pdf")).unwrap();

        let report = library.check_links(&[]);
        assert_eq!(report.valid.len(), 1);
        assert!(report.dangling.is_empty());
        assert_eq!(library.walk_links().count(), 1);
    }
}
