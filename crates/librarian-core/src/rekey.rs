//! Rekey/rename engine
//!
//! Changing a key moves the entry and then repairs every link that pointed
//! at it. The steps run in a fixed order:
//!
//! 1. validate both keys
//! 2. discover links to the old key (snapshot, before anything changes)
//! 3. move the entry (the commit point; undone completely on failure)
//! 4. repair each link independently
//!
//! A failed repair never undoes the move. It is reported in
//! `RekeyOutcome::SucceededWithUnrepairedLinks` so the link can be fixed by
//! hand.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::bibtex;
use crate::error::{LibraryError, LibraryResult};
use crate::links::LinkResolver;
use crate::metadata::MetadataFile;
use crate::models::{validate_key, Entry, Link, LinkShape};
use crate::persistence::{atomic_write, replace_symlink};

/// Terminal state of a rekey
#[derive(Debug)]
pub enum RekeyOutcome {
    /// Entry moved and every discovered link repaired
    FullySucceeded,
    /// Entry moved; these links still point at the old key
    SucceededWithUnrepairedLinks(Vec<LibraryError>),
}

/// Everything a rekey did
#[derive(Debug)]
pub struct RekeyReport {
    pub old_key: String,
    pub new_key: String,
    /// The entry under its new key
    pub entry: Entry,
    /// Links now pointing at the new key
    pub repaired: Vec<PathBuf>,
    /// Directories that could not be searched for links
    pub traversal_errors: Vec<LibraryError>,
    pub outcome: RekeyOutcome,
}

impl RekeyReport {
    /// Whether every discovered link was repaired
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, RekeyOutcome::FullySucceeded)
    }

    /// Paths of the links that could not be repaired
    pub fn unrepaired_paths(&self) -> Vec<&Path> {
        match &self.outcome {
            RekeyOutcome::FullySucceeded => Vec::new(),
            RekeyOutcome::SucceededWithUnrepairedLinks(errors) => errors
                .iter()
                .filter_map(|e| match e {
                    LibraryError::LinkRepairFailed { path, .. } => Some(path.as_path()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Moves entries to new keys and repairs their links
pub struct Rekeyer<'a> {
    archive: &'a Archive,
    resolver: &'a LinkResolver,
    roots: Vec<PathBuf>,
}

impl<'a> Rekeyer<'a> {
    /// Create an engine searching `roots` for links
    pub fn new(archive: &'a Archive, resolver: &'a LinkResolver, roots: Vec<PathBuf>) -> Self {
        Self {
            archive,
            resolver,
            roots,
        }
    }

    /// Change the key of `old_key` to `new_key`
    pub fn rekey(&self, old_key: &str, new_key: &str) -> LibraryResult<RekeyReport> {
        validate_key(new_key)?;
        if self.archive.contains(new_key) || self.archive.locate(new_key).directory_path.exists() {
            return Err(LibraryError::DuplicateKey {
                key: new_key.to_string(),
            });
        }
        let old = self.archive.resolve(old_key)?;
        let metadata = MetadataFile::read(&old.metadata_path)?;

        let (links, traversal_errors) = self.resolver.links_to(old_key, &self.roots);
        debug!("Found {} link(s) to {}", links.len(), old_key);

        let new = self.archive.locate(new_key);
        move_entry(&old, &new, &metadata)?;
        info!("Moved {} to {}", old_key, new_key);

        let mut repaired = Vec::new();
        let mut failed = Vec::new();
        for link in links {
            let target = repaired_target(&link, old_key, &new);
            match replace_symlink(&link.link_path, &target) {
                Ok(()) => {
                    debug!("Repaired {:?} -> {:?}", link.link_path, target);
                    repaired.push(link.link_path);
                }
                Err(source) => {
                    let error = LibraryError::LinkRepairFailed {
                        path: link.link_path,
                        source,
                    };
                    warn!("{}", error);
                    failed.push(error);
                }
            }
        }

        let outcome = if failed.is_empty() {
            RekeyOutcome::FullySucceeded
        } else {
            RekeyOutcome::SucceededWithUnrepairedLinks(failed)
        };

        Ok(RekeyReport {
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
            entry: new,
            repaired,
            traversal_errors,
            outcome,
        })
    }

    /// Adopt the key the entry's metadata now declares
    ///
    /// Fails with `KeyUnchanged` when the metadata still names `key`.
    pub fn rename(&self, key: &str) -> LibraryResult<RekeyReport> {
        let entry = self.archive.resolve(key)?;
        let metadata = MetadataFile::read(&entry.metadata_path)?;
        if metadata.key() == key {
            return Err(LibraryError::KeyUnchanged {
                key: key.to_string(),
            });
        }
        let new_key = metadata.key().to_string();
        self.rekey(key, &new_key)
    }
}

/// A move sub-step that can be undone
enum Undo {
    Rename { from: PathBuf, to: PathBuf },
    Restore { path: PathBuf, text: String },
}

impl Undo {
    fn apply(self) {
        let result = match &self {
            Undo::Rename { from, to } => fs::rename(to, from).map_err(|e| (to, e.to_string())),
            Undo::Restore { path, text } => {
                atomic_write(path, text.as_bytes()).map_err(|e| (path, e.to_string()))
            }
        };
        if let Err((path, e)) = result {
            warn!("Could not roll back {:?}: {}", path, e);
        }
    }
}

/// Rename both files, rewrite the metadata key and rename the directory
///
/// On error every completed sub-step is undone in reverse order.
fn move_entry(old: &Entry, new: &Entry, metadata: &MetadataFile) -> LibraryResult<()> {
    let mut done: Vec<Undo> = Vec::new();

    let result = (|| {
        let document = old.directory_path.join(file_name(&new.document_path));
        rename(&old.document_path, &document, &mut done)?;

        let metadata_path = old.directory_path.join(file_name(&new.metadata_path));
        rename(&old.metadata_path, &metadata_path, &mut done)?;

        if metadata.key() != new.key {
            let text = bibtex::replace_cite_key(&metadata.text, &metadata.entry, &new.key);
            atomic_write(&metadata_path, text.as_bytes())?;
            done.push(Undo::Restore {
                path: metadata_path,
                text: metadata.text.clone(),
            });
        }

        rename(&old.directory_path, &new.directory_path, &mut done)
    })();

    if result.is_err() {
        for step in done.into_iter().rev() {
            step.apply();
        }
    }
    result
}

fn rename(from: &Path, to: &Path, done: &mut Vec<Undo>) -> LibraryResult<()> {
    fs::rename(from, to).map_err(|e| LibraryError::from_io(e, from))?;
    done.push(Undo::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    });
    Ok(())
}

fn file_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

/// The target a link should carry once `old_key` is `new`
///
/// The key components of the stored target are swapped in place so a
/// relative link stays relative. Targets that do not end in the expected
/// components are pointed at the new entry by absolute path.
fn repaired_target(link: &Link, old_key: &str, new: &Entry) -> PathBuf {
    let target = &link.target;
    let name = target.file_name().map(|n| n.to_string_lossy().into_owned());

    match link.shape {
        LinkShape::File => {
            let suffix = name
                .as_deref()
                .and_then(|n| n.strip_prefix(old_key))
                .filter(|rest| rest.starts_with('.'))
                .map(str::to_string);
            let dir = target.parent().filter(|p| p.file_name().is_some_and(|d| d == old_key));

            match (dir.and_then(Path::parent), suffix) {
                (Some(base), Some(suffix)) => {
                    base.join(&new.key).join(format!("{}{}", new.key, suffix))
                }
                (_, Some(suffix)) => new.directory_path.join(format!("{}{}", new.key, suffix)),
                (_, None) => new.document_path.clone(),
            }
        }
        LinkShape::Directory | LinkShape::Other => match (target.parent(), name.as_deref()) {
            (Some(base), Some(n)) if n == old_key => base.join(&new.key),
            _ => new.directory_path.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::links::normalize;
    use crate::models::LinkKind;
    use crate::persistence::make_symlink;
    use tempfile::TempDir;

    fn setup(keys: &[&str]) -> (TempDir, Archive, LinkResolver) {
        let dir = TempDir::new().unwrap();
        let config = Config::for_library(dir.path());
        fs::create_dir_all(config.shelves_dir()).unwrap();
        for key in keys {
            let entry = Entry::locate(&config, key);
            fs::create_dir_all(&entry.directory_path).unwrap();
            fs::write(&entry.document_path, format!("%PDF {}", key)).unwrap();
            fs::write(
                &entry.metadata_path,
                format!("% {} notes\n@article{{{},\n  title = {{T}},\n}}\n", key, key),
            )
            .unwrap();
        }
        let resolver = LinkResolver::new(config.archive_dir());
        (dir, Archive::new(config), resolver)
    }

    fn engine<'a>(archive: &'a Archive, resolver: &'a LinkResolver) -> Rekeyer<'a> {
        Rekeyer::new(archive, resolver, archive.config().link_roots())
    }

    #[test]
    fn test_rekey_moves_entry_and_rewrites_key() {
        let (_dir, archive, resolver) = setup(&["smith2020"]);

        let report = engine(&archive, &resolver).rekey("smith2020", "smith2020b").unwrap();
        assert!(report.is_complete());
        assert!(!archive.contains("smith2020"));

        let entry = archive.resolve("smith2020b").unwrap();
        assert_eq!(fs::read_to_string(&entry.document_path).unwrap(), "%PDF smith2020");
        // Only the key changed in the metadata
        assert_eq!(
            fs::read_to_string(&entry.metadata_path).unwrap(),
            "% smith2020 notes\n@article{smith2020b,\n  title = {T},\n}\n"
        );
    }

    #[test]
    fn test_rekey_validation_leaves_archive_untouched() {
        let (_dir, archive, resolver) = setup(&["smith2020", "doe2019"]);
        let rekeyer = engine(&archive, &resolver);

        assert!(matches!(
            rekeyer.rekey("smith2020", "doe2019"),
            Err(LibraryError::DuplicateKey { .. })
        ));
        assert!(matches!(
            rekeyer.rekey("ghost", "ghost2"),
            Err(LibraryError::NotFound { .. })
        ));
        assert!(matches!(
            rekeyer.rekey("smith2020", "../escape"),
            Err(LibraryError::InvalidKey { .. })
        ));
        assert!(archive.resolve("smith2020").is_ok());
        assert!(archive.resolve("doe2019").is_ok());
    }

    #[test]
    fn test_rekey_malformed_metadata_aborts() {
        let (_dir, archive, resolver) = setup(&["smith2020"]);
        let entry = archive.locate("smith2020");
        fs::write(&entry.metadata_path, "no entry here").unwrap();

        assert!(matches!(
            engine(&archive, &resolver).rekey("smith2020", "smith2021"),
            Err(LibraryError::MalformedMetadata { .. })
        ));
        assert!(entry.document_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_rekey_repairs_links_of_both_shapes() {
        let (_dir, archive, resolver) = setup(&["smith2020", "doe2019"]);
        let shelves = archive.config().shelves_dir();
        fs::create_dir_all(shelves.join("ai")).unwrap();

        let absolute = shelves.join("ai/smith2020.pdf");
        make_symlink(&archive.locate("smith2020").document_path, &absolute).unwrap();
        let relative = shelves.join("ai/paper");
        make_symlink(Path::new("../../archive/smith2020"), &relative).unwrap();
        let bib = shelves.join("smith.bib");
        make_symlink(Path::new("../archive/smith2020/smith2020.bib"), &bib).unwrap();
        let other = shelves.join("doe.pdf");
        make_symlink(&archive.locate("doe2019").document_path, &other).unwrap();

        let report = engine(&archive, &resolver).rekey("smith2020", "smith2020b").unwrap();
        assert!(report.is_complete());
        assert_eq!(report.repaired.len(), 3);

        let new = archive.locate("smith2020b");
        assert_eq!(fs::read_link(&absolute).unwrap(), new.document_path);
        assert_eq!(
            fs::read_link(&relative).unwrap(),
            PathBuf::from("../../archive/smith2020b")
        );
        assert_eq!(
            fs::read_link(&bib).unwrap(),
            PathBuf::from("../archive/smith2020b/smith2020b.bib")
        );
        // Unrelated links are left alone
        assert_eq!(
            fs::read_link(&other).unwrap(),
            archive.locate("doe2019").document_path
        );

        for path in [&absolute, &relative, &bib] {
            let link = resolver.classify(path).unwrap();
            assert_eq!(link.kind, LinkKind::Valid);
            assert!(link.targets("smith2020b"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_rekey_round_trip_restores_targets() {
        let (_dir, archive, resolver) = setup(&["smith2020"]);
        let shelves = archive.config().shelves_dir();
        let link = shelves.join("s.pdf");
        let original = PathBuf::from("../archive/smith2020/smith2020.pdf");
        make_symlink(&original, &link).unwrap();
        let before = archive.locate("smith2020");

        let rekeyer = engine(&archive, &resolver);
        rekeyer.rekey("smith2020", "tmp").unwrap();
        rekeyer.rekey("tmp", "smith2020").unwrap();

        assert_eq!(archive.resolve("smith2020").unwrap(), before);
        assert_eq!(fs::read_link(&link).unwrap(), original);
    }

    #[cfg(unix)]
    #[test]
    fn test_unrepairable_link_is_reported_and_move_kept() {
        let (_dir, archive, resolver) = setup(&["smith2020"]);
        let shelves = archive.config().shelves_dir();
        let blocked_dir = shelves.join("blocked");
        fs::create_dir_all(&blocked_dir).unwrap();
        let blocked = blocked_dir.join("s.pdf");
        let open = shelves.join("s.pdf");
        let doc = archive.locate("smith2020").document_path;
        make_symlink(&doc, &blocked).unwrap();
        make_symlink(&doc, &open).unwrap();
        // A non-empty directory occupies the replacement's temp path
        fs::create_dir_all(blocked_dir.join(".s.pdf.librarian-tmp/keep")).unwrap();

        let report = engine(&archive, &resolver)
            .rekey("smith2020", "smith2020b")
            .unwrap();

        assert!(archive.resolve("smith2020b").is_ok());
        assert!(!archive.contains("smith2020"));
        assert_eq!(report.repaired, vec![open]);
        assert!(!report.is_complete());
        assert_eq!(report.unrepaired_paths(), vec![blocked.as_path()]);
        assert_eq!(fs::read_link(&blocked).unwrap(), doc);
    }

    #[test]
    fn test_failed_move_rolls_back() {
        let (_dir, archive, resolver) = setup(&["smith2020"]);
        let old = archive.locate("smith2020");
        // A non-empty directory where the renamed metadata file must go
        let blocker = old.directory_path.join("smith2021.bib");
        fs::create_dir_all(blocker.join("x")).unwrap();

        let err = engine(&archive, &resolver)
            .rekey("smith2020", "smith2021")
            .unwrap_err();
        assert!(matches!(err, LibraryError::Io { .. }));

        // Document rename was undone
        assert!(old.document_path.is_file());
        assert!(old.metadata_path.is_file());
        assert!(!old.directory_path.join("smith2021.pdf").exists());
        assert!(!archive.locate("smith2021").directory_path.exists());
    }

    #[test]
    fn test_rename_adopts_metadata_key() {
        let (_dir, archive, resolver) = setup(&["smith2020"]);
        let rekeyer = engine(&archive, &resolver);

        assert!(matches!(
            rekeyer.rename("smith2020"),
            Err(LibraryError::KeyUnchanged { .. })
        ));

        let entry = archive.locate("smith2020");
        fs::write(&entry.metadata_path, "@article{smith2020grasp, title={T}}").unwrap();
        let report = rekeyer.rename("smith2020").unwrap();
        assert_eq!(report.new_key, "smith2020grasp");
        assert!(archive.resolve("smith2020grasp").is_ok());
        assert_eq!(archive.record("smith2020grasp").unwrap().key, "smith2020grasp");
    }

    #[test]
    fn test_repaired_target_falls_back_to_absolute() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_library(dir.path());
        let new = Entry::locate(&config, "b");
        let link = Link {
            link_path: PathBuf::from("/x/l"),
            target: PathBuf::from("/elsewhere/a.pdf"),
            resolved: normalize(Path::new("/elsewhere/a.pdf")),
            target_key: Some("a".to_string()),
            in_archive: true,
            kind: LinkKind::Valid,
            shape: LinkShape::File,
        };
        assert_eq!(
            repaired_target(&link, "a", &new),
            new.directory_path.join("b.pdf")
        );
    }
}
