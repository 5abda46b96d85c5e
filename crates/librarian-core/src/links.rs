//! Link graph resolver
//!
//! Shelves and bookmarks are plain directory trees of symlinks into the
//! archive. Nothing records which links point at which entry, so every
//! question about links is answered by walking the trees:
//!
//! - `walk` lazily yields every symlink under a set of roots, classified as
//!   valid, dangling or foreign
//! - `links_to` filters a full walk down to the links naming one key
//!
//! Symlinks are never descended into, which keeps the walk inside the given
//! roots and makes cyclic links harmless. Unreadable directories are
//! reported as `TraversalError` items and the walk carries on.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::Archive;
use crate::error::{LibraryError, LibraryResult};
use crate::models::{Link, LinkKind, LinkShape};
use crate::persistence::{make_symlink, replace_symlink};

/// Classifies symlinks against one archive directory
#[derive(Debug, Clone)]
pub struct LinkResolver {
    archive_dir: PathBuf,
    /// Archive path with symlinks in its ancestry resolved
    canonical_archive: Option<PathBuf>,
}

impl LinkResolver {
    /// Create a resolver for the given archive directory
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        let archive_dir = normalize(&absolute(archive_dir.into()));
        let canonical_archive = fs::canonicalize(&archive_dir).ok();
        Self {
            archive_dir,
            canonical_archive,
        }
    }

    /// The archive directory links are resolved against
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Lazily walk every symlink under `roots`
    ///
    /// Each call starts a fresh traversal. Roots that do not exist are
    /// skipped.
    pub fn walk<I, P>(&self, roots: I) -> LinkWalk<'_>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        LinkWalk {
            resolver: self,
            roots: roots
                .into_iter()
                .map(|r| r.as_ref().to_path_buf())
                .collect::<Vec<_>>()
                .into_iter(),
            current: None,
        }
    }

    /// Every link under `roots` that points into the entry `key`
    ///
    /// The full walk is materialized before returning, so the caller gets a
    /// snapshot. Traversal errors are returned alongside the links.
    pub fn links_to<I, P>(&self, key: &str, roots: I) -> (Vec<Link>, Vec<LibraryError>)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut links = Vec::new();
        let mut errors = Vec::new();
        for item in self.walk(roots) {
            match item {
                Ok(link) if link.targets(key) => links.push(link),
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }
        (links, errors)
    }

    /// Walk `roots` and partition the links by kind
    pub fn check<I, P>(&self, roots: I) -> LinkReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = LinkReport::default();
        for item in self.walk(roots) {
            match item {
                Ok(link) => match link.kind {
                    LinkKind::Valid => report.valid.push(link),
                    LinkKind::Dangling => report.dangling.push(link),
                    LinkKind::Foreign => report.foreign.push(link),
                },
                Err(e) => report.errors.push(e),
            }
        }
        report
    }

    /// Read and classify a single symlink
    pub fn classify(&self, link_path: &Path) -> LibraryResult<Link> {
        let meta = fs::symlink_metadata(link_path)
            .map_err(|e| LibraryError::from_io(e, link_path))?;
        if !meta.file_type().is_symlink() {
            return Err(LibraryError::NotALink {
                path: link_path.to_path_buf(),
            });
        }

        let target = fs::read_link(link_path).map_err(|e| LibraryError::from_io(e, link_path))?;
        let base = link_path.parent().unwrap_or_else(|| Path::new("/"));
        let resolved = normalize(&absolute(base.join(&target)));

        let (shape, target_key) = shape_of(&resolved);
        let in_archive = match shape {
            LinkShape::File => resolved
                .parent()
                .and_then(Path::parent)
                .is_some_and(|dir| self.is_archive_dir(dir)),
            LinkShape::Directory => resolved
                .parent()
                .is_some_and(|dir| self.is_archive_dir(dir)),
            LinkShape::Other => false,
        };

        // exists() follows the whole chain; a valid link needs one real hop
        let exists = fs::metadata(&resolved).is_ok();
        let kind = match (exists, in_archive) {
            (false, _) => LinkKind::Dangling,
            (true, true) => {
                let is_dir = resolved.is_dir();
                let shape_matches = match shape {
                    LinkShape::File => !is_dir,
                    _ => is_dir,
                };
                if shape_matches && !is_symlink(&resolved) {
                    LinkKind::Valid
                } else {
                    LinkKind::Foreign
                }
            }
            (true, false) => LinkKind::Foreign,
        };

        Ok(Link {
            link_path: link_path.to_path_buf(),
            target,
            resolved,
            target_key: if kind == LinkKind::Foreign {
                None
            } else {
                target_key
            },
            in_archive: in_archive && kind != LinkKind::Foreign,
            kind,
            shape,
        })
    }

    /// Create a new link at `link_path` pointing to `target`
    pub fn create_link(&self, target: &Path, link_path: &Path) -> LibraryResult<Link> {
        if fs::symlink_metadata(link_path).is_ok() {
            return Err(LibraryError::LinkExists {
                path: link_path.to_path_buf(),
            });
        }
        if let Some(parent) = link_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LibraryError::from_io(e, parent))?;
            }
        }

        make_symlink(target, link_path).map_err(|e| LibraryError::from_io(e, link_path))?;
        info!("Linked {:?} -> {:?}", link_path, target);
        self.classify(link_path)
    }

    /// Repair a link left dangling by a moved library
    ///
    /// The key is read from the old target (`.../<key>/<key>.<ext>` or
    /// `.../<key>`) and the link is pointed at that entry in this archive.
    /// Returns `Ok(false)` when the link was already valid.
    pub fn fix_link(&self, archive: &Archive, link_path: &Path) -> LibraryResult<bool> {
        let link = self.classify(link_path)?;
        match link.kind {
            LinkKind::Valid => return Ok(false),
            LinkKind::Foreign => {
                return Err(LibraryError::NotALink {
                    path: link_path.to_path_buf(),
                })
            }
            LinkKind::Dangling => {}
        }

        let key = link.target_key.clone().ok_or_else(|| LibraryError::NotALink {
            path: link_path.to_path_buf(),
        })?;
        let entry = archive.resolve(&key)?;

        let new_target = match link.shape {
            LinkShape::Directory => entry.directory_path,
            _ => {
                // Keep pointing at the same file (document or metadata)
                let name = link
                    .resolved
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| entry.document_path.as_os_str().to_os_string());
                let candidate = entry.directory_path.join(name);
                if candidate.is_file() {
                    candidate
                } else {
                    entry.document_path
                }
            }
        };

        replace_symlink(link_path, &new_target).map_err(|source| {
            LibraryError::LinkRepairFailed {
                path: link_path.to_path_buf(),
                source,
            }
        })?;
        info!("Fixed {:?} -> {:?}", link_path, new_target);
        Ok(true)
    }

    /// Fix every dangling link under a tree
    pub fn fix_links(&self, archive: &Archive, root: &Path) -> FixReport {
        let mut report = FixReport::default();
        for item in self.walk([root]) {
            match item {
                Ok(link) if link.kind == LinkKind::Dangling => {
                    match self.fix_link(archive, &link.link_path) {
                        Ok(_) => report.fixed.push(link.link_path),
                        Err(e) => {
                            warn!("{}", e);
                            report.failed.push(e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => report.failed.push(e),
            }
        }
        report
    }

    fn is_archive_dir(&self, dir: &Path) -> bool {
        if dir == self.archive_dir {
            return true;
        }
        match (&self.canonical_archive, fs::canonicalize(dir)) {
            (Some(canonical), Ok(dir)) => *canonical == dir,
            _ => false,
        }
    }
}

/// Links under a set of roots, partitioned by kind
#[derive(Debug, Default, Serialize)]
pub struct LinkReport {
    pub valid: Vec<Link>,
    pub dangling: Vec<Link>,
    pub foreign: Vec<Link>,
    #[serde(skip)]
    pub errors: Vec<LibraryError>,
}

/// Outcome of fixing a tree of links
#[derive(Debug, Default)]
pub struct FixReport {
    pub fixed: Vec<PathBuf>,
    pub failed: Vec<LibraryError>,
}

/// Lazy traversal returned by `LinkResolver::walk`
pub struct LinkWalk<'a> {
    resolver: &'a LinkResolver,
    roots: std::vec::IntoIter<PathBuf>,
    current: Option<walkdir::IntoIter>,
}

impl Iterator for LinkWalk<'_> {
    type Item = LibraryResult<Link>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(walker) = self.current.as_mut() else {
                let root = self.roots.next()?;
                if !root.is_dir() {
                    debug!("Skipping missing link root {:?}", root);
                    continue;
                }
                debug!("Walking links under {:?}", root);
                self.current = Some(WalkDir::new(root).follow_links(false).into_iter());
                continue;
            };

            match walker.next() {
                None => self.current = None,
                Some(Err(e)) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                    let error = LibraryError::TraversalError { path, source };
                    warn!("{}", error);
                    return Some(Err(error));
                }
                Some(Ok(item)) if item.path_is_symlink() => {
                    return Some(self.resolver.classify(item.path()));
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Work out which part of an entry a resolved path names
///
/// `<dir>/<name>/<name>.<ext>` is a file of entry `<name>`; anything else is
/// taken to name an entry directory by its last component.
fn shape_of(resolved: &Path) -> (LinkShape, Option<String>) {
    let file_name = resolved.file_name().map(|n| n.to_string_lossy().into_owned());
    let parent_name = resolved
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned());
    let stem = resolved.file_stem().map(|n| n.to_string_lossy().into_owned());

    match (file_name, parent_name, stem) {
        (Some(file), Some(parent), Some(stem)) if stem == parent && file != stem => {
            (LinkShape::File, Some(parent))
        }
        (Some(file), _, _) => (LinkShape::Directory, Some(file)),
        _ => (LinkShape::Other, None),
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Make a path absolute against the current directory
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: Config,
        resolver: LinkResolver,
    }

    fn fixture(keys: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = Config::for_library(dir.path());
        fs::create_dir_all(config.shelves_dir()).unwrap();
        for key in keys {
            let entry_dir = config.archive_dir().join(key);
            fs::create_dir_all(&entry_dir).unwrap();
            fs::write(entry_dir.join(format!("{}.pdf", key)), b"%PDF").unwrap();
            fs::write(
                entry_dir.join(format!("{}.bib", key)),
                format!("@misc{{{},}}", key),
            )
            .unwrap();
        }
        let resolver = LinkResolver::new(config.archive_dir());
        Fixture {
            _dir: dir,
            config,
            resolver,
        }
    }

    fn link(f: &Fixture, rel: &str, target: &Path) -> PathBuf {
        let path = f.config.shelves_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        make_symlink(target, &path).unwrap();
        path
    }

    fn doc(f: &Fixture, key: &str) -> PathBuf {
        f.config
            .archive_dir()
            .join(key)
            .join(format!("{}.pdf", key))
    }

    #[test]
    fn test_classify_valid_file_and_directory_links() {
        let f = fixture(&["smith2020"]);
        let file_link = link(&f, "ai/smith2020.pdf", &doc(&f, "smith2020"));
        let dir_link = link(&f, "ai/smith", &f.config.archive_dir().join("smith2020"));

        let l = f.resolver.classify(&file_link).unwrap();
        assert_eq!(l.kind, LinkKind::Valid);
        assert_eq!(l.shape, LinkShape::File);
        assert_eq!(l.target_key.as_deref(), Some("smith2020"));
        assert!(l.targets("smith2020"));

        let l = f.resolver.classify(&dir_link).unwrap();
        assert_eq!(l.kind, LinkKind::Valid);
        assert_eq!(l.shape, LinkShape::Directory);
        assert!(l.targets("smith2020"));
    }

    #[test]
    fn test_classify_relative_link() {
        let f = fixture(&["doe2019"]);
        let path = link(
            &f,
            "deep/nested/doe.pdf",
            Path::new("../../../archive/doe2019/doe2019.pdf"),
        );
        let l = f.resolver.classify(&path).unwrap();
        assert_eq!(l.kind, LinkKind::Valid);
        assert_eq!(l.resolved, normalize(&doc(&f, "doe2019")));
    }

    #[test]
    fn test_classify_dangling_and_foreign() {
        let f = fixture(&["smith2020"]);
        let outside = f.config.library_dir.join("notes.txt");
        fs::write(&outside, "x").unwrap();

        let dangling = link(&f, "gone.pdf", &doc(&f, "ghost2001"));
        let foreign = link(&f, "notes", &outside);

        let l = f.resolver.classify(&dangling).unwrap();
        assert_eq!(l.kind, LinkKind::Dangling);
        assert_eq!(l.target_key.as_deref(), Some("ghost2001"));
        assert!(l.in_archive);

        let l = f.resolver.classify(&foreign).unwrap();
        assert_eq!(l.kind, LinkKind::Foreign);
        assert!(l.target_key.is_none());
    }

    #[test]
    fn test_link_through_another_link_is_foreign() {
        let f = fixture(&["smith2020"]);
        let first = link(&f, "first.pdf", &doc(&f, "smith2020"));
        let second = link(&f, "second.pdf", &first);

        assert_eq!(f.resolver.classify(&second).unwrap().kind, LinkKind::Foreign);
    }

    #[test]
    fn test_classify_rejects_regular_file() {
        let f = fixture(&[]);
        let file = f.config.shelves_dir().join("plain.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            f.resolver.classify(&file),
            Err(LibraryError::NotALink { .. })
        ));
    }

    #[test]
    fn test_walk_does_not_follow_cycles_or_escape() {
        let f = fixture(&["smith2020"]);
        link(&f, "ai/smith2020.pdf", &doc(&f, "smith2020"));
        // A cycle back to the shelves root and an escape to the filesystem root
        link(&f, "ai/loop", &f.config.shelves_dir());
        link(&f, "ai/root", Path::new("/"));

        let links: Vec<Link> = f
            .resolver
            .walk([f.config.shelves_dir()])
            .collect::<LibraryResult<_>>()
            .unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(
            links.iter().filter(|l| l.kind == LinkKind::Valid).count(),
            1
        );
    }

    #[test]
    fn test_walk_skips_missing_roots() {
        let f = fixture(&["smith2020"]);
        link(&f, "a.pdf", &doc(&f, "smith2020"));

        let count = f
            .resolver
            .walk(f.config.link_roots())
            .filter(|item| item.is_ok())
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_walk_is_repeatable() {
        let f = fixture(&["smith2020", "doe2019"]);
        link(&f, "a/one.pdf", &doc(&f, "smith2020"));
        link(&f, "b/two.pdf", &doc(&f, "doe2019"));
        link(&f, "b/three.pdf", &doc(&f, "nobody"));

        let collect = || {
            f.resolver
                .walk([f.config.shelves_dir()])
                .map(|item| {
                    let l = item.unwrap();
                    (l.link_path, l.kind, l.target_key)
                })
                .collect::<HashSet<_>>()
        };
        assert_eq!(collect(), collect());
        assert_eq!(collect().len(), 3);
    }

    #[test]
    fn test_links_to_filters_by_key() {
        let f = fixture(&["smith2020", "doe2019"]);
        link(&f, "a/one.pdf", &doc(&f, "smith2020"));
        link(&f, "b/two.pdf", &doc(&f, "smith2020"));
        link(&f, "b/three.pdf", &doc(&f, "doe2019"));

        let (links, errors) = f.resolver.links_to("smith2020", [f.config.shelves_dir()]);
        assert!(errors.is_empty());
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.targets("smith2020")));
    }

    #[test]
    fn test_unreadable_directory_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let f = fixture(&["smith2020"]);
        link(&f, "open/a.pdf", &doc(&f, "smith2020"));
        link(&f, "locked/b.pdf", &doc(&f, "smith2020"));
        let locked = f.config.shelves_dir().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits
        let readable = fs::read_dir(&locked).is_ok();

        let report = f.resolver.check([f.config.shelves_dir()]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if readable {
            eprintln!("skipped: permission bits not enforced for this user");
            assert_eq!(report.valid.len(), 2);
            return;
        }
        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            LibraryError::TraversalError { ref path, .. } if path == &locked
        ));
    }

    #[test]
    fn test_create_link_refuses_existing_path() {
        let f = fixture(&["smith2020"]);
        let path = f.config.shelves_dir().join("new/smith.pdf");

        let created = f.resolver.create_link(&doc(&f, "smith2020"), &path).unwrap();
        assert_eq!(created.kind, LinkKind::Valid);

        assert!(matches!(
            f.resolver.create_link(&doc(&f, "smith2020"), &path),
            Err(LibraryError::LinkExists { .. })
        ));
    }

    #[test]
    fn test_fix_link_after_library_moved() {
        let f = fixture(&["smith2020"]);
        let archive = Archive::new(f.config.clone());
        let stale = Path::new("/old/library/archive/smith2020/smith2020.pdf");
        let path = link(&f, "ai/smith2020.pdf", stale);

        let before = f.resolver.classify(&path).unwrap();
        assert_eq!(before.kind, LinkKind::Dangling);
        assert!(!before.in_archive);

        assert!(f.resolver.fix_link(&archive, &path).unwrap());
        let after = f.resolver.classify(&path).unwrap();
        assert_eq!(after.kind, LinkKind::Valid);
        assert_eq!(after.resolved, normalize(&doc(&f, "smith2020")));

        // Already valid: nothing to do
        assert!(!f.resolver.fix_link(&archive, &path).unwrap());
    }

    #[test]
    fn test_fix_links_reports_unknown_keys() {
        let f = fixture(&["smith2020"]);
        let archive = Archive::new(f.config.clone());
        link(&f, "a.pdf", Path::new("/old/archive/smith2020/smith2020.pdf"));
        link(&f, "b.pdf", Path::new("/old/archive/ghost/ghost.pdf"));

        let report = f.resolver.fix_links(&archive, &f.config.shelves_dir());
        assert_eq!(report.fixed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0], LibraryError::NotFound { .. }));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}
