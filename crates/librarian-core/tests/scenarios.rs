//! End-to-end library scenarios against a throwaway directory

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use librarian_core::{
    AddMode, Config, Filter, LibraryError, Library, LinkKind, Order, Query, SortKey,
};
use tempfile::TempDir;

struct TestLibrary {
    dir: TempDir,
    library: Library,
}

impl TestLibrary {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let library = Library::create(Config::for_library(dir.path().join("library"))).unwrap();
        Self { dir, library }
    }

    fn add(&self, key: &str, fields: &str) {
        let incoming = self.dir.path().join("incoming");
        fs::create_dir_all(&incoming).unwrap();
        let doc = incoming.join("paper.pdf");
        let bib = incoming.join("paper.bib");
        fs::write(&doc, format!("%PDF-1.4 {}", key)).unwrap();
        fs::write(&bib, format!("@article{{{},\n{}\n}}\n", key, fields)).unwrap();
        self.library.add(&doc, &bib, AddMode::Move).unwrap();
        assert!(!doc.exists());
    }

    fn shelf(&self, rel: &str) -> PathBuf {
        self.library.config().shelves_dir().join(rel)
    }
}

#[test]
fn test_add_then_resolve_round_trips_key() {
    let lib = TestLibrary::new();
    lib.add("smith2020", "  title = {Grasping},");

    let entry = lib.library.resolve("smith2020").unwrap();
    assert!(entry.document_path.is_file());
    assert!(entry.metadata_path.is_file());
    assert_eq!(lib.library.record("smith2020").unwrap().key, "smith2020");
}

#[test]
fn test_duplicate_add_leaves_archive_unchanged() {
    let lib = TestLibrary::new();
    lib.add("smith2020", "  title = {First},");
    let entry = lib.library.resolve("smith2020").unwrap();
    let before = fs::read(&entry.metadata_path).unwrap();

    let doc = lib.dir.path().join("other.pdf");
    let bib = lib.dir.path().join("other.bib");
    fs::write(&doc, "%PDF").unwrap();
    fs::write(&bib, "@article{smith2020, title = {Second}}").unwrap();
    assert!(matches!(
        lib.library.add(&doc, &bib, AddMode::Copy),
        Err(LibraryError::DuplicateKey { .. })
    ));
    assert_eq!(fs::read(&entry.metadata_path).unwrap(), before);
}

#[test]
fn test_rekey_repairs_shelf_link() {
    let lib = TestLibrary::new();
    lib.add("smith2020", "  year = {2020},");
    lib.add("doe2019", "  year = {2019},");
    fs::create_dir_all(lib.shelf("ai")).unwrap();
    lib.library.link("smith2020", Path::new("ai")).unwrap();

    let report = lib.library.rekey("smith2020", "smith2020b").unwrap();
    assert!(report.is_complete());

    let archive = lib.library.config().archive_dir();
    assert!(archive.join("smith2020b/smith2020b.pdf").is_file());
    assert!(archive.join("smith2020b/smith2020b.bib").is_file());
    assert!(!archive.join("smith2020").exists());

    let link = lib.shelf("ai/smith2020.pdf");
    let resolved = fs::canonicalize(&link).unwrap();
    assert!(resolved.starts_with(fs::canonicalize(archive.join("smith2020b")).unwrap()));
    assert!(lib.library.resolve("doe2019").is_ok());
}

#[test]
fn test_rekey_round_trip_restores_links() {
    let lib = TestLibrary::new();
    lib.add("smith2020", "");
    lib.library.link("smith2020", Path::new("a.pdf")).unwrap();
    lib.library.bookmark("smith2020", None).unwrap();
    let links: Vec<(PathBuf, PathBuf)> = lib
        .library
        .walk_links()
        .map(|l| {
            let l = l.unwrap();
            (l.link_path, l.target)
        })
        .collect();
    let entry = lib.library.resolve("smith2020").unwrap();

    lib.library.rekey("smith2020", "x").unwrap();
    lib.library.rekey("x", "smith2020").unwrap();

    assert_eq!(lib.library.resolve("smith2020").unwrap(), entry);
    for (path, target) in links {
        assert_eq!(fs::read_link(&path).unwrap(), target);
    }
}

#[test]
fn test_rekey_reports_unrepairable_link() {
    let lib = TestLibrary::new();
    lib.add("smith2020", "");
    fs::create_dir_all(lib.shelf("blocked")).unwrap();
    let blocked = lib.library.link("smith2020", Path::new("blocked")).unwrap();
    // Occupy the sibling temp path the repair writes through
    fs::create_dir_all(lib.shelf("blocked/.smith2020.pdf.librarian-tmp/keep")).unwrap();

    let report = lib.library.rekey("smith2020", "smith2020b").unwrap();

    assert!(lib.library.resolve("smith2020b").is_ok());
    assert!(!report.is_complete());
    assert_eq!(report.unrepaired_paths(), vec![blocked.link_path.as_path()]);

    // The stale link is now dangling and can be repaired by hand
    let link = lib.library.resolver().classify(&blocked.link_path).unwrap();
    assert_eq!(link.kind, LinkKind::Dangling);
}

#[test]
fn test_query_is_deterministic_on_ties() {
    let lib = TestLibrary::new();
    for key in ["c2020", "a2020", "b2020"] {
        lib.add(key, "  year = {2020},\n  tags = {ml},");
    }
    lib.add("z", "  title = {No year},");

    for order in [Order::Ascending, Order::Descending] {
        let query = Query::new().sort(SortKey::Year, order);
        let keys: Vec<String> = lib
            .library
            .query(&query)
            .unwrap()
            .hits
            .into_iter()
            .map(|h| h.record.key)
            .collect();
        assert_eq!(keys, vec!["a2020", "b2020", "c2020", "z"]);
    }

    let tagged = Query::new().filter(Filter::tag("ml")).limit(2);
    let hits = lib.library.query(&tagged).unwrap().hits;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].record.key, "a2020");
}

#[test]
fn test_fix_links_after_library_moves() {
    let lib = TestLibrary::new();
    lib.add("smith2020", "");
    let stale = lib.shelf("old.pdf");
    std::os::unix::fs::symlink("/gone/library/archive/smith2020/smith2020.pdf", &stale).unwrap();

    let report = lib.library.check_links(&[]);
    assert_eq!(report.dangling.len(), 1);

    let fixed = lib.library.fix_links(&lib.library.config().shelves_dir());
    assert_eq!(fixed.fixed, vec![stale]);
    assert!(lib.library.check_links(&[]).dangling.is_empty());
}
