//! Librarian Core Library
//!
//! This crate provides the core functionality for librarian, a personal
//! document library: a keyed archive of documents with BibTeX metadata, plus
//! shelves and bookmarks made of symbolic links into that archive.
//!
//! # Architecture
//!
//! - **Archive**: `<library>/archive/<key>/<key>.pdf` and `<key>.bib`
//! - **Links**: discovered by walking the shelves and bookmarks trees; no
//!   reverse index is kept
//!
//! # Quick Start
//!
//! ```text
//! let library = Library::open()?;
//!
//! // Archive a paper
//! let entry = library.add(doc, bib, AddMode::Copy)?;
//!
//! // Change its key, repairing every link to it
//! let report = library.rekey(&entry.key, "smith2020b")?;
//!
//! // Query
//! let result = library.query(&Query::new().filter(Filter::year("2020")?))?;
//! ```
//!
//! # Modules
//!
//! - `library`: Unified interface (main entry point)
//! - `archive`: The canonical keyed store
//! - `links`: Link discovery, classification and repair
//! - `rekey`: Key changes with link repair
//! - `query`: Filtering and sorting records
//! - `metadata`, `bibtex`: Reading entry metadata
//! - `models`: Entries, records and links
//! - `config`: Application configuration

pub mod archive;
pub mod bibtex;
pub mod config;
pub mod error;
pub mod library;
pub mod links;
pub mod metadata;
pub mod models;
pub mod persistence;
pub mod query;
pub mod rekey;

pub use archive::{AddMode, Archive, ArchiveListing};
pub use config::Config;
pub use error::{LibraryError, LibraryResult};
pub use library::Library;
pub use links::{FixReport, LinkReport, LinkResolver};
pub use models::{Entry, Link, LinkKind, LinkShape, Record};
pub use query::{Filter, Hit, Order, Query, QueryResult, SortKey};
pub use rekey::{RekeyOutcome, RekeyReport};
