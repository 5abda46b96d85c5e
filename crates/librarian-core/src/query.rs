//! Query engine
//!
//! Filters, sorts and truncates the archive's records. Filters combine with
//! AND and a filter on a field never matches a record missing that field.
//! Records lacking the sort value come last in either order; ties are broken
//! by key ascending so results are deterministic.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::archive::Archive;
use crate::error::{LibraryError, LibraryResult};
use crate::metadata;
use crate::models::{Entry, Record};

/// A predicate on one field of a record
#[derive(Debug, Clone)]
pub enum Filter {
    Key(Regex),
    Title(Regex),
    Venue(Regex),
    EntryType(Regex),
    /// Every pattern must match at least one author
    Author(Vec<Regex>),
    /// Inclusive year range
    Year { from: i32, to: i32 },
    Tag(String),
}

impl Filter {
    pub fn key(pattern: &str) -> LibraryResult<Self> {
        Ok(Filter::Key(build_regex("key", pattern)?))
    }

    pub fn title(pattern: &str) -> LibraryResult<Self> {
        Ok(Filter::Title(build_regex("title", pattern)?))
    }

    pub fn venue(pattern: &str) -> LibraryResult<Self> {
        Ok(Filter::Venue(build_regex("venue", pattern)?))
    }

    pub fn entry_type(pattern: &str) -> LibraryResult<Self> {
        Ok(Filter::EntryType(build_regex("type", pattern)?))
    }

    /// Author filter from space-separated words
    pub fn author(words: &str) -> LibraryResult<Self> {
        let patterns = words
            .split_whitespace()
            .map(|word| build_regex("author", word))
            .collect::<LibraryResult<Vec<_>>>()?;
        if patterns.is_empty() {
            return Err(invalid("author", words, "no words given"));
        }
        Ok(Filter::Author(patterns))
    }

    /// Year filter from `NNNN` or `NNNN-NNNN`
    pub fn year(range: &str) -> LibraryResult<Self> {
        let parse = |s: &str| {
            s.trim()
                .parse::<i32>()
                .map_err(|_| invalid("year", range, "expected YYYY or YYYY-YYYY"))
        };
        let (from, to) = match range.split_once('-') {
            Some((from, to)) => (parse(from)?, parse(to)?),
            None => {
                let year = parse(range)?;
                (year, year)
            }
        };
        if from > to {
            return Err(invalid("year", range, "range start is after its end"));
        }
        Ok(Filter::Year { from, to })
    }

    pub fn tag(tag: &str) -> Self {
        Filter::Tag(tag.trim().to_string())
    }

    /// Check the filter against a record
    pub fn matches(&self, record: &Record) -> bool {
        let field = |value: &Option<String>, re: &Regex| {
            value.as_deref().is_some_and(|v| re.is_match(v))
        };
        match self {
            Filter::Key(re) => re.is_match(&record.key),
            Filter::Title(re) => field(&record.title, re),
            Filter::Venue(re) => field(&record.venue, re),
            Filter::EntryType(re) => field(&record.entry_type, re),
            Filter::Author(patterns) => patterns
                .iter()
                .all(|re| record.authors.iter().any(|a| re.is_match(a))),
            Filter::Year { from, to } => record.year.is_some_and(|y| *from <= y && y <= *to),
            Filter::Tag(tag) => record.has_tag(tag),
        }
    }
}

fn build_regex(field: &'static str, pattern: &str) -> LibraryResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| invalid(field, pattern, &e.to_string()))
}

fn invalid(field: &'static str, pattern: &str, details: &str) -> LibraryError {
    LibraryError::InvalidFilter {
        field,
        pattern: pattern.to_string(),
        details: details.to_string(),
    }
}

/// Field to order results by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Key,
    Title,
    Year,
    Added,
    Accessed,
}

impl SortKey {
    /// Natural order: names ascending, years and dates newest first
    pub fn default_order(self) -> Order {
        match self {
            SortKey::Key | SortKey::Title => Order::Ascending,
            SortKey::Year | SortKey::Added | SortKey::Accessed => Order::Descending,
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "key" => Ok(SortKey::Key),
            "title" => Ok(SortKey::Title),
            "year" => Ok(SortKey::Year),
            "added" => Ok(SortKey::Added),
            "accessed" => Ok(SortKey::Accessed),
            other => Err(format!(
                "unknown sort key '{}' (expected key, title, year, added or accessed)",
                other
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Key => "key",
            SortKey::Title => "title",
            SortKey::Year => "year",
            SortKey::Added => "added",
            SortKey::Accessed => "accessed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    pub fn reversed(self) -> Self {
        match self {
            Order::Ascending => Order::Descending,
            Order::Descending => Order::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Order::Ascending => ordering,
            Order::Descending => ordering.reverse(),
        }
    }
}

/// A matching entry with its record
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub entry: Entry,
    pub record: Record,
}

/// Matches plus the entries that could not be read
#[derive(Debug, Default)]
pub struct QueryResult {
    pub hits: Vec<Hit>,
    pub errors: Vec<LibraryError>,
}

/// Filters, sort and limit to run against the archive
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub sort: SortKey,
    pub order: Order,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: SortKey, order: Order) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check every filter against a record
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Run against every entry of the archive
    ///
    /// Entries whose metadata cannot be read are left out and reported in
    /// `errors`.
    pub fn run(&self, archive: &Archive) -> LibraryResult<QueryResult> {
        let listing = archive.list()?;
        let mut errors = listing.errors;
        let mut hits = Vec::new();

        for entry in listing.entries {
            match metadata::load_record(&entry) {
                Ok(record) => hits.push(Hit { entry, record }),
                Err(e) => {
                    warn!("Skipping {}: {}", entry.key, e);
                    errors.push(e);
                }
            }
        }

        Ok(QueryResult {
            hits: self.apply(hits),
            errors,
        })
    }

    /// Filter, sort and truncate hits
    pub fn apply(&self, hits: Vec<Hit>) -> Vec<Hit> {
        let mut hits: Vec<Hit> = hits.into_iter().filter(|h| self.matches(&h.record)).collect();
        hits.sort_by(|a, b| compare(&a.record, &b.record, self.sort, self.order));
        if let Some(limit) = self.limit {
            hits.truncate(limit);
        }
        hits
    }
}

/// Order two records, absent values last, ties by key
fn compare(a: &Record, b: &Record, sort: SortKey, order: Order) -> Ordering {
    let primary = match sort {
        SortKey::Key => order.apply(a.key.cmp(&b.key)),
        SortKey::Title => present_first(
            a.title.as_ref().map(|t| t.to_lowercase()),
            b.title.as_ref().map(|t| t.to_lowercase()),
            order,
        ),
        SortKey::Year => present_first(a.year, b.year, order),
        SortKey::Added => present_first(a.added, b.added, order),
        SortKey::Accessed => present_first(a.accessed, b.accessed, order),
    };
    primary.then_with(|| a.key.cmp(&b.key))
}

fn present_first<T: Ord>(a: Option<T>, b: Option<T>, order: Order) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order.apply(a.cmp(&b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
