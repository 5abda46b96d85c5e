//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use librarian_core::{Hit, LibraryError, Link, LinkReport, Record, RekeyReport};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print one entry with its metadata
    pub fn print_hit(&self, hit: &Hit) {
        match self.format {
            OutputFormat::Human => {
                let record = &hit.record;
                println!("Key:      {}", record.key);
                if let Some(ref title) = record.title {
                    println!("Title:    {}", title);
                }
                if !record.authors.is_empty() {
                    println!("Authors:  {}", record.authors.join("; "));
                }
                if let Some(year) = record.year {
                    println!("Year:     {}", year);
                }
                if let Some(ref venue) = record.venue {
                    println!("Venue:    {}", venue);
                }
                if let Some(ref entry_type) = record.entry_type {
                    println!("Type:     {}", entry_type);
                }
                if !record.tags.is_empty() {
                    println!("Tags:     {}", join_tags(record));
                }
                if let Some(added) = record.added {
                    println!("Added:    {}", added.format("%Y-%m-%d"));
                }
                if let Some(accessed) = record.accessed {
                    println!("Accessed: {}", accessed.format("%Y-%m-%d"));
                }
                println!("Document: {}", hit.entry.document_path.display());
                println!("Metadata: {}", hit.entry.metadata_path.display());
            }
            OutputFormat::Json => print_json(hit),
            OutputFormat::Quiet => println!("{}", hit.record.key),
        }
    }

    /// Print query results as a table
    pub fn print_hits(&self, hits: &[Hit]) {
        match self.format {
            OutputFormat::Human => {
                if hits.is_empty() {
                    println!("No entries found.");
                    return;
                }
                for hit in hits {
                    let record = &hit.record;
                    println!(
                        "{:<20} {:>4}  {}  {}",
                        truncate(&record.key, 20),
                        record.year.map(|y| y.to_string()).unwrap_or_default(),
                        truncate(record.title.as_deref().unwrap_or("(untitled)"), 50),
                        truncate(&first_author(record), 20)
                    );
                }
                println!("\n{} entr{}", hits.len(), if hits.len() == 1 { "y" } else { "ies" });
            }
            OutputFormat::Json => print_json(&hits),
            OutputFormat::Quiet => {
                for hit in hits {
                    println!("{}", hit.record.key);
                }
            }
        }
    }

    /// Print a single link
    pub fn print_link(&self, link: &Link) {
        match self.format {
            OutputFormat::Human => {
                println!("{} -> {}", link.link_path.display(), link.target.display())
            }
            OutputFormat::Json => print_json(link),
            OutputFormat::Quiet => println!("{}", link.link_path.display()),
        }
    }

    /// Print a link check report; valid links only with `verbose`
    pub fn print_link_report(&self, report: &LinkReport, verbose: bool) {
        match self.format {
            OutputFormat::Human => {
                let section = |label: &str, links: &[Link]| {
                    for link in links {
                        println!(
                            "{:<9} {} -> {}",
                            label,
                            link.link_path.display(),
                            link.target.display()
                        );
                    }
                };
                if verbose {
                    section("valid", &report.valid);
                }
                section("dangling", &report.dangling);
                section("foreign", &report.foreign);
                println!(
                    "\n{} valid, {} dangling, {} foreign",
                    report.valid.len(),
                    report.dangling.len(),
                    report.foreign.len()
                );
            }
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => {
                for link in &report.dangling {
                    println!("{}", link.link_path.display());
                }
            }
        }
        self.problems(&report.errors);
    }

    /// Print what a rekey did
    pub fn print_rekey(&self, report: &RekeyReport) {
        let unrepaired = report.unrepaired_paths();
        match self.format {
            OutputFormat::Human => {
                println!("✓ {} -> {}", report.old_key, report.new_key);
                if !report.repaired.is_empty() {
                    println!("  repaired {} link(s)", report.repaired.len());
                }
                if !unrepaired.is_empty() {
                    println!("  {} link(s) still point at {}:", unrepaired.len(), report.old_key);
                    for path in &unrepaired {
                        println!("    {}", path.display());
                    }
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "old_key": report.old_key,
                        "new_key": report.new_key,
                        "entry": report.entry,
                        "repaired": report.repaired,
                        "unrepaired": unrepaired,
                        "complete": report.is_complete(),
                    })
                );
            }
            OutputFormat::Quiet => {
                for path in &unrepaired {
                    println!("{}", path.display());
                }
            }
        }
        self.problems(&report.traversal_errors);
    }

    /// Report collected per-item errors on stderr
    pub fn problems(&self, errors: &[LibraryError]) {
        if self.is_quiet() {
            return;
        }
        for error in errors {
            eprintln!("⚠ {}", error);
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON: {}", e),
    }
}

fn join_tags(record: &Record) -> String {
    record.tags.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Family name of the first author, with "et al." when there are more
fn first_author(record: &Record) -> String {
    let Some(first) = record.authors.first() else {
        return String::new();
    };
    let family = match first.split_once(',') {
        Some((family, _)) => family.trim(),
        None => first.split_whitespace().last().unwrap_or(first),
    };
    if record.authors.len() > 1 {
        format!("{} et al.", family)
    } else {
        family.to_string()
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
