//! Librarian CLI
//!
//! Command-line interface for librarian - a keyed document archive with
//! shelves and bookmarks of symbolic links.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use librarian_core::{Config, Library, LibraryError};

mod commands;
mod output;
mod prompt;

use commands::search::ListArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "librarian")]
#[command(about = "Librarian - keyed document archive with shelves of links")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the library directories
    Init,
    /// Archive a document with its BibTeX metadata
    Add {
        /// The document to archive
        document: PathBuf,
        /// BibTeX file describing it (the key is taken from here)
        metadata: PathBuf,
        /// Remove the source files once archived
        #[arg(short, long)]
        delete: bool,
        /// Also bookmark the new entry
        #[arg(short, long)]
        bookmark: bool,
    },
    /// Change an entry's key and repair links to it
    #[command(alias = "mv")]
    Rekey {
        key: String,
        new_key: String,
    },
    /// Adopt the key written in an entry's metadata
    Rename {
        key: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show an entry's metadata
    Show { key: String },
    /// Open an entry's document in the default viewer
    Open {
        key: String,
        /// Open the metadata file instead
        #[arg(long)]
        bib: bool,
    },
    /// Link an entry's document
    #[command(alias = "ln")]
    Link {
        key: String,
        /// Link path or directory, relative to the working directory
        /// (default: <key>.pdf in the shelves)
        path: Option<PathBuf>,
    },
    /// Bookmark an entry
    Bookmark {
        key: String,
        /// Bookmark name (default: the key)
        name: Option<String>,
    },
    /// Repair dangling links in a file or directory
    Fix {
        /// A link, or a directory to fix recursively (default: shelves)
        path: Option<PathBuf>,
    },
    /// Check links under the shelves and bookmarks
    Links {
        /// Directories to check instead (also limits --to)
        roots: Vec<PathBuf>,
        /// List valid links too
        #[arg(short, long)]
        verbose: bool,
        /// Only list links to this key
        #[arg(long)]
        to: Option<String>,
    },
    /// List entries, filtered and sorted
    #[command(alias = "ls")]
    List(ListArgs),
    /// Replace an entry's tags
    Tag {
        key: String,
        /// Comma-separated tags (empty to clear)
        tags: String,
    },
    /// Print every entry's BibTeX
    Compile,
    /// Print library paths
    Where {
        #[arg(long, conflicts_with_all = ["shelves", "bookmarks"])]
        archive: bool,
        #[arg(long, conflicts_with = "bookmarks")]
        shelves: bool,
        #[arg(long)]
        bookmarks: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (library_dir, document_ext, metadata_ext, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    if let Err(e) = run(cli, &output) {
        eprintln!("Error: {:#}", e);
        if let Some(hint) = e
            .downcast_ref::<LibraryError>()
            .and_then(LibraryError::recovery_suggestion)
        {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.as_ref();

    // Commands that don't need the library
    if let Commands::Config { command } = &cli.command {
        return match command {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    if let Commands::Init = cli.command {
        Library::create(config.clone())?;
        output.success(&format!("Library ready at {}", config.library_dir.display()));
        return Ok(());
    }
    if let Commands::Where {
        archive,
        shelves,
        bookmarks,
    } = cli.command
    {
        return commands::entry::where_(&config, archive, shelves, bookmarks, output);
    }

    let library = Library::open_with_config(config)?;
    debug!("Opened library at {:?}", library.config().library_dir);

    match cli.command {
        Commands::Add {
            document,
            metadata,
            delete,
            bookmark,
        } => commands::entry::add(&library, &document, &metadata, delete, bookmark, output),
        Commands::Rekey { key, new_key } => commands::entry::rekey(&library, &key, &new_key, output),
        Commands::Rename { key, yes } => commands::entry::rename(&library, &key, yes, output),
        Commands::Show { key } => commands::entry::show(&library, &key, output),
        Commands::Open { key, bib } => commands::entry::open(&library, &key, bib, output),
        Commands::Tag { key, tags } => commands::entry::tag(&library, &key, &tags, output),
        Commands::Compile => commands::entry::compile(&library),
        Commands::Link { key, path } => commands::links::link(&library, &key, path, output),
        Commands::Bookmark { key, name } => {
            commands::links::bookmark(&library, &key, name.as_deref(), output)
        }
        Commands::Fix { path } => commands::links::fix(&library, path, output),
        Commands::Links { roots, verbose, to } => {
            commands::links::check(&library, &roots, verbose, to.as_deref(), output)
        }
        Commands::List(args) => commands::search::list(&library, args, output),
        Commands::Init | Commands::Where { .. } | Commands::Config { .. } => Ok(()),
    }
}

/// Install the tracing subscriber
///
/// `LIBRARIAN_LOG` sets the level for both crates; logs go to
/// `config.log_file` when set, otherwise stderr.
fn init_logging(config: &Config) {
    let env_filter = match std::env::var("LIBRARIAN_LOG") {
        Ok(level) => EnvFilter::new(format!(
            "librarian_core={},librarian={}",
            level, level
        )),
        Err(_) => EnvFilter::new("error"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let log_file = config.log_file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Warning: Could not open log file {:?}: {}", path, e))
            .ok()
    });

    // Ignore error if already initialized
    let _ = match log_file {
        Some(file) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
}
