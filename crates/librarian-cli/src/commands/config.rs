//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use librarian_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "library_dir": config.library_dir,
                    "document_ext": config.document_ext,
                    "metadata_ext": config.metadata_ext,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.library_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  library_dir:  {}", config.library_dir.display());
            println!("  document_ext: {}", config.document_ext);
            println!("  metadata_ext: {}", config.metadata_ext);
            println!(
                "  log_file:     {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: &str, value: &str, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, key, value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "library_dir" => {
            if value.is_empty() {
                bail!("library_dir cannot be empty");
            }
            config.library_dir = value.into();
        }
        "document_ext" | "metadata_ext" => {
            let ext = value.trim_start_matches('.');
            if ext.is_empty() || ext.contains(['/', '\\']) {
                bail!("Invalid extension for {}: '{}'", key, value);
            }
            if key == "document_ext" {
                config.document_ext = ext.to_string();
            } else {
                config.metadata_ext = ext.to_string();
            }
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: library_dir, document_ext, metadata_ext, log_file",
                key
            );
        }
    }
    Ok(())
}
