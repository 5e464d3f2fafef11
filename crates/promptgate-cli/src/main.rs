//! Promptgate CLI - validate a configuration file
//!
//! Loads and validates a promptgate configuration, printing a short summary
//! on success and the structured error details on failure. Exit code 0 means
//! the file is valid, 1 means it is not.

use clap::Parser;
use colored::Colorize;
use promptgate_core::{load_and_validate_config, Config};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Debug, Parser)]
#[command(name = "promptgate", about = "Validate a promptgate configuration file")]
struct Cli {
    /// Path to the configuration file to validate
    config_path: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_logging();
    tracing::debug!(path = %cli.config_path.display(), "validating configuration");

    let started = Instant::now();
    match load_and_validate_config(&cli.config_path) {
        Ok(config) => {
            print_summary(&config, started.elapsed().as_millis());
            process::exit(0);
        }
        Err(err) => {
            eprintln!("{} {}", "✗".red().bold(), err);
            if let Some(details) = non_empty_details(&err) {
                eprintln!("{}", details);
            }
            process::exit(1);
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(config: &Config, elapsed_ms: u128) {
    println!("{} {}", "✓".green().bold(), "configuration is valid".green());
    println!("{}", summary_line(config, elapsed_ms));
}

fn summary_line(config: &Config, elapsed_ms: u128) -> String {
    format!(
        "version {} · {} prompt(s) · {} provider(s) · {} schema(s) · {} ms",
        config.version,
        config.prompts.len(),
        config.providers.len(),
        config.response_schemas.len(),
        elapsed_ms
    )
}

fn non_empty_details(err: &promptgate_core::Error) -> Option<String> {
    let details = err.details();
    let empty = details.as_object().map_or(true, |map| map.is_empty());
    if empty {
        return None;
    }
    serde_json::to_string_pretty(details).ok()
}
