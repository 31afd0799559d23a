//! `assetdefs`: command-line interface for asset manifests.
//!
//! Provides three subcommands:
//!
//! - **`validate`**: build every asset in a manifest and report problems.
//! - **`inspect`**: print a human-readable view of each definition.
//! - **`namespace`**: prefix the keys a manifest produces and print the
//!   renamed definitions as JSON.
//!
//! All subcommands read a JSON manifest from a file path or from stdin (`-`).
//! Diagnostics go to stderr; stdout carries only results.

mod manifest;

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use assetdefs::{render_assets_definition, render_catalog};
use manifest::{
    duplicate_outputs, parse_manifest, prefix_produced_keys, DefinitionSummary, ManifestAsset,
    ManifestEntry,
};

const DEFAULT_LOG_FILTER: &str = "assetdefs=warn";

/// assetdefs: asset manifest CLI
///
/// Validate and inspect software-defined asset manifests.
#[derive(Parser)]
#[command(name = "assetdefs", version, about, long_about = None)]
struct Cli {
    /// Tracing filter, e.g. `assetdefs=debug`.
    #[arg(long, global = true, env = "ASSETDEFS_LOG", default_value = DEFAULT_LOG_FILTER)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build every asset in a manifest.
    ///
    /// Exits 0 if every entry builds and no asset key is produced twice,
    /// 1 otherwise.
    ///
    /// Pass `-` as FILE to read from stdin.
    Validate {
        /// Path to a JSON manifest, or `-` for stdin.
        file: PathBuf,
    },

    /// Print each definition in a manifest as human-readable text.
    ///
    /// Pass `-` as FILE to read from stdin.
    Inspect {
        /// Path to a JSON manifest, or `-` for stdin.
        file: PathBuf,
    },

    /// Prefix every key the manifest produces and print the result as JSON.
    ///
    /// Inputs read from assets produced elsewhere keep their keys.
    ///
    /// Example:
    ///   assetdefs namespace assets.json --prefix prod --prefix eu
    Namespace {
        /// Path to a JSON manifest, or `-` for stdin.
        file: PathBuf,

        /// Segment to prepend. Repeat for several: --prefix a --prefix b
        #[arg(long = "prefix", value_name = "SEGMENT", required = true)]
        prefix: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Validate { file } => {
            let entries = read_manifest(&file);
            let mut all_valid = true;
            let mut built: Vec<ManifestAsset> = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                match entry.build() {
                    Ok(def) => built.push(def),
                    Err(e) => {
                        if entries.len() == 1 {
                            eprintln!("error: {e}");
                        } else {
                            eprintln!("error in entry {i} ({:?}): {e}", entry.name);
                        }
                        all_valid = false;
                    }
                }
            }
            for (key, ops) in duplicate_outputs(&built.iter().collect::<Vec<_>>()) {
                eprintln!("error: asset {key} is produced by {}", ops.join(", "));
                all_valid = false;
            }
            if !all_valid {
                process::exit(1);
            }
            if entries.len() == 1 {
                println!("valid");
            } else {
                println!("all {} entries valid", entries.len());
            }
        }

        Command::Inspect { file } => {
            let defs = build_all(&read_manifest(&file));
            if defs.len() > 1 {
                println!("{}", render_catalog(&defs));
            }
            for (i, def) in defs.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print!("{}", render_assets_definition(def));
            }
        }

        Command::Namespace { file, prefix } => {
            let defs = build_all(&read_manifest(&file));
            let renamed = prefix_produced_keys(&defs, &prefix)
                .unwrap_or_else(|e| fatal(&format!("cannot apply prefix: {e}")));
            let summaries: Vec<DefinitionSummary> = renamed.iter().map(DefinitionSummary::from).collect();
            match serde_json::to_string_pretty(&summaries) {
                Ok(json) => println!("{json}"),
                Err(e) => fatal(&format!("failed to serialize definitions: {e}")),
            }
        }
    }
}

/// Build every entry, exiting with code 1 on the first invalid one.
fn build_all(entries: &[ManifestEntry]) -> Vec<ManifestAsset> {
    entries
        .iter()
        .map(|entry| {
            entry.build().unwrap_or_else(|e| {
                eprintln!("assetdefs: {:?}: {e}", entry.name);
                process::exit(1);
            })
        })
        .collect()
}

/// Read and parse a manifest from a file, or stdin when the path is `"-"`.
fn read_manifest(path: &PathBuf) -> Vec<ManifestEntry> {
    let json = read_input(path);
    let entries = parse_manifest(&json)
        .unwrap_or_else(|e| fatal(&format!("failed to parse manifest: {e}")));
    if entries.is_empty() {
        fatal("manifest is an empty array, nothing to process");
    }
    tracing::debug!(entries = entries.len(), "manifest parsed");
    entries
}

/// Read the full contents of a file, or stdin when the path is `"-"`.
fn read_input(path: &PathBuf) -> String {
    if path.to_str() == Some("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fatal(&format!("failed to read stdin: {e}")));
        buf
    } else {
        fs::read_to_string(path)
            .unwrap_or_else(|e| fatal(&format!("failed to read {}: {e}", path.display())))
    }
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("assetdefs: {msg}");
    process::exit(2);
}
