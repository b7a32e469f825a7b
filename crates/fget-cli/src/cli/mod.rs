//! CLI for the fget download engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_checksum, run_get};

/// Top-level CLI for the fget download engine.
#[derive(Debug, Parser)]
#[command(name = "fget")]
#[command(about = "fget: multi-threaded resumable download engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URLs, blocking until each finishes or fails.
    Get {
        /// Direct HTTP/HTTPS URLs to download.
        urls: Vec<String>,
        /// Directory to save into (default: configured defaultSavePath).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Segment thread count per task (default: configured defaultThreadCount).
        #[arg(long, value_name = "N")]
        threads: Option<u32>,
        /// Expected MD5 checksum, verified after download (single-URL use only).
        #[arg(long, value_name = "HEX")]
        md5: Option<String>,
    },

    /// Compute a file's digest (md5 or sha256).
    Checksum {
        /// Path to the file.
        path: String,
        /// Digest algorithm: md5 (default) or sha256.
        #[arg(long, default_value = "md5")]
        algorithm: String,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = fget_core::EngineConfig::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get { urls, dir, threads, md5 } => run_get(cfg, urls, dir, threads, md5)?,
            CliCommand::Checksum { path, algorithm } => {
                run_checksum(std::path::Path::new(&path), &algorithm)?
            }
        }

        Ok(())
    }
}
