//! Configuration management for the preview binary.
//!
//! Handles:
//! - Command-line argument parsing
//! - Output destination selection

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the markdown previewer
#[derive(Debug, Parser)]
#[command(name = "mdlive")]
#[command(about = "Live HTML preview for a markdown file")]
#[command(version)]
pub struct Args {
    /// Markdown file to preview
    pub file: PathBuf,

    /// Write rendered HTML to this file instead of stdout
    #[arg(long, help = "Output file for rendered HTML (defaults to stdout)")]
    pub out: Option<PathBuf>,

    /// Log level for the previewer
    #[arg(
        long,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,
}

/// Combined configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    /// Markdown file to preview
    pub file: PathBuf,
    /// Output file for rendered HTML; stdout when unset
    pub out: Option<PathBuf>,
    /// Log level
    pub log_level: String,
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: Args) -> Result<Self> {
        Ok(Config {
            file: args.file,
            out: args.out,
            log_level: args.log_level,
        })
    }
}
