//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fsroutes collection route engine CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Routes directory path (relative to project root)
    #[arg(long)]
    pub routes: Option<PathBuf>,

    /// Records JSON file (relative to project root)
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file name (default: fsroutes.toml)
    #[arg(short = 'C', long, default_value = "fsroutes.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resolve all routes once, write the page manifest and report
    Scan,

    /// Resolve continuously: watch the routes directory and the
    /// records file, reconcile pages on every change
    Watch {
        /// Debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

#[allow(unused)]
impl Cli {
    pub const fn is_scan(&self) -> bool {
        matches!(self.command, Commands::Scan)
    }
    pub const fn is_watch(&self) -> bool {
        matches!(self.command, Commands::Watch { .. })
    }
}
