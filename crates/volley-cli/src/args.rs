//! Command-line flags and the config-file merge, mirroring the teacher's
//! `moor-mcp-host` pattern: parse with `clap`, then let an optional
//! `--config` YAML file override anything the CLI left at its default.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(name = "volley")]
#[command(about = "Runs a phase-driven load-injection benchmark definition")]
#[command(version)]
pub struct Args {
    /// Path to the YAML benchmark definition to run.
    pub scenario: PathBuf,

    /// Number of single-threaded executors to spread phases across.
    #[arg(long, default_value = "1")]
    pub executors: usize,

    /// Runner settings file (YAML) to merge over these CLI defaults.
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(long, default_value = "false")]
    pub debug: bool,
}
