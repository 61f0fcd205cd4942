//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "autoisf", version, about = "AutoISF basal determination")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results and errors as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decide one recorded cycle
    Decide {
        /// JSON file holding a single cycle record
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
    },
    /// Replay a JSON-lines log of cycles and score it against the references
    Replay {
        /// JSON-lines file, one cycle record per line
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
        /// Fail (exit 4) when the [replay] thresholds are not met
        #[arg(long, action = ArgAction::SetTrue)]
        guard: bool,
        /// Metrics JSON from an earlier replay; the run may not be worse
        #[arg(long, value_name = "FILE", requires = "guard")]
        baseline: Option<PathBuf>,
    },
    /// Compute the autosens ratio from a glucose history CSV
    Autosens {
        /// CSV with headers ts_s,glucose,delta5,expected_delta5,profile_sens
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
    },
    /// Load and validate the config, then exit
    CheckConfig,
}
