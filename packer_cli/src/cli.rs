//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "packer", version, about = "Wrap-packaging machine controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/packer.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print reports as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Run the simulated rig on a virtual clock (no real sleeping)
    #[arg(
        long = "virtual-time",
        action = ArgAction::SetTrue,
        long_help = "Run the simulated rig on a virtual clock.\n\nEvery sleep and dwell advances a manual clock instead of blocking, so a full delivery finishes instantly. Only meaningful for the simulated backend; rejected when built with the `hardware` feature."
    )]
    pub virtual_time: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Measure the object and compute its wrap size
    Capture,
    /// Measure, then deliver the computed wrap
    Pack,
    /// Deliver an explicit wrap size without measuring
    Deliver {
        /// Wrap length in cm
        #[arg(long, value_name = "CM")]
        length: f64,
        /// Wrap width in cm
        #[arg(long, value_name = "CM")]
        width: f64,
    },
    /// Feed a leader of wrap and run one seal cycle
    Seal,
    /// De-energize every output and exit
    Estop,
    /// Fit a camera ratio and offset from a `pixels,cm` CSV
    Calibrate {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
    },
    /// Quick health check: one distance reading, one frame per camera
    SelfCheck,
}
