//! `packer` binary: load config, assemble the rig and run one command.

mod backend;
mod cli;
mod commands;
mod error_fmt;

use std::path::Path;

use clap::Parser;
use eyre::{Result, WrapErr};
use packer_config::{Config, Logging};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(%error, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&e));
            } else {
                eprintln!("{}", error_fmt::humanize(&e));
            }
            error_fmt::exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let _ = color_eyre::install();

    // Calibration only reads the CSV; it must work without a rig config.
    if let Commands::Calibrate { csv } = &cli.cmd {
        init_tracing(cli.json, &cli.log_level, &Logging::default())?;
        return commands::calibrate(csv, cli.json);
    }

    let loaded = load_config(&cli.config);
    let logging = loaded.as_ref().map_or_else(|_| Logging::default(), |c| c.logging.clone());
    init_tracing(cli.json, &cli.log_level, &logging)?;
    let cfg = loaded?;
    tracing::info!(config = %cli.config.display(), virtual_time = cli.virtual_time, "config loaded");

    let machine = backend::build(&cfg, cli.virtual_time)?;

    let estop = machine.estop().clone();
    ctrlc::set_handler(move || {
        estop.stop_all();
        tracing::warn!("interrupted; all outputs de-energized");
        eprintln!("Interrupted: emergency stop engaged.");
        std::process::exit(130);
    })
    .wrap_err("install Ctrl-C handler")?;

    commands::execute(&machine, &cli.cmd, cli.json)
}

fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    toml::from_str::<Config>(&text).wrap_err_with(|| format!("parse config {}", path.display()))
}

/// Console layer on stderr (pretty or JSON), plus an optional JSON-lines file
/// layer from `[logging]`. `RUST_LOG` overrides `--log-level`.
fn init_tracing(json: bool, level: &str, logging: &Logging) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match &logging.file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file must name a file"))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
                .wrap_err("invalid logging.level")?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter)
                    .boxed(),
            )
        }
        None => None,
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();
    Ok(())
}
