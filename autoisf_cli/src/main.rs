#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod decide;
mod error_fmt;
mod logging;
mod replay;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};

fn load_config(path: Option<&Path>) -> eyre::Result<autoisf_config::Config> {
    let Some(path) = path else {
        return Ok(autoisf_config::Config::default());
    };
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(eyre::Report::new(CliError::InvalidConfig(format!(
                "config file {} not found",
                path.display()
            ))));
        }
        Err(e) => return Err(e).wrap_err_with(|| format!("read config {}", path.display())),
    };
    let cfg = autoisf_config::load_toml(&text).map_err(|e: toml::de::Error| {
        eyre::Report::new(CliError::InvalidConfig(e.message().to_string()))
    })?;
    cfg.validate()
        .map_err(|e| eyre::Report::new(CliError::InvalidConfig(e.to_string())))?;
    Ok(cfg)
}

fn autosens(cfg: &autoisf_config::Config, csv: &Path, json: bool) -> eyre::Result<()> {
    if !csv.exists() {
        return Err(eyre::Report::new(CliError::MissingInput(
            csv.display().to_string(),
        )));
    }
    let rows = autoisf_config::load_autosens_csv(csv)?;
    let samples: Vec<autoisf_core::AutosensSample> = rows.iter().map(Into::into).collect();
    let window = autoisf_core::AutosensWindow::from(&cfg.autosens);
    let result = autoisf_core::autosens_ratio(&samples, &window);
    tracing::info!(ratio = result.ratio, rows = rows.len(), "autosens computed");
    if json {
        println!(
            "{}",
            serde_json::json!({ "ratio": result.ratio, "reason": result.reason })
        );
    } else {
        println!("ratio: {:.2}\n{}", result.ratio, result.reason);
    }
    Ok(())
}

fn run(cli: Cli, cancel: &AtomicBool) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    logging::init(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = ?cli.config, "config loaded");

    match cli.cmd {
        Commands::Decide { input } => decide::run_decide(&cfg, &input, cli.json),
        Commands::Replay {
            input,
            guard,
            baseline,
        } => replay::run_replay(&cfg, &input, guard, baseline.as_deref(), cli.json, cancel),
        Commands::Autosens { csv } => autosens(&cfg, &csv, cli.json),
        Commands::CheckConfig => {
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true }));
            } else {
                println!("config ok");
            }
            Ok(())
        }
    }
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            eprintln!("warning: could not install Ctrl-C handler: {e}");
        }
    }

    if let Err(err) = run(cli, &shutdown) {
        let code = exit_code_for_error(&err);
        tracing::error!(code, error = %format!("{err:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(code);
    }
}
