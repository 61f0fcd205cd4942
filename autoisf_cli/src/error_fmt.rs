//! Human-readable error descriptions, exit codes and structured JSON errors.

use thiserror::Error;

/// Failures the CLI itself detects before or after running the engine.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("input file not found: {0}")]
    MissingInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("replay regression: {}", .0.join("; "))]
    Regression(Vec<String>),
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use autoisf_core::error::{AutoIsfError, BuildError};

    // Typed matches first
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::MissingInput(path) => format!(
                "What happened: Input file {path} was not found.\nLikely causes: Wrong path or the file was not exported yet.\nHow to fix: Pass an existing file via --input (or --csv, --baseline)."
            ),
            CliError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then run `autoisf check-config`."
            ),
            CliError::Regression(violations) => format!(
                "What happened: Replay did not meet the regression thresholds.\n{}\nHow to fix: Inspect the failing cycles with --log-level=debug, or relax [replay] thresholds if the change is intended.",
                violations
                    .iter()
                    .map(|v| format!("  - {v}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingGlucose => {
                "What happened: The cycle has no glucose reading.\nLikely causes: The record lacks a `glucose` object.\nHow to fix: Add the current glucose status to the record.".to_string()
            }
            BuildError::MissingProfile => {
                "What happened: No profile was provided to the engine.\nLikely causes: The config and the record both lack a profile.\nHow to fix: Add a [profile] table to the config.".to_string()
            }
            BuildError::MissingIob | BuildError::EmptyIob => {
                "What happened: The cycle has no insulin-on-board data.\nLikely causes: The record carries neither `iob` nor `insulin_events`.\nHow to fix: Export the IOB timeline or the recent boluses and temp basals with the record.".to_string()
            }
            BuildError::InvalidInput(msg) => format!(
                "What happened: Invalid cycle input ({msg}).\nLikely causes: Non-finite or out-of-range values in the record.\nHow to fix: Check the record's glucose, IOB and profile values."
            ),
        };
    }

    if let Some(ae) = err.downcast_ref::<AutoIsfError>() {
        if matches!(ae, AutoIsfError::Cancelled) {
            return "What happened: Replay was interrupted.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Rerun the replay to completion.".to_string();
        }
        return format!(
            "What happened: {ae}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from file parsing
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("autosens csv must have headers") {
        return "Invalid headers in autosens CSV. Expected 'ts_s,glucose,delta5,expected_delta5,profile_sens'.".to_string();
    }

    if lower.contains("invalid cycle record") {
        return format!(
            "What happened: The cycle record could not be parsed.\nLikely causes: Malformed JSON or a field of the wrong type.\nHow to fix: Validate the record against the documented schema. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 missing input, 3 invalid config, 4 regression, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use autoisf_core::error::BuildError;

    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::MissingInput(_) => 2,
            CliError::InvalidConfig(_) => 3,
            CliError::Regression(_) => 4,
        };
    }
    if matches!(
        err.downcast_ref::<BuildError>(),
        Some(
            BuildError::MissingGlucose
                | BuildError::MissingProfile
                | BuildError::MissingIob
                | BuildError::EmptyIob
        )
    ) {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    use autoisf_core::error::{AutoIsfError, BuildError};

    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::MissingInput(_) => "MissingInput",
            CliError::InvalidConfig(_) => "InvalidConfig",
            CliError::Regression(_) => "Regression",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidCycle";
    }
    if let Some(AutoIsfError::Cancelled) = err.downcast_ref::<AutoIsfError>() {
        return "Cancelled";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(CliError::Regression(violations)) = err.downcast_ref::<CliError>() {
        return json!({
            "reason": "Regression",
            "details": { "violations": violations },
            "message": humanize(err),
        })
        .to_string();
    }
    json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
