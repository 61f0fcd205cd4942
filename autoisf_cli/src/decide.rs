//! `decide`: one recorded cycle in, one decision out.

use std::fmt::Write as _;
use std::path::Path;

use autoisf_core::{Decision, TempAction, inputs_from_record};
use autoisf_traits::SystemClock;
use eyre::WrapErr;
use serde_json::{Value, json};

use crate::error_fmt::CliError;

/// Read a file the user named on the command line; a missing file is a
/// typed error so it maps to its own exit code.
pub fn read_input(path: &Path) -> eyre::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(eyre::Report::new(
            CliError::MissingInput(path.display().to_string()),
        )),
        Err(e) => Err(e).wrap_err_with(|| format!("read {}", path.display())),
    }
}

pub fn action_json(action: TempAction) -> Value {
    match action {
        TempAction::Keep => json!({ "kind": "keep" }),
        TempAction::Cancel => json!({ "kind": "cancel" }),
        TempAction::Set { rate, duration } => {
            json!({ "kind": "set", "rate": rate, "duration": duration })
        }
    }
}

pub fn decision_json(d: &Decision) -> Value {
    let predictions = d.predictions.as_ref().map(|p| {
        json!({
            "IOB": p.iob,
            "ZT": p.zt,
            "COB": p.cob,
            "aCOB": p.acob,
            "UAM": p.uam,
        })
    });
    json!({
        "algorithm": d.algorithm,
        "runningDynamicIsf": d.running_dynamic_isf,
        "timestamp": d.timestamp,
        "bg": d.bg,
        "tick": d.tick,
        "eventualBG": d.eventual_bg,
        "targetBG": d.target_bg,
        "insulinReq": d.insulin_req,
        "carbsReq": d.carbs_req,
        "carbsReqWithin": d.carbs_req_within,
        "deliverAt": d.deliver_at,
        "sensitivityRatio": d.sensitivity_ratio,
        "action": action_json(d.action()),
        "rate": d.rate,
        "duration": d.duration,
        "units": d.smb_units,
        "predBGs": predictions,
        "COB": d.cob,
        "IOB": d.iob,
        "variable_sens": d.variable_sens,
        "reason": d.reason,
        "consoleLog": d.console_log,
        "consoleError": d.console_error,
    })
}

fn opt(v: Option<f64>, digits: usize) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.digits$}"))
}

pub fn decision_text(d: &Decision) -> String {
    let mut out = String::new();
    let action = match d.action() {
        TempAction::Keep => "keep current temp".to_string(),
        TempAction::Cancel => "cancel temp".to_string(),
        TempAction::Set { rate, duration } => format!("temp {rate:.2} U/h for {duration} min"),
    };
    let _ = writeln!(out, "Action: {action}");
    if let Some(units) = d.smb_units {
        let _ = writeln!(out, "Microbolus: {units:.2} U");
    }
    let _ = writeln!(
        out,
        "BG: {}  tick: {}  eventual: {}  target: {}",
        opt(d.bg, 1),
        d.tick.as_deref().unwrap_or("-"),
        opt(d.eventual_bg, 1),
        opt(d.target_bg, 1)
    );
    let _ = writeln!(
        out,
        "insulinReq: {}  IOB: {}  COB: {}  ISF: {}",
        opt(d.insulin_req, 2),
        opt(d.iob, 2),
        opt(d.cob, 0),
        opt(d.variable_sens, 1)
    );
    if let Some(carbs) = d.carbs_req {
        let _ = writeln!(
            out,
            "Carbs required: {carbs} g within {} min",
            d.carbs_req_within.unwrap_or_default()
        );
    }
    let _ = write!(out, "Reason: {}", d.reason);
    out
}

pub fn run_decide(cfg: &autoisf_config::Config, input: &Path, json: bool) -> eyre::Result<()> {
    let text = read_input(input)?;
    let record = autoisf_config::parse_cycle_record(text.trim())?;
    let case = inputs_from_record(&record, cfg, &SystemClock::new())?;
    tracing::debug!(label = ?case.label, "deciding cycle");
    let decision = case.inputs.decide()?;
    tracing::info!(
        rate = ?decision.rate,
        duration = ?decision.duration,
        smb = ?decision.smb_units,
        eventual_bg = ?decision.eventual_bg,
        "decision"
    );
    if json {
        println!("{}", decision_json(&decision));
    } else {
        println!("{}", decision_text(&decision));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_action_serializes_rate_and_duration() {
        let v = action_json(TempAction::Set {
            rate: 1.25,
            duration: 30,
        });
        assert_eq!(v["kind"], "set");
        assert_eq!(v["duration"], 30);
        assert!((v["rate"].as_f64().unwrap() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn missing_input_is_typed() {
        let dir = std::env::temp_dir().join("autoisf-does-not-exist.json");
        let err = read_input(&dir).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::MissingInput(_))
        ));
    }
}
