//! `replay`: decide a JSON-lines log and score it against the references.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::AtomicBool;

use autoisf_config::{Config, CycleRecordReader};
use autoisf_core::{Decision, RegressionGuard, ReplayCase, ReplayMetrics, inputs_from_record};
use autoisf_traits::{Clock, CycleSource, DecisionSink, SystemClock};
use eyre::WrapErr;
use serde_json::{Value, json};

use crate::decide::action_json;
use crate::error_fmt::CliError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Parses and adapts one record per pull.
pub struct JsonlSource<'a, R> {
    reader: CycleRecordReader<R>,
    cfg: &'a Config,
    clock: &'a dyn Clock,
}

impl<'a, R: BufRead> JsonlSource<'a, R> {
    pub fn new(inner: R, cfg: &'a Config, clock: &'a dyn Clock) -> Self {
        Self {
            reader: CycleRecordReader::new(inner),
            cfg,
            clock,
        }
    }
}

impl<R: BufRead> CycleSource for JsonlSource<'_, R> {
    type Cycle = ReplayCase;

    fn next_cycle(&mut self) -> Option<Result<ReplayCase, BoxError>> {
        let (line, parsed) = self.reader.next()?;
        let adapted = parsed.and_then(|rec| {
            inputs_from_record(&rec, self.cfg, self.clock)
                .wrap_err_with(|| format!("line {line}"))
        });
        Some(adapted.map_err(|e| format!("{e:#}").into()))
    }
}

/// Logs every decision; under `--json` also prints it as one line.
pub struct ReportSink {
    json: bool,
}

impl DecisionSink<ReplayCase, Decision> for ReportSink {
    fn accept(&mut self, cycle: &ReplayCase, decision: &Decision) -> Result<(), BoxError> {
        tracing::debug!(
            label = ?cycle.label,
            rate = ?decision.rate,
            eventual_bg = ?decision.eventual_bg,
            "cycle decided"
        );
        if self.json {
            let line = json!({
                "type": "cycle",
                "label": cycle.label,
                "action": action_json(decision.action()),
                "eventualBG": decision.eventual_bg,
                "insulinReq": decision.insulin_req,
                "units": decision.smb_units,
            });
            println!("{line}");
        }
        Ok(())
    }
}

pub fn metrics_json(m: &ReplayMetrics) -> Value {
    json!({
        "count": m.count,
        "failed": m.failed,
        "eventual_mae": m.eventual_mae,
        "eventual_rmse": m.eventual_rmse,
        "eventual_max_abs": m.eventual_max_abs,
        "rate_mae": m.rate_mae,
        "rate_match_pct": m.rate_match_pct,
        "insulin_req_mae": m.insulin_req_mae,
        "duration_match_pct": m.duration_match_pct,
    })
}

/// Reads metrics written by `metrics_json`; absent keys stay `None`.
pub fn metrics_from_json(v: &Value) -> ReplayMetrics {
    let f = |key: &str| v.get(key).and_then(Value::as_f64);
    let n = |key: &str| {
        v.get(key)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_default()
    };
    ReplayMetrics {
        count: n("count"),
        failed: n("failed"),
        eventual_mae: f("eventual_mae"),
        eventual_rmse: f("eventual_rmse"),
        eventual_max_abs: f("eventual_max_abs"),
        rate_mae: f("rate_mae"),
        rate_match_pct: f("rate_match_pct"),
        insulin_req_mae: f("insulin_req_mae"),
        duration_match_pct: f("duration_match_pct"),
    }
}

fn metrics_text(m: &ReplayMetrics) -> String {
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
    format!(
        "cycles: {} decided, {} failed\neventual BG: MAE {}  RMSE {}  max {}\nrate: MAE {}  match {}%\ninsulinReq MAE: {}\nduration match: {}%",
        m.count,
        m.failed,
        fmt(m.eventual_mae),
        fmt(m.eventual_rmse),
        fmt(m.eventual_max_abs),
        fmt(m.rate_mae),
        fmt(m.rate_match_pct),
        fmt(m.insulin_req_mae),
        fmt(m.duration_match_pct),
    )
}

fn load_baseline(path: &Path) -> eyre::Result<ReplayMetrics> {
    let text = crate::decide::read_input(path)?;
    // the last JSON object in the file is the summary of a --json replay
    let summary = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| eyre::eyre!("baseline {} is empty", path.display()))?;
    let v: Value = serde_json::from_str(summary)
        .wrap_err_with(|| format!("parse baseline {}", path.display()))?;
    Ok(metrics_from_json(v.get("metrics").unwrap_or(&v)))
}

pub fn run_replay(
    cfg: &Config,
    input: &Path,
    guard: bool,
    baseline: Option<&Path>,
    json: bool,
    cancel: &AtomicBool,
) -> eyre::Result<()> {
    let file = match File::open(input) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(eyre::Report::new(CliError::MissingInput(
                input.display().to_string(),
            )));
        }
        Err(e) => return Err(e).wrap_err_with(|| format!("open {}", input.display())),
    };
    let clock = SystemClock::new();
    let mut source = JsonlSource::new(BufReader::new(file), cfg, &clock);
    let mut sink = ReportSink { json };
    let metrics = autoisf_core::replay(
        &mut source,
        &mut sink,
        cancel,
        cfg.replay.rate_tolerance,
    )?;

    let violations = if guard {
        let mut g = RegressionGuard::from(&cfg.replay);
        if let Some(path) = baseline {
            g = g.against_baseline(&load_baseline(path)?);
        }
        g.violations(&metrics)
    } else {
        Vec::new()
    };

    if json {
        println!(
            "{}",
            json!({ "type": "summary", "metrics": metrics_json(&metrics), "violations": violations })
        );
    } else {
        println!("{}", metrics_text(&metrics));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(eyre::Report::new(CliError::Regression(violations)))
    }
}
