//! Batch replay of recorded cycles against their reference decisions.
//!
//! Every cycle is decided on its own. A cycle that fails to adapt or
//! decide is logged and counted; the rest of the batch still runs.

use std::sync::atomic::{AtomicBool, Ordering};

use autoisf_traits::{CycleSource, DecisionSink};

use crate::builder::DecisionInputs;
use crate::decision::{Decision, TempAction};
use crate::error::{AutoIsfError, Result};

/// What a reference loop decided for the same cycle. `eventual_bg` in mmol/L.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReferenceOutcome {
    pub eventual_bg: Option<f64>,
    pub rate: Option<f64>,
    pub duration: Option<u32>,
    pub insulin_req: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCase {
    pub label: Option<String>,
    pub inputs: DecisionInputs,
    pub reference: Option<ReferenceOutcome>,
}

/// Agreement with the reference over one batch. A metric is `None` when no
/// cycle carried both sides of the comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayMetrics {
    /// Cycles decided successfully
    pub count: usize,
    /// Cycles that could not be adapted or decided
    pub failed: usize,
    pub eventual_mae: Option<f64>,
    pub eventual_rmse: Option<f64>,
    pub eventual_max_abs: Option<f64>,
    pub rate_mae: Option<f64>,
    pub rate_match_pct: Option<f64>,
    pub insulin_req_mae: Option<f64>,
    pub duration_match_pct: Option<f64>,
}

#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    failed: usize,
    eventual_n: usize,
    eventual_abs: f64,
    eventual_sq: f64,
    eventual_max: f64,
    rate_n: usize,
    rate_abs: f64,
    rate_hits: usize,
    req_n: usize,
    req_abs: f64,
    duration_n: usize,
    duration_hits: usize,
}

/// Rate the pump ends up running after `decision`.
fn effective_rate(case: &ReplayCase, decision: &Decision) -> f64 {
    match decision.action() {
        TempAction::Set { rate, .. } => rate,
        TempAction::Cancel => case.inputs.profile.current_basal,
        TempAction::Keep if case.inputs.current_temp.duration > 0 => {
            case.inputs.current_temp.rate
        }
        TempAction::Keep => case.inputs.profile.current_basal,
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: f64, n: usize) -> Option<f64> {
    (n > 0).then(|| sum / n as f64)
}

#[allow(clippy::cast_precision_loss)]
fn pct(hits: usize, n: usize) -> Option<f64> {
    (n > 0).then(|| 100.0 * hits as f64 / n as f64)
}

impl Accumulator {
    fn record(&mut self, case: &ReplayCase, decision: &Decision, rate_tolerance: f64) {
        self.count += 1;
        let Some(reference) = case.reference else {
            return;
        };

        if let (Some(want), Some(got)) = (reference.eventual_bg, decision.eventual_bg) {
            let err = (got - want).abs();
            self.eventual_n += 1;
            self.eventual_abs += err;
            self.eventual_sq += err * err;
            self.eventual_max = self.eventual_max.max(err);
        }
        if let Some(want) = reference.rate {
            let err = (effective_rate(case, decision) - want).abs();
            self.rate_n += 1;
            self.rate_abs += err;
            if err <= rate_tolerance {
                self.rate_hits += 1;
            }
        }
        if let (Some(want), Some(got)) = (reference.insulin_req, decision.insulin_req) {
            self.req_n += 1;
            self.req_abs += (got - want).abs();
        }
        if let (Some(want), Some(got)) = (reference.duration, decision.duration) {
            self.duration_n += 1;
            if want == got {
                self.duration_hits += 1;
            }
        }
    }

    fn finish(self) -> ReplayMetrics {
        ReplayMetrics {
            count: self.count,
            failed: self.failed,
            eventual_mae: mean(self.eventual_abs, self.eventual_n),
            eventual_rmse: mean(self.eventual_sq, self.eventual_n).map(f64::sqrt),
            eventual_max_abs: (self.eventual_n > 0).then_some(self.eventual_max),
            rate_mae: mean(self.rate_abs, self.rate_n),
            rate_match_pct: pct(self.rate_hits, self.rate_n),
            insulin_req_mae: mean(self.req_abs, self.req_n),
            duration_match_pct: pct(self.duration_hits, self.duration_n),
        }
    }
}

/// Decide every cycle `source` yields, hand each decision to `sink`, and
/// score the batch against the references.
///
/// `cancel` is checked before each cycle; once set, the batch stops with
/// `AutoIsfError::Cancelled`. Sink errors abort the batch.
pub fn replay<S, K>(
    source: &mut S,
    sink: &mut K,
    cancel: &AtomicBool,
    rate_tolerance: f64,
) -> Result<ReplayMetrics>
where
    S: CycleSource<Cycle = ReplayCase>,
    K: DecisionSink<ReplayCase, Decision>,
{
    let mut acc = Accumulator::default();
    loop {
        if cancel.load(Ordering::SeqCst) {
            tracing::warn!(done = acc.count, "replay cancelled");
            return Err(eyre::Report::new(AutoIsfError::Cancelled));
        }
        let Some(next) = source.next_cycle() else {
            break;
        };
        let case = match next {
            Ok(case) => case,
            Err(e) => {
                acc.failed += 1;
                tracing::warn!(error = %e, "cycle skipped");
                continue;
            }
        };
        match case.inputs.decide() {
            Ok(decision) => {
                acc.record(&case, &decision, rate_tolerance);
                sink.accept(&case, &decision)
                    .map_err(|e| eyre::eyre!("decision sink: {e}"))?;
            }
            Err(e) => {
                acc.failed += 1;
                tracing::warn!(label = ?case.label, error = %e, "cycle failed");
            }
        }
    }
    let metrics = acc.finish();
    tracing::info!(count = metrics.count, failed = metrics.failed, "replay finished");
    Ok(metrics)
}

// ── Regression guard ─────────────────────────────────────────────────────────

/// Thresholds a replay must meet. Unset thresholds are not checked.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegressionGuard {
    pub max_eventual_mae: Option<f64>,
    pub max_rate_mae: Option<f64>,
    pub min_rate_match_pct: Option<f64>,
}

impl From<&autoisf_config::ReplayCfg> for RegressionGuard {
    fn from(c: &autoisf_config::ReplayCfg) -> Self {
        Self {
            max_eventual_mae: c.max_eventual_mae,
            max_rate_mae: c.max_rate_mae,
            min_rate_match_pct: c.min_rate_match_pct,
        }
    }
}

impl RegressionGuard {
    /// Tighten the thresholds so `metrics` may not be worse than `baseline`.
    #[must_use]
    pub fn against_baseline(self, baseline: &ReplayMetrics) -> Self {
        fn tighter_max(a: Option<f64>, b: Option<f64>) -> Option<f64> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        }
        Self {
            max_eventual_mae: tighter_max(self.max_eventual_mae, baseline.eventual_mae),
            max_rate_mae: tighter_max(self.max_rate_mae, baseline.rate_mae),
            min_rate_match_pct: match (self.min_rate_match_pct, baseline.rate_match_pct) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }

    /// One message per threshold `metrics` breaks. A threshold whose metric
    /// could not be computed counts as broken.
    pub fn violations(&self, metrics: &ReplayMetrics) -> Vec<String> {
        let mut out = Vec::new();
        let mut check_max = |name: &str, limit: Option<f64>, value: Option<f64>| {
            if let Some(limit) = limit {
                match value {
                    Some(v) if v <= limit => {}
                    Some(v) => out.push(format!("{name} {v:.3} exceeds {limit:.3}")),
                    None => out.push(format!("{name} unavailable (limit {limit:.3})")),
                }
            }
        };
        check_max("eventual_bg MAE", self.max_eventual_mae, metrics.eventual_mae);
        check_max("rate MAE", self.max_rate_mae, metrics.rate_mae);
        if let Some(limit) = self.min_rate_match_pct {
            match metrics.rate_match_pct {
                Some(v) if v >= limit => {}
                Some(v) => out.push(format!("rate match {v:.1}% below {limit:.1}%")),
                None => out.push(format!("rate match unavailable (limit {limit:.1}%)")),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::mocks::{CollectSink, VecSource};
    use crate::types::{GlucoseStatus, IobEntry};

    fn case(glucose: f64, reference: Option<ReferenceOutcome>) -> ReplayCase {
        let inputs = DecisionInputs::builder()
            .with_glucose(GlucoseStatus {
                glucose,
                delta: 0.0,
                short_avg_delta: 0.0,
                long_avg_delta: 0.0,
                date: 1_000_000,
                noise: 0.0,
            })
            .with_profile(Profile::default())
            .with_iob(vec![IobEntry::default()])
            .at_time_ms(1_000_000)
            .build()
            .expect("inputs");
        ReplayCase {
            label: None,
            inputs,
            reference,
        }
    }

    #[test]
    fn failures_are_counted_and_do_not_stop_the_batch() {
        let mut source = VecSource::new(vec![
            Ok(case(6.0, None)),
            Err("bad line".into()),
            Ok(case(6.5, None)),
        ]);
        let mut sink = CollectSink::default();
        let m = replay(&mut source, &mut sink, &AtomicBool::new(false), 0.05).expect("replay");
        assert_eq!(m.count, 2);
        assert_eq!(m.failed, 1);
        assert_eq!(sink.decisions.len(), 2);
        assert_eq!(m.eventual_mae, None);
    }

    #[test]
    fn self_reference_scores_perfectly() {
        let probe = case(7.0, None);
        let d = probe.inputs.decide().expect("decide");
        let reference = ReferenceOutcome {
            eventual_bg: d.eventual_bg,
            rate: Some(effective_rate(&probe, &d)),
            duration: d.duration,
            insulin_req: d.insulin_req,
        };
        let mut source = VecSource::new(vec![Ok(case(7.0, Some(reference)))]);
        let mut sink = CollectSink::default();
        let m = replay(&mut source, &mut sink, &AtomicBool::new(false), 0.05).expect("replay");
        assert_eq!(m.eventual_mae, Some(0.0));
        assert_eq!(m.rate_match_pct, Some(100.0));
        assert!(RegressionGuard {
            max_eventual_mae: Some(0.1),
            max_rate_mae: Some(0.1),
            min_rate_match_pct: Some(90.0),
        }
        .violations(&m)
        .is_empty());
    }

    #[test]
    fn cancellation_stops_before_the_next_cycle() {
        let mut source = VecSource::new(vec![Ok(case(6.0, None))]);
        let mut sink = CollectSink::default();
        let err = replay(&mut source, &mut sink, &AtomicBool::new(true), 0.05).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AutoIsfError>(),
            Some(&AutoIsfError::Cancelled)
        );
        assert!(sink.decisions.is_empty());
    }

    #[test]
    fn guard_reports_each_broken_threshold() {
        let metrics = ReplayMetrics {
            count: 10,
            eventual_mae: Some(0.8),
            rate_mae: Some(0.1),
            rate_match_pct: Some(40.0),
            ..ReplayMetrics::default()
        };
        let guard = RegressionGuard {
            max_eventual_mae: Some(0.5),
            max_rate_mae: Some(0.2),
            min_rate_match_pct: Some(50.0),
        };
        let v = guard.violations(&metrics);
        assert_eq!(v.len(), 2);
        assert!(v[0].contains("eventual_bg MAE"));
        assert!(v[1].contains("rate match"));
    }

    #[test]
    fn baseline_tightens_thresholds() {
        let baseline = ReplayMetrics {
            eventual_mae: Some(0.3),
            rate_mae: Some(0.5),
            rate_match_pct: Some(80.0),
            ..ReplayMetrics::default()
        };
        let guard = RegressionGuard {
            max_eventual_mae: Some(0.5),
            ..RegressionGuard::default()
        }
        .against_baseline(&baseline);
        assert_eq!(guard.max_eventual_mae, Some(0.3));
        assert_eq!(guard.max_rate_mae, Some(0.5));
        assert_eq!(guard.min_rate_match_pct, Some(80.0));
    }

    #[test]
    fn missing_metric_breaks_a_set_threshold() {
        let guard = RegressionGuard {
            max_rate_mae: Some(0.1),
            ..RegressionGuard::default()
        };
        let v = guard.violations(&ReplayMetrics::default());
        assert_eq!(v.len(), 1);
        assert!(v[0].contains("unavailable"));
    }
}
