//! Forward simulation of the BG trajectories (IOB, ZT, COB, aCOB, UAM).
//!
//! One pass over the IOB timeline in 5-minute steps, capped at 48 points
//! (4 hours). Per-curve minima are tracked as the pass goes; minima used for
//! dosing only start after the insulin-peak warm-up (18 steps for IOB/COB,
//! 12 for UAM). `finalize` clamps, trims and exports the curves.

use crate::decision::Predictions;
use crate::error::{BuildError, Result};
use crate::types::{IobEntry, MealData};
use crate::units::{clamp_bg, round_dec, safe_div, to_mgdl_int};

/// Maximum number of points per curve.
pub const MAX_POINTS: usize = 48;

/// Steps before IOB/COB minima count (90 minutes).
const INSULIN_PEAK_STEPS: usize = 18;

/// Steps before the UAM minimum counts (60 minutes).
const UAM_WARMUP_STEPS: usize = 12;

/// g/h
const MAX_CARB_ABSORPTION_RATE: f64 = 30.0;

/// g/h assumed when estimating the absorption window from COB.
const ASSUMED_CARB_ABSORPTION_RATE: f64 = 20.0;

/// Hours of carb absorption assumed at a sensitivity ratio of 1.
const MIN_CARB_ABSORPTION_HOURS: f64 = 3.0;

/// mmol/L per 5 minutes assumed for the aCOB curve.
const ACI: f64 = 10.0;

#[derive(Debug, Clone, Copy)]
pub struct CurveInputs<'a> {
    pub bg: f64,
    pub iob: &'a [IobEntry],
    pub meal: &'a MealData,
    pub sens: f64,
    pub carb_ratio: f64,
    pub sensitivity_ratio: f64,
    pub min_delta: f64,
    /// BG impact of current insulin activity over 5 minutes.
    pub bgi: f64,
    pub now_ms: i64,
    pub enable_uam: bool,
    pub remaining_carbs_cap: f64,
}

/// Carb-absorption model derived before the pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbModel {
    /// Observed carb impact per 5 minutes, limited to `max_ci`.
    pub ci: f64,
    /// Unlimited carb impact, drives the UAM curve.
    pub uci: f64,
    /// Carb sensitivity factor (mmol/L per gram).
    pub csf: f64,
    pub max_ci: f64,
    /// Hours
    pub remaining_ca_time: f64,
    pub remaining_ci_peak: f64,
    pub slope_from_deviations: f64,
    /// Steps over which `ci` decays to zero.
    pub cid: f64,
    /// Same for the assumed `aci`.
    pub acid: f64,
}

impl CarbModel {
    /// Carb absorption is observed or still expected.
    pub fn impact_positive(&self) -> bool {
        self.ci > 0.0 || self.remaining_ci_peak > 0.0
    }

    /// A COB minimum is meaningful this cycle.
    pub fn duration_active(&self) -> bool {
        self.cid != 0.0 || self.remaining_ci_peak > 0.0
    }

    /// Used by the guard blender; same as `duration_active` for non-negative `cid`.
    pub fn absorbing(&self) -> bool {
        self.cid > 0.0 || self.remaining_ci_peak > 0.0
    }
}

/// Untrimmed curves in mmol/L, index 0 is the current BG.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCurves {
    pub iob: Vec<f64>,
    pub zt: Vec<f64>,
    pub cob: Vec<f64>,
    pub acob: Vec<f64>,
    pub uam: Vec<f64>,
}

/// Minima tracked during the pass. Prediction minima are `None` until the
/// warm-up has passed (or when the curve is inactive); guard minima cover
/// every step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveMinima {
    pub min_iob_pred: Option<f64>,
    pub min_cob_pred: Option<f64>,
    pub min_uam_pred: Option<f64>,
    pub min_iob_guard: f64,
    pub min_cob_guard: f64,
    pub min_uam_guard: f64,
    pub min_zt_guard: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSet {
    pub carbs: CarbModel,
    pub curves: RawCurves,
    pub minima: CurveMinima,
    /// Hours of positive UAM impact.
    pub uam_duration: f64,
    pub notes: Vec<String>,
}

/// Derive the carb model from the current deltas and meal state.
pub fn carb_model(input: &CurveInputs<'_>, notes: &mut Vec<String>) -> CarbModel {
    let meal = input.meal;
    let uci = round_dec(input.min_delta - input.bgi, 1);
    let mut ci = uci;

    let csf = safe_div(input.sens, input.carb_ratio);
    notes.push(format!("sens: {}, CSF: {csf}", input.sens));

    let max_ci = round_dec(MAX_CARB_ABSORPTION_RATE * csf * 5.0 / 60.0, 1);
    if ci > max_ci {
        notes.push(format!(
            "Limiting carb impact from {ci} to {max_ci} mmol/L per 5m ( {MAX_CARB_ABSORPTION_RATE} g/h )"
        ));
        ci = max_ci;
    }

    let mut remaining_ca_time_min = safe_div(MIN_CARB_ABSORPTION_HOURS, input.sensitivity_ratio);
    let mut remaining_ca_time = remaining_ca_time_min;
    if meal.carbs != 0.0 {
        remaining_ca_time_min =
            remaining_ca_time_min.max(meal.meal_cob / ASSUMED_CARB_ABSORPTION_RATE);
        #[allow(clippy::cast_precision_loss)]
        let last_carb_age = round_dec((input.now_ms - meal.last_carb_time) as f64 / 60_000.0, 0);
        let fraction_absorbed = safe_div(meal.carbs - meal.meal_cob, meal.carbs);
        remaining_ca_time = round_dec(remaining_ca_time_min + 1.5 * last_carb_age / 60.0, 1);
        notes.push(format!(
            "Last carbs {last_carb_age}minutes ago; remainingCATime:{remaining_ca_time}hours;{}% carbs absorbed",
            round_dec(fraction_absorbed * 100.0, 0)
        ));
    }

    let total_ci = (ci / 5.0 * 60.0 * remaining_ca_time / 2.0).max(0.0);
    let total_ca = safe_div(total_ci, csf);
    let remaining_carbs = (meal.meal_cob - total_ca)
        .max(0.0)
        .min(input.remaining_carbs_cap.min(90.0));
    let remaining_ci_peak = safe_div(remaining_carbs * csf * 5.0 / 60.0, remaining_ca_time / 2.0);

    let slope_max = round_dec(meal.slope_from_max_deviation, 2);
    let slope_min = round_dec(meal.slope_from_min_deviation, 2);
    let slope_from_deviations = slope_max.min(-slope_min / 3.0);

    let cid = if ci == 0.0 {
        0.0
    } else {
        (remaining_ca_time * 60.0 / 5.0 / 2.0).min(safe_div(meal.meal_cob * csf, ci).max(0.0))
    };
    let acid = (meal.meal_cob * csf / ACI).max(0.0);

    notes.push(format!(
        "Carb Impact: {ci} mmol/L per 5m; CI Duration: {} hours; remaining CI (~2h peak): {} mmol/L per 5m",
        round_dec(cid * 5.0 / 60.0 * 2.0, 1),
        round_dec(remaining_ci_peak, 1)
    ));

    CarbModel {
        ci,
        uci,
        csf,
        max_ci,
        remaining_ca_time,
        remaining_ci_peak,
        slope_from_deviations,
        cid,
        acid,
    }
}

/// Lower `slot` to `stored` when `candidate` undercuts the current value.
#[inline]
fn lower(slot: &mut Option<f64>, candidate: f64, stored: f64) {
    match *slot {
        Some(m) if candidate >= m => {}
        _ => *slot = Some(stored),
    }
}

#[inline]
fn last(curve: &[f64]) -> f64 {
    curve.last().copied().unwrap_or_default()
}

/// Run the forward pass.
#[allow(clippy::cast_precision_loss, clippy::too_many_lines)]
pub fn generate(input: &CurveInputs<'_>) -> Result<PredictionSet> {
    if input.iob.is_empty() {
        return Err(eyre::Report::new(BuildError::EmptyIob));
    }
    let mut notes = Vec::new();
    let carbs = carb_model(input, &mut notes);
    let CarbModel {
        ci,
        uci,
        remaining_ca_time,
        remaining_ci_peak,
        slope_from_deviations,
        cid,
        acid,
        ..
    } = carbs;
    let sens = input.sens;
    let bg = input.bg;

    let mut c = RawCurves {
        iob: vec![bg],
        zt: vec![bg],
        cob: vec![bg],
        acob: vec![bg],
        uam: vec![bg],
    };
    let mut min_iob_pred = None;
    let mut min_cob_pred = None;
    let mut min_uam_pred = None;
    let mut guard_iob = None;
    let mut guard_cob = None;
    let mut guard_uam = None;
    let mut guard_zt = None;
    let mut uam_duration = 0.0;
    let mut pred_cis = Vec::with_capacity(input.iob.len());
    let mut remaining_cis = Vec::with_capacity(input.iob.len());

    for tick in input.iob {
        let pred_bgi = round_dec(-tick.activity * sens * 5.0, 2);
        let pred_zt_bgi = tick
            .iob_with_zero_temp
            .as_ref()
            .map_or(pred_bgi, |zt| round_dec(-zt.activity * sens * 5.0, 2));

        // every curve has the same length at this point
        let n = c.iob.len() as f64;

        let pred_dev = ci * (1.0 - (n / 12.0).min(1.0));
        let iob_bg = last(&c.iob) + pred_bgi + pred_dev;
        let zt_bg = last(&c.zt) + pred_zt_bgi;

        let pred_ci = (ci.max(0.0) * (1.0 - n / (cid * 2.0).max(1.0))).max(0.0);
        let pred_aci = (ACI * (1.0 - n / (acid * 2.0).max(1.0))).max(0.0);

        let intervals = n.min(remaining_ca_time * 12.0 - n);
        let remaining_ci =
            (safe_div(intervals, remaining_ca_time / 2.0 * 12.0) * remaining_ci_peak).max(0.0);
        pred_cis.push(to_mgdl_int(pred_ci));
        remaining_cis.push(to_mgdl_int(pred_ci + remaining_ci));

        let cob_bg = last(&c.cob) + pred_bgi + pred_dev.min(0.0) + pred_ci + remaining_ci;
        let acob_bg = last(&c.acob) + pred_bgi + pred_dev.min(0.0) + pred_aci;

        let uci_slope = (uci + n * slope_from_deviations).max(0.0);
        let uci_max = (uci * (1.0 - n / 36.0)).max(0.0);
        let pred_uci = uci_slope.min(uci_max);
        if pred_uci > 0.0 {
            uam_duration = round_dec((n + 1.0) * 5.0 / 60.0, 1);
        }
        let uam_bg = last(&c.uam) + pred_bgi + pred_dev.min(0.0) + pred_uci;

        if c.iob.len() < MAX_POINTS {
            c.iob.push(iob_bg);
            c.cob.push(cob_bg);
            c.acob.push(acob_bg);
            c.uam.push(uam_bg);
            c.zt.push(zt_bg);
        }

        lower(&mut guard_cob, cob_bg, round_dec(cob_bg, 0));
        lower(&mut guard_uam, uam_bg, round_dec(uam_bg, 0));
        lower(&mut guard_iob, iob_bg, iob_bg);
        lower(&mut guard_zt, zt_bg, round_dec(zt_bg, 0));

        let len = c.iob.len();
        if len > INSULIN_PEAK_STEPS {
            lower(&mut min_iob_pred, iob_bg, round_dec(iob_bg, 0));
        }
        if carbs.duration_active() && len > INSULIN_PEAK_STEPS {
            lower(&mut min_cob_pred, cob_bg, round_dec(cob_bg, 0));
        }
        if input.enable_uam && len > UAM_WARMUP_STEPS {
            lower(&mut min_uam_pred, uam_bg, round_dec(uam_bg, 0));
        }
    }

    if input.meal.meal_cob > 0.0 {
        notes.push(format!("predCIs (mg/dL/5m): {}", join_ints(&pred_cis)));
        notes.push(format!("remainingCIs:      {}", join_ints(&remaining_cis)));
    }
    notes.push(format!(
        "UAM Impact: {uci} mmol/L per 5m; UAM Duration: {uam_duration} hours"
    ));

    tracing::trace!(
        ci,
        uci,
        remaining_ci_peak,
        points = c.iob.len(),
        "prediction pass complete"
    );

    Ok(PredictionSet {
        carbs,
        curves: c,
        minima: CurveMinima {
            min_iob_pred,
            min_cob_pred,
            min_uam_pred,
            // the timeline is non-empty, so every guard was set at least once
            min_iob_guard: guard_iob.unwrap_or(bg),
            min_cob_guard: guard_cob.unwrap_or(bg),
            min_uam_guard: guard_uam.unwrap_or(bg),
            min_zt_guard: guard_zt.unwrap_or(bg),
        },
        uam_duration,
        notes,
    })
}

fn join_ints(v: &[i32]) -> String {
    v.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

/// Clamp to the surfaced range and round to 0.1.
fn clamp_round(curve: &[f64]) -> Vec<f64> {
    curve.iter().map(|&v| round_dec(clamp_bg(v), 1)).collect()
}

/// Drop a flat tail, never going below 13 points.
fn trim_flat_tail(curve: &mut Vec<f64>) {
    while curve.len() > 13 {
        let i = curve.len() - 1;
        if (curve[i - 1] - curve[i]).abs() > 1e-9 {
            break;
        }
        curve.pop();
    }
}

/// Drop a tail that keeps rising above target, never going below 7 points.
fn trim_rising_tail(curve: &mut Vec<f64>, target_bg: f64) {
    while curve.len() > 7 {
        let i = curve.len() - 1;
        if curve[i - 1] >= curve[i] || curve[i] <= target_bg {
            break;
        }
        curve.pop();
    }
}

fn export(curve: &[f64]) -> Vec<i32> {
    curve.iter().map(|&v| to_mgdl_int(v)).collect()
}

/// Clamped and trimmed curves plus the values the engine reads from them.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacedCurves {
    pub predictions: Predictions,
    /// Trimmed IOB curve (mmol/L).
    pub iob: Vec<f64>,
    /// Trimmed COB curve when carbs are being absorbed.
    pub cob: Option<Vec<f64>>,
    pub last_iob: f64,
    pub last_cob: Option<f64>,
    pub last_uam: Option<f64>,
    /// Eventual BG after raising it to the active COB/UAM endpoints.
    pub eventual_bg: f64,
}

/// Clamp, trim and export the curves; raise `eventual_bg` to the last
/// COB value (carbs on board and absorbing) and the last UAM value (UAM
/// enabled and absorbing).
pub fn finalize(
    set: &PredictionSet,
    meal_cob: f64,
    target_bg: f64,
    enable_uam: bool,
    eventual_bg: f64,
) -> SurfacedCurves {
    let mut eventual = eventual_bg;
    let mut predictions = Predictions::default();

    let mut iob = clamp_round(&set.curves.iob);
    trim_flat_tail(&mut iob);
    predictions.iob = Some(export(&iob));
    let last_iob = last(&iob);

    let mut zt = clamp_round(&set.curves.zt);
    trim_rising_tail(&mut zt, target_bg);
    predictions.zt = Some(export(&zt));

    if meal_cob > 0.0 {
        let mut acob = clamp_round(&set.curves.acob);
        trim_flat_tail(&mut acob);
        predictions.acob = Some(export(&acob));
    }

    let absorbing = set.carbs.impact_positive();
    let mut cob_curve = None;
    let mut last_cob = None;
    if meal_cob > 0.0 && absorbing {
        let mut cob = clamp_round(&set.curves.cob);
        trim_flat_tail(&mut cob);
        predictions.cob = Some(export(&cob));
        let l = last(&cob);
        eventual = eventual.max(round_dec(l, 1));
        last_cob = Some(l);
        cob_curve = Some(cob);
    }

    let mut last_uam = None;
    if absorbing && enable_uam {
        let mut uam = clamp_round(&set.curves.uam);
        trim_flat_tail(&mut uam);
        predictions.uam = Some(export(&uam));
        let l = last(&uam);
        eventual = eventual.max(round_dec(l, 1));
        last_uam = Some(l);
    }

    SurfacedCurves {
        predictions,
        iob,
        cob: cob_curve,
        last_iob,
        last_cob,
        last_uam,
        eventual_bg: eventual,
    }
}
