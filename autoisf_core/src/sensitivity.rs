//! Effective ISF, basal and target band for one cycle.
//!
//! `resolve` is a pure function of its arguments: the same profile,
//! autosens result and temp-target flag always give bit-identical output.

use crate::config::Profile;
use crate::types::AutosensResult;
use crate::units::{MGDL_PER_MMOL, round_dec, safe_div};

/// "Normal" target used as the pivot for temp-target sensitivity (100 mg/dL).
pub const NORMAL_TARGET: f64 = 5.5;

/// Floor for autosens- and high-BG-adjusted targets (80 mg/dL).
pub const TARGET_FLOOR: f64 = 4.4;

/// Offset used when scaling targets by autosens (60 mg/dL).
const AUTOSENS_TARGET_PIVOT: f64 = 3.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetBand {
    pub min_bg: f64,
    pub target_bg: f64,
    pub max_bg: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityResolution {
    pub sensitivity_ratio: f64,
    /// Ratio coming from a temp target (1.0 when none applies).
    pub exercise_ratio: f64,
    /// Scheduled basal scaled by `sensitivity_ratio`.
    pub basal: f64,
    /// ISF used for this cycle.
    pub sens: f64,
    /// Profile ISF rounded to one decimal.
    pub profile_sens: f64,
    pub targets: TargetBand,
    pub notes: Vec<String>,
}

/// Derive sensitivity ratio, basal, ISF and targets.
pub fn resolve(
    profile: &Profile,
    autosens: &AutosensResult,
    temp_target_set: bool,
    auto_isf_mode: bool,
) -> SensitivityResolution {
    let mut notes = Vec::new();
    let mut min_bg = profile.min_bg;
    let mut max_bg = profile.max_bg;
    let mut target_bg = (profile.min_bg + profile.max_bg) / 2.0;

    let high_tt_raises = profile.exercise_mode || profile.high_temptarget_raises_sensitivity;
    let half_basal_target = profile.half_basal_exercise_target / MGDL_PER_MMOL;

    let mut exercise_ratio = 1.0;
    let sensitivity_ratio = if (high_tt_raises && temp_target_set && target_bg > NORMAL_TARGET)
        || (profile.low_temptarget_lowers_sensitivity
            && temp_target_set
            && target_bg < NORMAL_TARGET)
    {
        let c = half_basal_target - NORMAL_TARGET;
        if c * (c + target_bg - NORMAL_TARGET) <= 0.0 {
            profile.autosens_max
        } else {
            let ratio = round_dec(
                safe_div(c, c + target_bg - NORMAL_TARGET).min(profile.autosens_max),
                2,
            );
            exercise_ratio = ratio;
            notes.push(format!(
                "Sensitivity ratio set to {ratio} based on temp target of {target_bg}; "
            ));
            ratio
        }
    } else {
        notes.push(format!("Autosens ratio: {}; ", autosens.ratio));
        autosens.ratio
    };

    let basal = profile.current_basal * sensitivity_ratio;
    if (basal - profile.current_basal).abs() > 1e-9 {
        notes.push(format!(
            "Adjusting basal from {} to {basal};",
            profile.current_basal
        ));
    } else {
        notes.push(format!("Basal unchanged: {basal};"));
    }

    if !temp_target_set
        && ((profile.sensitivity_raises_target && autosens.ratio < 1.0)
            || (profile.resistance_lowers_target && autosens.ratio > 1.0))
    {
        let scale = |v: f64| {
            round_dec(safe_div(v - AUTOSENS_TARGET_PIVOT, autosens.ratio), 1)
                + AUTOSENS_TARGET_PIVOT
        };
        min_bg = scale(min_bg);
        max_bg = scale(max_bg);
        let new_target = scale(target_bg).max(TARGET_FLOOR);
        if (target_bg - new_target).abs() < 1e-9 {
            notes.push(format!("target_bg unchanged: {new_target}; "));
        } else {
            notes.push(format!("target_bg from {target_bg} to {new_target}; "));
        }
        target_bg = new_target;
    }

    let profile_sens = round_dec(profile.sens, 1);
    let adjusted_sens = round_dec(safe_div(profile.sens, sensitivity_ratio), 1);
    if (adjusted_sens - profile_sens).abs() > 1e-9 {
        notes.push(format!("ISF from {profile_sens} to {adjusted_sens}"));
    } else {
        notes.push(format!("ISF unchanged: {adjusted_sens}"));
    }
    let sens = if auto_isf_mode {
        profile.variable_sens
    } else {
        adjusted_sens
    };

    SensitivityResolution {
        sensitivity_ratio,
        exercise_ratio,
        basal,
        sens,
        profile_sens,
        targets: TargetBand {
            min_bg,
            target_bg,
            max_bg,
        },
        notes,
    }
}

/// Pull the target band towards a high BG by a third of the excess.
///
/// Applies only when `bg > max_bg`, advanced target adjustments are on and
/// no temp target is set. Each bound moves independently, and only when both
/// eventual and naive eventual BG stay above the lowered bound.
pub fn adjust_for_high_bg(
    band: TargetBand,
    bg: f64,
    eventual_bg: f64,
    naive_eventual_bg: f64,
    adv_target_adjustments: bool,
    temp_target_set: bool,
) -> (TargetBand, Vec<String>) {
    let mut notes = Vec::new();
    if !(bg > band.max_bg && adv_target_adjustments && !temp_target_set) {
        return (band, notes);
    }
    let lowered = |v: f64| round_dec((v - (bg - v) / 3.0).max(TARGET_FLOOR), 1);
    let accept = |old: f64, new: f64| eventual_bg > new && naive_eventual_bg > new && old > new;

    let mut out = band;
    let adj_min = lowered(band.min_bg);
    if accept(band.min_bg, adj_min) {
        notes.push(format!(
            "Adjusting targets for high BG: min_bg from {} to {adj_min}; ",
            band.min_bg
        ));
        out.min_bg = adj_min;
    } else {
        notes.push(format!("min_bg unchanged: {}; ", band.min_bg));
    }

    let adj_target = lowered(band.target_bg);
    if accept(band.target_bg, adj_target) {
        notes.push(format!(
            "target_bg from {} to {adj_target}; ",
            band.target_bg
        ));
        out.target_bg = adj_target;
    } else {
        notes.push(format!("target_bg unchanged: {}; ", band.target_bg));
    }

    let adj_max = lowered(band.max_bg);
    if accept(band.max_bg, adj_max) {
        notes.push(format!("max_bg from {} to {adj_max}", band.max_bg));
        out.max_bg = adj_max;
    } else {
        notes.push(format!("max_bg unchanged: {}", band.max_bg));
    }
    (out, notes)
}
