//! SMB eligibility and microbolus sizing.

use crate::config::{LoopSmbMode, Profile};
use crate::format::ReasonFormat;
use crate::sensitivity::NORMAL_TARGET;
use crate::types::MealData;
use crate::units::round_dec;

/// Share of the IOB threshold a full-loop SMB may fill (percent).
pub const IOB_TH_TOLERANCE: f64 = 130.0;

/// Eligibility from the profile's enable table.
pub fn enable_smb(
    profile: &Profile,
    microbolus_allowed: bool,
    meal: &MealData,
    target_bg: f64,
    fmt: ReasonFormat,
    notes: &mut Vec<String>,
) -> bool {
    if !microbolus_allowed {
        notes.push("SMB disabled (!microBolusAllowed)".to_string());
        return false;
    }
    if !profile.allow_smb_with_high_temptarget && profile.temptarget_set && target_bg > NORMAL_TARGET
    {
        notes.push(format!("SMB disabled due to high temptarget of {target_bg}"));
        return false;
    }
    if profile.enable_smb_always {
        notes.push("SMB enabled due to enableSMB_always".to_string());
        return true;
    }
    if profile.enable_smb_with_cob && meal.meal_cob != 0.0 {
        notes.push(format!("SMB enabled for COB of {}", meal.meal_cob));
        return true;
    }
    if profile.enable_smb_after_carbs && meal.carbs != 0.0 {
        notes.push("SMB enabled for 6h after carb entry".to_string());
        return true;
    }
    if profile.enable_smb_with_temptarget && profile.temptarget_set && target_bg < NORMAL_TARGET {
        notes.push(format!("SMB enabled for temptarget of {}", fmt.bg(target_bg)));
        return true;
    }
    notes.push("SMB disabled (no enableSMB preferences active or no condition satisfied)".to_string());
    false
}

/// Eligibility including the loop's SMB mode. Without microboluses, or in
/// `Aaps` mode, the profile table decides.
pub fn initial_eligibility(
    mode: LoopSmbMode,
    profile: &Profile,
    microbolus_allowed: bool,
    meal: &MealData,
    target_bg: f64,
    fmt: ReasonFormat,
    notes: &mut Vec<String>,
) -> bool {
    if microbolus_allowed && mode != LoopSmbMode::Aaps {
        let on = matches!(mode, LoopSmbMode::Enforced | LoopSmbMode::FullLoop);
        notes.push(format!("SMB mode {mode:?}: {}", if on { "enabled" } else { "disabled" }));
        return on;
    }
    enable_smb(profile, microbolus_allowed, meal, target_bg, fmt, notes)
}

/// Fraction of BG the largest recent delta may reach before SMB is disabled.
pub const fn max_delta_fraction(mode: LoopSmbMode) -> f64 {
    if mode.is_full_loop() { 0.3 } else { 0.2 }
}

/// SMB delivery ratio when the loop does not fix one: the profile's flat
/// ratio, or a linear ramp from `min` at target to `max` at
/// `target + bg_range`.
pub fn delivery_ratio(profile: &Profile, bg: f64, target_bg: f64) -> f64 {
    let range = profile.smb_delivery_ratio_bg_range;
    if range <= 0.0 {
        return profile.smb_delivery_ratio;
    }
    let lo = profile.smb_delivery_ratio_min;
    let hi = profile.smb_delivery_ratio_max;
    let t = ((bg - target_bg) / range).clamp(0.0, 1.0);
    let ratio = lo + (hi - lo) * t;
    ratio.clamp(lo.min(hi), lo.max(hi))
}

/// Floor `units` to the pump's bolus increment. A non-positive increment
/// leaves the value as is.
pub fn floor_to_increment(units: f64, increment: f64) -> f64 {
    if increment <= 0.0 || !increment.is_finite() {
        return units;
    }
    let steps = 1.0 / increment;
    (units * steps).floor() / steps
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmbSizing {
    pub insulin_req: f64,
    pub iob: f64,
    pub meal_cob: f64,
    pub carb_ratio: f64,
    pub current_basal: f64,
    pub max_smb_basal_minutes: f64,
    pub max_uam_smb_basal_minutes: f64,
    pub range_extension: f64,
    pub bolus_increment: f64,
    pub auto_isf_mode: bool,
    pub smb_ratio: f64,
    pub mode: LoopSmbMode,
    /// Effective IOB threshold (U) including the tolerance.
    pub iob_th_virtual: f64,
}

/// Size the microbolus.
///
/// Without AutoISF mode: half the requirement, limited to the max bolus.
/// In AutoISF mode the delivery ratio replaces the half, and enforced/full
/// loop modes stop at the IOB threshold. Never negative.
pub fn microbolus(s: &SmbSizing, notes: &mut Vec<String>) -> (f64, f64) {
    let meal_insulin_req = round_dec(crate::units::safe_div(s.meal_cob, s.carb_ratio), 3);
    let minutes = if s.iob > meal_insulin_req && s.iob > 0.0 {
        notes.push(format!(
            "IOB {} > COB {}; mealInsulinReq = {meal_insulin_req}",
            s.iob, s.meal_cob
        ));
        notes.push(format!(
            "profile.maxUAMSMBBasalMinutes: {} profile.current_basal: {}",
            s.max_uam_smb_basal_minutes, s.current_basal
        ));
        s.max_uam_smb_basal_minutes
    } else {
        notes.push(format!(
            "profile.maxSMBBasalMinutes: {} profile.current_basal: {}",
            s.max_smb_basal_minutes, s.current_basal
        ));
        s.max_smb_basal_minutes
    };
    let max_bolus = round_dec(s.range_extension * s.current_basal * minutes / 60.0, 1);

    let units = if s.auto_isf_mode {
        let mut units = (s.insulin_req * s.smb_ratio).min(max_bolus);
        let headroom = s.iob_th_virtual - s.iob;
        if units > headroom && s.mode.caps_to_iob_threshold() {
            units = headroom;
            notes.push(format!(
                "Full loop capped SMB at {} to not exceed {IOB_TH_TOLERANCE}% of effective iobTH {}U",
                round_dec(units, 2),
                round_dec(s.iob_th_virtual / IOB_TH_TOLERANCE * 100.0, 2)
            ));
        }
        floor_to_increment(units, s.bolus_increment)
    } else {
        floor_to_increment((s.insulin_req / 2.0).min(max_bolus), s.bolus_increment)
    };
    (units.max(0.0), max_bolus)
}
