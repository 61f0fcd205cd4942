//! `From` implementations bridging `autoisf_config` types to engine types,
//! and the adapter turning one `CycleRecord` into ready `DecisionInputs`.

use autoisf_config::{
    AutosensCfg, AutosensRecord, AutosensRow, CarbEventRecord, Config, CycleRecord,
    DecimalSeparatorCfg, GlucoseRecord, GlucoseUnits, InsulinEventRecord, IobRecord, LoopCfg,
    MealRecord, ProfileCfg, SmbModeCfg, TempRecord,
};
use autoisf_traits::clock::Clock;
use eyre::WrapErr;

use crate::autosens::{AutosensSample, AutosensWindow};
use crate::builder::DecisionInputs;
use crate::config::{LoopOptions, LoopSmbMode, Profile};
use crate::error::Result;
use crate::format::{DecimalSeparator, ReasonFormat};
use crate::iob::{InsulinEvent, iob_timeline};
use crate::meal::{CarbEvent, meal_from_carbs};
use crate::predictions::MAX_POINTS;
use crate::replay::{ReferenceOutcome, ReplayCase};
use crate::types::{AutosensResult, CurrentTemp, GlucoseStatus, IobEntry, MealData};
use crate::units::MGDL_PER_MMOL;

/// Divisor taking a value in `units` to mmol/L. `Auto` decides from `probe`.
fn mmol_divisor(units: GlucoseUnits, probe: f64) -> f64 {
    match units {
        GlucoseUnits::Mmol => 1.0,
        GlucoseUnits::Mgdl => MGDL_PER_MMOL,
        GlucoseUnits::Auto if probe > 30.0 => MGDL_PER_MMOL,
        GlucoseUnits::Auto => 1.0,
    }
}

fn profile_divisor(c: &ProfileCfg) -> f64 {
    mmol_divisor(c.units, c.min_bg)
}

// ── Profile ──────────────────────────────────────────────────────────────────

impl From<&ProfileCfg> for Profile {
    fn from(c: &ProfileCfg) -> Self {
        let div = profile_divisor(c);
        let min_bg = c.min_bg / div;
        let max_bg = c.max_bg / div;
        Self {
            min_bg,
            max_bg,
            target_bg: c.target_bg.map_or((min_bg + max_bg) / 2.0, |t| t / div),
            sens: c.sens / div,
            carb_ratio: c.carb_ratio,
            current_basal: c.current_basal,
            max_basal: c.max_basal,
            max_daily_basal: c.max_daily_basal,
            max_iob: c.max_iob,
            autosens_max: c.autosens_max,
            sensitivity_raises_target: c.sensitivity_raises_target,
            resistance_lowers_target: c.resistance_lowers_target,
            adv_target_adjustments: c.adv_target_adjustments,
            enable_uam: c.enable_uam,
            exercise_mode: c.exercise_mode,
            high_temptarget_raises_sensitivity: c.high_temptarget_raises_sensitivity,
            low_temptarget_lowers_sensitivity: c.low_temptarget_lowers_sensitivity,
            half_basal_exercise_target: f64::from(c.half_basal_exercise_target),
            temptarget_set: c.temptarget_set,
            remaining_carbs_cap: f64::from(c.remaining_carbs_cap),
            max_smb_basal_minutes: f64::from(c.max_smb_basal_minutes),
            max_uam_smb_basal_minutes: f64::from(c.max_uam_smb_basal_minutes),
            bolus_increment: c.bolus_increment,
            skip_neutral_temps: c.skip_neutral_temps,
            enable_smb_always: c.enable_smb_always,
            enable_smb_with_cob: c.enable_smb_with_cob,
            enable_smb_after_carbs: c.enable_smb_after_carbs,
            enable_smb_with_temptarget: c.enable_smb_with_temptarget,
            allow_smb_with_high_temptarget: c.allow_smb_with_high_temptarget,
            smb_delivery_ratio: c.smb_delivery_ratio,
            smb_delivery_ratio_min: c.smb_delivery_ratio_min,
            smb_delivery_ratio_max: c.smb_delivery_ratio_max,
            smb_delivery_ratio_bg_range: c.smb_delivery_ratio_bg_range / div,
            autoisf_version: c.autoisf_version.clone(),
            variable_sens: c.variable_sens.unwrap_or(c.sens) / div,
        }
    }
}

// ── Loop options ─────────────────────────────────────────────────────────────

impl From<SmbModeCfg> for LoopSmbMode {
    fn from(c: SmbModeCfg) -> Self {
        match c {
            SmbModeCfg::Aaps => Self::Aaps,
            SmbModeCfg::Enforced => Self::Enforced,
            SmbModeCfg::FullLoop => Self::FullLoop,
            SmbModeCfg::Disabled => Self::Disabled,
        }
    }
}

impl From<DecimalSeparatorCfg> for DecimalSeparator {
    fn from(c: DecimalSeparatorCfg) -> Self {
        match c {
            DecimalSeparatorCfg::Comma => Self::Comma,
            DecimalSeparatorCfg::Point => Self::Point,
        }
    }
}

/// Per-cycle fields (`current_time_ms`, `flat_bgs_detected`) start unset.
impl From<&LoopCfg> for LoopOptions {
    fn from(c: &LoopCfg) -> Self {
        Self {
            microbolus_allowed: c.microbolus_allowed,
            current_time_ms: 0,
            flat_bgs_detected: false,
            auto_isf_mode: c.auto_isf_mode,
            loop_wanted_smb: c.loop_wanted_smb.into(),
            profile_percentage: c.profile_percentage,
            smb_ratio: c.smb_ratio,
            smb_max_range_extension: c.smb_max_range_extension,
            iob_threshold_percent: c.iob_threshold_percent,
            reason_format: ReasonFormat::new(c.decimal_separator.into()),
        }
    }
}

// ── Autosens ─────────────────────────────────────────────────────────────────

impl From<&AutosensRow> for AutosensSample {
    fn from(r: &AutosensRow) -> Self {
        Self {
            ts_s: r.ts_s,
            glucose: r.glucose,
            delta5: r.delta5,
            expected_delta5: r.expected_delta5,
            profile_sens: r.profile_sens,
        }
    }
}

impl From<&AutosensCfg> for AutosensWindow {
    fn from(c: &AutosensCfg) -> Self {
        Self {
            window_minutes: c.window_minutes,
            min_points: c.min_points,
            clip_min: c.clip_min,
            clip_max: c.clip_max,
        }
    }
}

impl From<&AutosensRecord> for AutosensResult {
    fn from(r: &AutosensRecord) -> Self {
        Self {
            ratio: r.ratio,
            reason: r.reason.clone(),
        }
    }
}

// ── Cycle pieces ─────────────────────────────────────────────────────────────

impl From<&InsulinEventRecord> for InsulinEvent {
    fn from(r: &InsulinEventRecord) -> Self {
        match *r {
            InsulinEventRecord::Bolus { at_ms, units } => Self::Bolus { at_ms, units },
            InsulinEventRecord::TempBasal {
                at_ms,
                rate,
                duration_min,
            } => Self::TempBasal {
                at_ms,
                rate,
                duration_min,
            },
        }
    }
}

impl From<&CarbEventRecord> for CarbEvent {
    fn from(r: &CarbEventRecord) -> Self {
        Self {
            at_ms: r.at_ms,
            grams: r.grams,
        }
    }
}

impl From<&IobRecord> for IobEntry {
    fn from(r: &IobRecord) -> Self {
        let entry = Self::new(r.iob, r.activity);
        match &r.iob_with_zero_temp {
            Some(zt) => entry.with_zero_temp(Self::from(zt.as_ref())),
            None => entry,
        }
    }
}

impl From<&MealRecord> for MealData {
    fn from(r: &MealRecord) -> Self {
        Self {
            carbs: r.carbs,
            meal_cob: r.meal_cob,
            last_carb_time: r.last_carb_time,
            slope_from_max_deviation: r.slope_from_max_deviation,
            slope_from_min_deviation: r.slope_from_min_deviation,
        }
    }
}

impl From<&TempRecord> for CurrentTemp {
    fn from(r: &TempRecord) -> Self {
        Self {
            duration: r.duration,
            rate: r.rate,
            minutes_running: r.minutes_running,
        }
    }
}

fn glucose_status(r: &GlucoseRecord, now_ms: i64) -> GlucoseStatus {
    let div = mmol_divisor(r.units, r.glucose);
    GlucoseStatus {
        glucose: r.glucose / div,
        delta: r.delta / div,
        short_avg_delta: r.short_avg_delta / div,
        long_avg_delta: r.long_avg_delta / div,
        date: r.date.unwrap_or(now_ms),
        noise: r.noise,
    }
}

// ── Record adapter ───────────────────────────────────────────────────────────

/// Turn one cycle record into engine inputs plus its reference outcome.
///
/// The record's own profile replaces the configured one and is validated
/// the same way. An empty `iob` is rebuilt from `insulin_events`, and a
/// missing `meal` from `carb_events`. The cycle time comes from the record,
/// else from `clock`.
pub fn inputs_from_record(
    rec: &CycleRecord,
    cfg: &Config,
    clock: &dyn Clock,
) -> Result<ReplayCase> {
    let now_ms = rec.current_time_ms.unwrap_or_else(|| clock.now_ms());

    let profile_cfg = match &rec.profile {
        Some(p) => {
            let mut scoped = cfg.clone();
            scoped.profile = p.clone();
            scoped.validate().wrap_err("record profile")?;
            p
        }
        None => &cfg.profile,
    };
    let mut profile = Profile::from(profile_cfg);
    if let Some(v) = rec.variable_sens {
        profile.variable_sens = v / profile_divisor(profile_cfg);
    }
    if let Some(tt) = rec.temptarget_set {
        profile.temptarget_set = tt;
    }

    let mut options = LoopOptions::from(&cfg.loop_opts);
    options.flat_bgs_detected = rec.flat_bgs_detected;
    if let Some(allowed) = rec.microbolus_allowed {
        options.microbolus_allowed = allowed;
    }

    let iob: Vec<IobEntry> = if rec.iob.is_empty() && !rec.insulin_events.is_empty() {
        let events: Vec<InsulinEvent> = rec.insulin_events.iter().map(Into::into).collect();
        iob_timeline(
            &events,
            now_ms,
            profile_cfg.dia_hours,
            profile.current_basal,
            MAX_POINTS,
        )
    } else {
        rec.iob.iter().map(Into::into).collect()
    };

    let meal = match &rec.meal {
        Some(m) => MealData::from(m),
        None => {
            let events: Vec<CarbEvent> = rec.carb_events.iter().map(Into::into).collect();
            meal_from_carbs(&events, now_ms, profile_cfg.carb_absorption_hours)
        }
    };

    let glucose = glucose_status(&rec.glucose, now_ms);
    let reference_div = mmol_divisor(rec.glucose.units, rec.glucose.glucose);

    let inputs = DecisionInputs::builder()
        .with_glucose(glucose)
        .with_profile(profile)
        .with_iob(iob)
        .with_current_temp(CurrentTemp::from(&rec.current_temp))
        .with_autosens(AutosensResult::from(&rec.autosens))
        .with_meal(meal)
        .with_options(options)
        .at_time_ms(now_ms)
        .build()?;

    let reference = rec.reference.map(|r| ReferenceOutcome {
        eventual_bg: r.eventual_bg.map(|v| v / reference_div),
        rate: r.rate,
        duration: r.duration,
        insulin_req: r.insulin_req,
    });

    Ok(ReplayCase {
        label: rec.label.clone(),
        inputs,
        reference,
    })
}
