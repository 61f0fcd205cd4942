//! Runtime configuration consumed by the engine.
//!
//! These mirror `autoisf_config` but hold already-converted mmol/L values;
//! see `conversions` for the mapping.

use crate::format::ReasonFormat;

/// Therapy profile. Glucose values in mmol/L, ISF in mmol/L per U.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub min_bg: f64,
    pub max_bg: f64,
    pub target_bg: f64,
    pub sens: f64,
    pub carb_ratio: f64,
    pub current_basal: f64,
    pub max_basal: f64,
    pub max_daily_basal: f64,
    pub max_iob: f64,

    pub autosens_max: f64,
    pub sensitivity_raises_target: bool,
    pub resistance_lowers_target: bool,
    pub adv_target_adjustments: bool,

    pub enable_uam: bool,
    pub exercise_mode: bool,
    pub high_temptarget_raises_sensitivity: bool,
    pub low_temptarget_lowers_sensitivity: bool,
    /// mg/dL
    pub half_basal_exercise_target: f64,
    pub temptarget_set: bool,

    pub remaining_carbs_cap: f64,
    pub max_smb_basal_minutes: f64,
    pub max_uam_smb_basal_minutes: f64,
    pub bolus_increment: f64,
    pub skip_neutral_temps: bool,

    pub enable_smb_always: bool,
    pub enable_smb_with_cob: bool,
    pub enable_smb_after_carbs: bool,
    pub enable_smb_with_temptarget: bool,
    pub allow_smb_with_high_temptarget: bool,

    pub smb_delivery_ratio: f64,
    pub smb_delivery_ratio_min: f64,
    pub smb_delivery_ratio_max: f64,
    pub smb_delivery_ratio_bg_range: f64,

    pub autoisf_version: String,
    /// ISF used in AutoISF mode
    pub variable_sens: f64,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            min_bg: 5.0,
            max_bg: 7.0,
            target_bg: 6.0,
            sens: 2.5,
            carb_ratio: 10.0,
            current_basal: 1.0,
            max_basal: 3.0,
            max_daily_basal: 1.5,
            max_iob: 3.0,
            autosens_max: 1.2,
            sensitivity_raises_target: false,
            resistance_lowers_target: false,
            adv_target_adjustments: false,
            enable_uam: true,
            exercise_mode: false,
            high_temptarget_raises_sensitivity: false,
            low_temptarget_lowers_sensitivity: false,
            half_basal_exercise_target: 160.0,
            temptarget_set: false,
            remaining_carbs_cap: 90.0,
            max_smb_basal_minutes: 30.0,
            max_uam_smb_basal_minutes: 30.0,
            bolus_increment: 0.1,
            skip_neutral_temps: false,
            enable_smb_always: false,
            enable_smb_with_cob: false,
            enable_smb_after_carbs: false,
            enable_smb_with_temptarget: false,
            allow_smb_with_high_temptarget: false,
            smb_delivery_ratio: 0.5,
            smb_delivery_ratio_min: 0.6,
            smb_delivery_ratio_max: 0.9,
            smb_delivery_ratio_bg_range: 0.0,
            autoisf_version: "3.0".to_string(),
            variable_sens: 2.5,
        }
    }
}

/// SMB policy requested by the surrounding loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopSmbMode {
    /// Decide from the profile's enableSMB table.
    #[default]
    Aaps,
    /// Always enable when microboluses are allowed.
    Enforced,
    /// Like `Enforced`, with a looser max-delta gate and IOB-threshold cap.
    FullLoop,
    /// Never enable when microboluses are allowed.
    Disabled,
}

impl LoopSmbMode {
    pub const fn is_full_loop(self) -> bool {
        matches!(self, Self::FullLoop)
    }

    pub const fn caps_to_iob_threshold(self) -> bool {
        matches!(self, Self::FullLoop | Self::Enforced)
    }
}

/// Options of one loop invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopOptions {
    pub microbolus_allowed: bool,
    /// Cycle time, epoch ms
    pub current_time_ms: i64,
    pub flat_bgs_detected: bool,
    pub auto_isf_mode: bool,
    pub loop_wanted_smb: LoopSmbMode,
    pub profile_percentage: u32,
    /// Fixed SMB delivery ratio; derived from the profile when `None`.
    pub smb_ratio: Option<f64>,
    pub smb_max_range_extension: f64,
    pub iob_threshold_percent: u32,
    pub reason_format: ReasonFormat,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            microbolus_allowed: false,
            current_time_ms: 0,
            flat_bgs_detected: false,
            auto_isf_mode: false,
            loop_wanted_smb: LoopSmbMode::Aaps,
            profile_percentage: 100,
            smb_ratio: None,
            smb_max_range_extension: 1.0,
            iob_threshold_percent: 100,
            reason_format: ReasonFormat::default(),
        }
    }
}
