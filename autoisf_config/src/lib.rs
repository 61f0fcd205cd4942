#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas, cycle records and autosens-history parsing for the AutoISF engine.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `CycleRecord` is one dosing cycle in the JSON-lines replay format.
//! - The autosens-history CSV loader enforces its header row.
use serde::Deserialize;

pub mod records;

pub use records::{
    AutosensRecord, CarbEventRecord, CycleRecord, CycleRecordReader, GlucoseRecord,
    InsulinEventRecord, IobRecord, MealRecord, ReferenceRecord, TempRecord, parse_cycle_record,
};

/// Unit of the glucose-valued fields of a profile or record.
///
/// `Auto` treats values above 30 as mg/dL and anything else as mmol/L.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseUnits {
    #[default]
    Mmol,
    Mgdl,
    Auto,
}

/// SMB policy requested by the loop.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmbModeCfg {
    /// Use the profile's enableSMB_* table.
    #[default]
    #[serde(rename = "AAPS", alias = "aaps")]
    Aaps,
    #[serde(rename = "enforced")]
    Enforced,
    #[serde(rename = "fullLoop", alias = "full_loop")]
    FullLoop,
    #[serde(rename = "disabled")]
    Disabled,
}

/// Decimal separator used in the human-readable reason trace.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DecimalSeparatorCfg {
    #[default]
    Comma,
    Point,
}

/// Therapy profile. Glucose-valued fields (`min_bg`, `max_bg`, `target_bg`,
/// `sens`, `variable_sens`, `smb_delivery_ratio_bg_range`) are read in
/// `units`; `half_basal_exercise_target` is always mg/dL. With `auto`,
/// `min_bg` decides the unit for the whole profile.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProfileCfg {
    pub units: GlucoseUnits,
    pub min_bg: f64,
    pub max_bg: f64,
    /// Informational; the engine always works from the min/max midpoint.
    pub target_bg: Option<f64>,
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
    pub half_basal_exercise_target: u32,
    pub temptarget_set: bool,

    pub remaining_carbs_cap: u32,
    pub max_smb_basal_minutes: u32,
    pub max_uam_smb_basal_minutes: u32,
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
    /// BG span above target over which the SMB ratio ramps from min to max (0 disables the ramp)
    pub smb_delivery_ratio_bg_range: f64,

    pub autoisf_version: String,
    /// AutoISF-computed ISF; falls back to `sens` when absent.
    pub variable_sens: Option<f64>,

    /// Insulin action time used when building IOB timelines from events.
    pub dia_hours: f64,
    /// Carb absorption time used when building meal state from carb events.
    pub carb_absorption_hours: f64,
}

impl Default for ProfileCfg {
    fn default() -> Self {
        Self {
            units: GlucoseUnits::Mmol,
            min_bg: 5.0,
            max_bg: 7.0,
            target_bg: None,
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
            half_basal_exercise_target: 160,
            temptarget_set: false,
            remaining_carbs_cap: 90,
            max_smb_basal_minutes: 30,
            max_uam_smb_basal_minutes: 30,
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
            variable_sens: None,
            dia_hours: 5.0,
            carb_absorption_hours: 3.0,
        }
    }
}

/// Loop-level options (the `[loop]` table).
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoopCfg {
    pub microbolus_allowed: bool,
    pub auto_isf_mode: bool,
    pub loop_wanted_smb: SmbModeCfg,
    pub profile_percentage: u32,
    /// Fixed SMB delivery ratio; when absent it is derived from the profile.
    pub smb_ratio: Option<f64>,
    pub smb_max_range_extension: f64,
    pub iob_threshold_percent: u32,
    pub decimal_separator: DecimalSeparatorCfg,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            microbolus_allowed: false,
            auto_isf_mode: false,
            loop_wanted_smb: SmbModeCfg::Aaps,
            profile_percentage: 100,
            smb_ratio: None,
            smb_max_range_extension: 1.0,
            iob_threshold_percent: 100,
            decimal_separator: DecimalSeparatorCfg::Comma,
        }
    }
}

/// Replay comparison thresholds. Unset thresholds are not enforced.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReplayCfg {
    pub max_eventual_mae: Option<f64>,
    pub max_rate_mae: Option<f64>,
    pub min_rate_match_pct: Option<f64>,
    /// Absolute rate difference (U/h) still counted as a match.
    pub rate_tolerance: f64,
}

impl Default for ReplayCfg {
    fn default() -> Self {
        Self {
            max_eventual_mae: None,
            max_rate_mae: None,
            min_rate_match_pct: None,
            rate_tolerance: 0.05,
        }
    }
}

/// Autosens-from-history window (the `[autosens]` table).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct AutosensCfg {
    pub window_minutes: u32,
    pub min_points: usize,
    pub clip_min: f64,
    pub clip_max: f64,
}

impl Default for AutosensCfg {
    fn default() -> Self {
        Self {
            window_minutes: 180,
            min_points: 4,
            clip_min: 0.7,
            clip_max: 1.3,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileCfg,
    #[serde(default, rename = "loop")]
    pub loop_opts: LoopCfg,
    #[serde(default)]
    pub replay: ReplayCfg,
    #[serde(default)]
    pub autosens: AutosensCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// One row of the autosens-history CSV.
///
/// Expected headers:
/// ts_s,glucose,delta5,expected_delta5,profile_sens
///
/// Empty cells are read as missing.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct AutosensRow {
    pub ts_s: i64,
    pub glucose: Option<f64>,
    pub delta5: Option<f64>,
    pub expected_delta5: Option<f64>,
    pub profile_sens: Option<f64>,
}

pub fn load_autosens_csv(path: &std::path::Path) -> eyre::Result<Vec<AutosensRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open autosens CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["ts_s", "glucose", "delta5", "expected_delta5", "profile_sens"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "autosens CSV must have headers '{}', got: {}",
            expected.join(","),
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<AutosensRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}

fn finite_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        let p = &self.profile;
        if !finite_positive(p.min_bg) {
            eyre::bail!("profile.min_bg must be > 0");
        }
        if !p.max_bg.is_finite() || p.max_bg < p.min_bg {
            eyre::bail!("profile.max_bg must be >= profile.min_bg");
        }
        if p
            .target_bg
            .is_some_and(|t| !t.is_finite() || t < p.min_bg || t > p.max_bg)
        {
            eyre::bail!("profile.target_bg must lie within [min_bg, max_bg]");
        }
        if !finite_positive(p.sens) {
            eyre::bail!("profile.sens must be > 0");
        }
        if p.variable_sens.is_some_and(|v| !finite_positive(v)) {
            eyre::bail!("profile.variable_sens must be > 0");
        }
        if !finite_positive(p.carb_ratio) {
            eyre::bail!("profile.carb_ratio must be > 0");
        }
        if !p.current_basal.is_finite() || p.current_basal < 0.0 {
            eyre::bail!("profile.current_basal must be >= 0");
        }
        if !finite_positive(p.max_basal) {
            eyre::bail!("profile.max_basal must be > 0");
        }
        if !finite_positive(p.max_daily_basal) {
            eyre::bail!("profile.max_daily_basal must be > 0");
        }
        if !p.max_iob.is_finite() || p.max_iob < 0.0 {
            eyre::bail!("profile.max_iob must be >= 0");
        }
        if !p.autosens_max.is_finite() || !(1.0..=3.0).contains(&p.autosens_max) {
            eyre::bail!("profile.autosens_max must be in [1.0, 3.0]");
        }
        if p.half_basal_exercise_target <= 100 {
            eyre::bail!("profile.half_basal_exercise_target must be > 100 (mg/dL)");
        }
        if !finite_positive(p.bolus_increment) || p.bolus_increment > 1.0 {
            eyre::bail!("profile.bolus_increment must be in (0.0, 1.0]");
        }
        for (key, v) in [
            ("profile.smb_delivery_ratio", p.smb_delivery_ratio),
            ("profile.smb_delivery_ratio_min", p.smb_delivery_ratio_min),
            ("profile.smb_delivery_ratio_max", p.smb_delivery_ratio_max),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                eyre::bail!("{key} must be in [0.0, 1.0]");
            }
        }
        if !p.smb_delivery_ratio_bg_range.is_finite() || p.smb_delivery_ratio_bg_range < 0.0 {
            eyre::bail!("profile.smb_delivery_ratio_bg_range must be >= 0");
        }
        if !finite_positive(p.dia_hours) || p.dia_hours > 12.0 {
            eyre::bail!("profile.dia_hours must be in (0, 12]");
        }
        if !finite_positive(p.carb_absorption_hours) || p.carb_absorption_hours > 12.0 {
            eyre::bail!("profile.carb_absorption_hours must be in (0, 12]");
        }

        let l = &self.loop_opts;
        if l.profile_percentage == 0 || l.profile_percentage > 500 {
            eyre::bail!("loop.profile_percentage must be in [1, 500]");
        }
        if l.iob_threshold_percent == 0 || l.iob_threshold_percent > 200 {
            eyre::bail!("loop.iob_threshold_percent must be in [1, 200]");
        }
        if l
            .smb_ratio
            .is_some_and(|r| !r.is_finite() || !(0.0..=1.0).contains(&r))
        {
            eyre::bail!("loop.smb_ratio must be in [0.0, 1.0]");
        }
        if !finite_positive(l.smb_max_range_extension) {
            eyre::bail!("loop.smb_max_range_extension must be > 0");
        }

        let r = &self.replay;
        if !r.rate_tolerance.is_finite() || r.rate_tolerance < 0.0 {
            eyre::bail!("replay.rate_tolerance must be >= 0");
        }
        if r.max_eventual_mae.is_some_and(|v| !v.is_finite() || v < 0.0) {
            eyre::bail!("replay.max_eventual_mae must be >= 0");
        }
        if r.max_rate_mae.is_some_and(|v| !v.is_finite() || v < 0.0) {
            eyre::bail!("replay.max_rate_mae must be >= 0");
        }
        if r
            .min_rate_match_pct
            .is_some_and(|v| !v.is_finite() || !(0.0..=100.0).contains(&v))
        {
            eyre::bail!("replay.min_rate_match_pct must be in [0, 100]");
        }

        let a = &self.autosens;
        if a.window_minutes == 0 {
            eyre::bail!("autosens.window_minutes must be >= 1");
        }
        if a.min_points == 0 {
            eyre::bail!("autosens.min_points must be >= 1");
        }
        if !finite_positive(a.clip_min)
            || !a.clip_max.is_finite()
            || a.clip_min > 1.0
            || a.clip_max < 1.0
        {
            eyre::bail!("autosens clip range must satisfy 0 < clip_min <= 1 <= clip_max");
        }

        if self
            .logging
            .rotation
            .as_deref()
            .is_some_and(|rot| !matches!(rot, "never" | "daily" | "hourly"))
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }
        Ok(())
    }
}
