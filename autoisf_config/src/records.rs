//! JSON-lines cycle records: one dosing cycle per line.
//!
//! A record carries the algorithm inputs in the units it names, and
//! optionally the decision a reference loop made for the same cycle.
//! Either a ready IOB timeline (`iob`) or raw `insulin_events` may be given;
//! likewise `meal` or raw `carb_events`.

use std::io::BufRead;

use serde::Deserialize;

use crate::{GlucoseUnits, ProfileCfg};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GlucoseRecord {
    pub glucose: f64,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub short_avg_delta: f64,
    #[serde(default)]
    pub long_avg_delta: f64,
    /// Reading time (epoch ms); defaults to the cycle time when absent.
    #[serde(default)]
    pub date: Option<i64>,
    #[serde(default)]
    pub noise: f64,
    #[serde(default)]
    pub units: GlucoseUnits,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(default)]
pub struct TempRecord {
    pub duration: u32,
    pub rate: f64,
    pub minutes_running: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IobRecord {
    pub iob: f64,
    #[serde(default)]
    pub activity: f64,
    #[serde(default)]
    pub iob_with_zero_temp: Option<Box<IobRecord>>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsulinEventRecord {
    Bolus { at_ms: i64, units: f64 },
    TempBasal { at_ms: i64, rate: f64, duration_min: f64 },
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(default)]
pub struct MealRecord {
    pub carbs: f64,
    pub meal_cob: f64,
    pub last_carb_time: i64,
    pub slope_from_max_deviation: f64,
    pub slope_from_min_deviation: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct CarbEventRecord {
    pub at_ms: i64,
    pub grams: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AutosensRecord {
    pub ratio: f64,
    pub reason: String,
}

impl Default for AutosensRecord {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            reason: String::new(),
        }
    }
}

/// What the reference loop decided for this cycle. `eventual_bg` is in the
/// record's glucose units.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(default)]
pub struct ReferenceRecord {
    pub eventual_bg: Option<f64>,
    pub rate: Option<f64>,
    pub duration: Option<u32>,
    pub insulin_req: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CycleRecord {
    #[serde(default)]
    pub label: Option<String>,
    pub glucose: GlucoseRecord,
    #[serde(default)]
    pub current_temp: TempRecord,
    #[serde(default)]
    pub iob: Vec<IobRecord>,
    #[serde(default)]
    pub insulin_events: Vec<InsulinEventRecord>,
    #[serde(default)]
    pub meal: Option<MealRecord>,
    #[serde(default)]
    pub carb_events: Vec<CarbEventRecord>,
    #[serde(default)]
    pub autosens: AutosensRecord,
    /// Cycle time (epoch ms); the caller's clock is used when absent.
    #[serde(default)]
    pub current_time_ms: Option<i64>,
    #[serde(default)]
    pub flat_bgs_detected: bool,
    #[serde(default)]
    pub microbolus_allowed: Option<bool>,
    #[serde(default)]
    pub temptarget_set: Option<bool>,
    /// Per-cycle AutoISF ISF, in the profile's units.
    #[serde(default)]
    pub variable_sens: Option<f64>,
    /// Replaces the configured profile for this cycle.
    #[serde(default)]
    pub profile: Option<ProfileCfg>,
    #[serde(default)]
    pub reference: Option<ReferenceRecord>,
}

pub fn parse_cycle_record(line: &str) -> eyre::Result<CycleRecord> {
    serde_json::from_str::<CycleRecord>(line).map_err(|e| eyre::eyre!("invalid cycle record: {e}"))
}

/// Iterates the records of a JSON-lines stream.
///
/// Blank lines and lines starting with `#` are skipped. Each item carries the
/// 1-based line number so callers can report bad lines and keep going.
pub struct CycleRecordReader<R> {
    inner: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> CycleRecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for CycleRecordReader<R> {
    type Item = (usize, eyre::Result<CycleRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_no += 1;
                    let line = self.buf.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let parsed = parse_cycle_record(line)
                        .map_err(|e| e.wrap_err(format!("line {}", self.line_no)));
                    return Some((self.line_no, parsed));
                }
                Err(e) => {
                    self.line_no += 1;
                    return Some((
                        self.line_no,
                        Err(eyre::eyre!("read line {}: {e}", self.line_no)),
                    ));
                }
            }
        }
    }
}
