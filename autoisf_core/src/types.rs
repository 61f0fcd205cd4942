//! Per-cycle input snapshots. All glucose values are mmol/L.

/// Sensor state for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlucoseStatus {
    pub glucose: f64,
    /// 5-minute delta (mmol/L per 5 min)
    pub delta: f64,
    /// 15-minute average delta
    pub short_avg_delta: f64,
    /// 40-minute average delta
    pub long_avg_delta: f64,
    /// Reading time, epoch ms
    pub date: i64,
    /// Ordinal 0..=3; 3 and above is unusable
    pub noise: f64,
}

/// Insulin on board at one 5-minute offset; index 0 of a timeline is "now".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IobEntry {
    /// Units
    pub iob: f64,
    /// Units per minute
    pub activity: f64,
    /// The same offset assuming a zero temp from now on.
    pub iob_with_zero_temp: Option<Box<IobEntry>>,
}

impl IobEntry {
    pub fn new(iob: f64, activity: f64) -> Self {
        Self {
            iob,
            activity,
            iob_with_zero_temp: None,
        }
    }

    #[must_use]
    pub fn with_zero_temp(mut self, zero_temp: IobEntry) -> Self {
        self.iob_with_zero_temp = Some(Box::new(zero_temp));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MealData {
    /// Grams logged in the carb window
    pub carbs: f64,
    /// Grams not yet absorbed
    pub meal_cob: f64,
    /// Epoch ms of the most recent carb entry
    pub last_carb_time: i64,
    pub slope_from_max_deviation: f64,
    pub slope_from_min_deviation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutosensResult {
    pub ratio: f64,
    pub reason: String,
}

impl Default for AutosensResult {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            reason: String::new(),
        }
    }
}

impl AutosensResult {
    pub fn with_ratio(ratio: f64) -> Self {
        Self {
            ratio,
            reason: String::new(),
        }
    }
}

/// Temp basal currently running on the pump.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurrentTemp {
    /// Minutes remaining
    pub duration: u32,
    /// U/h
    pub rate: f64,
    pub minutes_running: u32,
}
