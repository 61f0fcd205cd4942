//! Sensitivity ratio from observed versus expected glucose deltas.
//!
//! Each usable sample yields `expected / observed`; the median over the
//! window, clipped, becomes the autosens ratio. Too few samples means
//! no adjustment.

use crate::types::AutosensResult;

/// One 5-minute observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutosensSample {
    /// Epoch seconds
    pub ts_s: i64,
    pub glucose: Option<f64>,
    pub delta5: Option<f64>,
    pub expected_delta5: Option<f64>,
    pub profile_sens: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutosensWindow {
    pub window_minutes: u32,
    pub min_points: usize,
    pub clip_min: f64,
    pub clip_max: f64,
}

impl Default for AutosensWindow {
    fn default() -> Self {
        Self {
            window_minutes: 180,
            min_points: 4,
            clip_min: 0.7,
            clip_max: 1.3,
        }
    }
}

fn sample_ratio(s: &AutosensSample) -> Option<f64> {
    let delta = s.delta5?;
    let expected = s.expected_delta5?;
    let sens = s.profile_sens?;
    if sens == 0.0 || !sens.is_finite() || !delta.is_finite() || delta == 0.0 {
        return None;
    }
    let r = expected / delta;
    (r.is_finite() && r > 0.0).then_some(r)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Median ratio over the trailing window ending at the newest sample.
pub fn autosens_ratio(samples: &[AutosensSample], window: &AutosensWindow) -> AutosensResult {
    let Some(newest) = samples.iter().map(|s| s.ts_s).max() else {
        return AutosensResult {
            ratio: 1.0,
            reason: "autosens: no samples".to_string(),
        };
    };
    let start = newest - i64::from(window.window_minutes) * 60;

    let mut ratios: Vec<f64> = samples
        .iter()
        .filter(|s| s.ts_s >= start)
        .filter_map(sample_ratio)
        .collect();
    let used = ratios.len();

    if used < window.min_points {
        tracing::debug!(used, min = window.min_points, "autosens: too few samples");
        return AutosensResult {
            ratio: 1.0,
            reason: format!(
                "autosens: {used} usable samples, need {}; ratio 1",
                window.min_points
            ),
        };
    }

    let raw = median(&mut ratios).unwrap_or(1.0);
    let ratio = raw.max(window.clip_min).min(window.clip_max);
    tracing::debug!(used, raw, ratio, "autosens ratio");
    AutosensResult {
        ratio,
        reason: format!(
            "autosens: median of {used} samples {raw:.2}, ratio {ratio:.2}"
        ),
    }
}
