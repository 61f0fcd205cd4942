//! Rounding, clamping and unit helpers shared by every stage of the engine.
//!
//! Glucose is carried in mmol/L throughout the core. Deviation and the
//! per-curve minima are rounded to whole mmol/L with `round_dec(x, 0)`.

/// mg/dL per mmol/L.
pub const MGDL_PER_MMOL: f64 = 18.0;

/// Lowest surfaced glucose value (mmol/L, 40 mg/dL).
pub const BG_FLOOR: f64 = 2.2;

/// Highest surfaced glucose value (mmol/L, ~400 mg/dL).
pub const BG_CEIL: f64 = 22.3;

/// Round half away from zero at `digits` decimal places. NaN stays NaN.
#[inline]
#[must_use]
pub fn round_dec(value: f64, digits: i32) -> f64 {
    if value.is_nan() {
        return value;
    }
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Clamp a glucose value into the surfaced range `[2.2, 22.3]` mmol/L.
#[inline]
#[must_use]
pub fn clamp_bg(value: f64) -> f64 {
    value.clamp(BG_FLOOR, BG_CEIL)
}

/// mmol/L to whole mg/dL for display.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn to_mgdl_int(value_mmol: f64) -> i32 {
    // values are clamped to [2.2, 22.3] before export; the cast cannot overflow
    (value_mmol * MGDL_PER_MMOL).round() as i32
}

/// Division that treats a zero or degenerate denominator as "no effect".
///
/// Returns 0.0 whenever the quotient would not be finite.
#[inline]
#[must_use]
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let q = num / den;
    if q.is_finite() { q } else { 0.0 }
}

/// Round a minute count to the nearest multiple of 30 and clamp it.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn round_to_30(minutes: f64, lo: u32, hi: u32) -> u32 {
    if !minutes.is_finite() {
        return lo;
    }
    let m = (minutes.round() / 30.0).round() * 30.0;
    m.clamp(f64::from(lo), f64::from(hi)) as u32
}
