//! Insulin and carbohydrate absorption curves.
//!
//! Every other module derives insulin and carb effects through these
//! functions; no other place defines a curve shape.

/// Fraction of a bolus still on board `t_min` minutes after delivery.
///
/// Cubic decay `2x³ - 3x² + 1` with `x = t / (dia * 60)`; 0 outside
/// `[0, dia * 60]`.
#[must_use]
pub fn iob_curve(t_min: f64, dia_hours: f64) -> f64 {
    let dia_min = dia_hours * 60.0;
    if dia_min.is_nan() || dia_min <= 0.0 || t_min < 0.0 || t_min > dia_min {
        return 0.0;
    }
    let x = t_min / dia_min;
    (2.0 * x.powi(3) - 3.0 * x.powi(2) + 1.0).max(0.0)
}

/// Fraction of a bolus absorbed per minute at `t_min`, the negated slope of
/// [`iob_curve`]: `(6x - 6x²) / (dia * 60)`. 0 outside `[0, dia * 60]`.
#[must_use]
pub fn insulin_activity(t_min: f64, dia_hours: f64) -> f64 {
    let dia_min = dia_hours * 60.0;
    if dia_min.is_nan() || dia_min <= 0.0 || t_min < 0.0 || t_min > dia_min {
        return 0.0;
    }
    let x = t_min / dia_min;
    ((6.0 * x - 6.0 * x * x) / dia_min).max(0.0)
}

/// Default time to peak carb absorption (minutes).
pub const CARB_PEAK_MIN: f64 = 120.0;

/// Relative carb absorption rate `t_min` minutes after a meal.
///
/// Parabolic rise `1 - (1 - x)²` up to `peak_min`, then a linear tail that
/// reaches 0 at `cat_hours * 60`. 0 outside `[0, cat_hours * 60]`.
#[must_use]
pub fn carb_impact(t_min: f64, cat_hours: f64, peak_min: f64) -> f64 {
    let cat_min = cat_hours * 60.0;
    if t_min < 0.0 || t_min > cat_min || peak_min.is_nan() || peak_min <= 0.0 {
        return 0.0;
    }
    let x = t_min / peak_min;
    if x <= 1.0 {
        1.0 - (1.0 - x).powi(2)
    } else {
        crate::units::safe_div(cat_min - t_min, cat_min - peak_min).max(0.0)
    }
}
