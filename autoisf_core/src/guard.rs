//! Blend the per-curve minima into `min_guard_bg`, `min_pred_bg` and
//! `avg_pred_bg`.
//!
//! `None` minima are unbounded: a blend touching one stays unbounded, and
//! the final `min_pred_bg` then falls back to `avg_pred_bg`.

use crate::predictions::CurveMinima;
use crate::units::{BG_FLOOR, round_dec, safe_div};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardInputs {
    pub minima: CurveMinima,
    /// Last value of the trimmed IOB curve.
    pub last_iob: f64,
    pub last_cob: Option<f64>,
    pub last_uam: Option<f64>,
    pub carbs: f64,
    pub meal_cob: f64,
    pub enable_uam: bool,
    /// Carbs still being absorbed (`cid > 0` or remaining peak > 0).
    pub absorbing: bool,
    pub threshold: f64,
    pub target_bg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardOutcome {
    pub min_guard_bg: f64,
    pub min_pred_bg: f64,
    pub avg_pred_bg: f64,
    pub min_zt_uam_pred_bg: Option<f64>,
    pub fraction_carbs_left: f64,
    /// Prediction minima floored at 2.2.
    pub min_iob_pred_bg: Option<f64>,
    pub min_cob_pred_bg: Option<f64>,
    pub min_uam_pred_bg: Option<f64>,
}

/// `max` where `None` is +infinity.
fn max_bounded(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        _ => None,
    }
}

/// Blend UAM's minimum with the zero-temp guard depending on where the
/// latter sits relative to `threshold` and `target_bg`.
fn zt_uam_blend(min_uam: f64, min_zt_guard: f64, threshold: f64, target_bg: f64) -> f64 {
    let blended = if min_zt_guard < threshold {
        (min_uam + min_zt_guard) / 2.0
    } else if min_zt_guard < target_bg {
        let pct = safe_div(min_zt_guard - threshold, target_bg - threshold);
        let blended_zt = min_uam * pct + min_zt_guard * (1.0 - pct);
        (min_uam + blended_zt) / 2.0
    } else if min_zt_guard > min_uam {
        (min_uam + min_zt_guard) / 2.0
    } else {
        min_uam
    };
    round_dec(blended, 1)
}

pub fn blend(input: &GuardInputs) -> GuardOutcome {
    let m = input.minima;
    let floor = |v: Option<f64>| v.map(|x| x.max(BG_FLOOR));
    let min_iob = floor(m.min_iob_pred);
    let min_cob = floor(m.min_cob_pred);
    let min_uam = floor(m.min_uam_pred);

    let fraction_carbs_left = safe_div(input.meal_cob, input.carbs);

    let avg = match (min_uam, min_cob) {
        (Some(u), Some(c)) => {
            (1.0 - fraction_carbs_left) * input.last_uam.unwrap_or(u)
                + fraction_carbs_left * input.last_cob.unwrap_or(c)
        }
        (None, Some(c)) => (input.last_iob + input.last_cob.unwrap_or(c)) / 2.0,
        (Some(u), None) => (input.last_iob + input.last_uam.unwrap_or(u)) / 2.0,
        (None, None) => input.last_iob,
    };
    let avg_pred_bg = round_dec(avg, 1).max(m.min_zt_guard);

    let guard = if input.absorbing {
        if input.enable_uam {
            fraction_carbs_left * m.min_cob_guard + (1.0 - fraction_carbs_left) * m.min_uam_guard
        } else {
            m.min_cob_guard
        }
    } else if input.enable_uam {
        m.min_uam_guard
    } else {
        m.min_iob_guard
    };
    let min_guard_bg = round_dec(guard, 1);

    let min_zt_uam =
        min_uam.map(|u| zt_uam_blend(u, m.min_zt_guard, input.threshold, input.target_bg));

    let min_pred = if input.carbs != 0.0 {
        match min_cob {
            Some(c) if !input.enable_uam => max_bounded(min_iob, Some(c)),
            Some(c) => {
                let blended = min_zt_uam
                    .map(|zu| fraction_carbs_left * c + (1.0 - fraction_carbs_left) * zu);
                max_bounded(min_iob, max_bounded(Some(c), blended))
            }
            None if input.enable_uam => min_zt_uam,
            None => Some(min_guard_bg),
        }
    } else if input.enable_uam {
        max_bounded(min_iob, min_zt_uam)
    } else {
        min_iob
    };
    let min_pred_bg = min_pred.map_or(avg_pred_bg, |v| round_dec(v, 1).min(avg_pred_bg));

    GuardOutcome {
        min_guard_bg,
        min_pred_bg,
        avg_pred_bg,
        min_zt_uam_pred_bg: min_zt_uam,
        fraction_carbs_left,
        min_iob_pred_bg: min_iob,
        min_cob_pred_bg: min_cob,
        min_uam_pred_bg: min_uam,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn minima(iob: Option<f64>, cob: Option<f64>, uam: Option<f64>, zt: f64) -> CurveMinima {
        CurveMinima {
            min_iob_pred: iob,
            min_cob_pred: cob,
            min_uam_pred: uam,
            min_iob_guard: 5.0,
            min_cob_guard: 6.0,
            min_uam_guard: 4.0,
            min_zt_guard: zt,
        }
    }

    fn inputs(m: CurveMinima) -> GuardInputs {
        GuardInputs {
            minima: m,
            last_iob: 6.0,
            last_cob: None,
            last_uam: None,
            carbs: 0.0,
            meal_cob: 0.0,
            enable_uam: false,
            absorbing: false,
            threshold: 3.6,
            target_bg: 6.0,
        }
    }

    #[test]
    fn iob_only_uses_iob_guard_and_minimum() {
        let out = blend(&inputs(minima(Some(5.5), None, None, 3.0)));
        assert!((out.min_guard_bg - 5.0).abs() < 1e-12);
        assert!((out.avg_pred_bg - 6.0).abs() < 1e-12);
        assert!((out.min_pred_bg - 5.5).abs() < 1e-12);
        assert_eq!(out.min_zt_uam_pred_bg, None);
    }

    #[test]
    fn unbounded_minimum_falls_back_to_average() {
        let out = blend(&inputs(minima(None, None, None, 3.0)));
        assert!((out.min_pred_bg - out.avg_pred_bg).abs() < 1e-12);
    }

    #[test]
    fn prediction_minima_are_floored() {
        let out = blend(&inputs(minima(Some(1.0), None, None, 1.0)));
        assert_eq!(out.min_iob_pred_bg, Some(BG_FLOOR));
        assert!((out.min_pred_bg - BG_FLOOR).abs() < 1e-12);
    }

    #[test]
    fn zero_temp_guard_raises_average() {
        let out = blend(&inputs(minima(Some(5.5), None, None, 8.0)));
        assert!((out.avg_pred_bg - 8.0).abs() < 1e-12);
    }

    #[test]
    fn absorbing_carbs_blend_cob_and_uam_guards() {
        let mut i = inputs(minima(Some(5.0), Some(6.0), Some(5.0), 7.0));
        i.carbs = 40.0;
        i.meal_cob = 10.0;
        i.enable_uam = true;
        i.absorbing = true;
        i.last_cob = Some(7.0);
        i.last_uam = Some(6.0);
        let out = blend(&i);
        // 0.25 * 6.0 + 0.75 * 4.0
        assert!((out.min_guard_bg - 4.5).abs() < 1e-12);
        // 0.75 * 6.0 + 0.25 * 7.0 = 6.25 -> 6.3, raised to zt guard 7.0
        assert!((out.avg_pred_bg - 7.0).abs() < 1e-12);
        assert!(out.min_pred_bg <= out.avg_pred_bg);
        assert!(out.min_pred_bg >= 5.0);
    }

    #[rstest]
    #[case(3.0, 4.0, 3.5)]
    #[case(4.2, 5.0, 4.7)]
    #[case(7.0, 5.0, 6.0)]
    #[case(7.0, 8.0, 8.0)]
    fn zero_temp_blend_regions(#[case] zt: f64, #[case] uam: f64, #[case] want: f64) {
        // threshold 3.6, target 6.0
        let got = zt_uam_blend(uam, zt, 3.6, 6.0);
        assert!((got - want).abs() < 1e-9, "zt {zt} uam {uam} -> {got}");
    }
}
