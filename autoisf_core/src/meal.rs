//! Meal state from logged carb entries.

use crate::curves::{CARB_PEAK_MIN, carb_impact};
use crate::types::MealData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbEvent {
    pub at_ms: i64,
    pub grams: f64,
}

#[allow(clippy::cast_precision_loss)]
fn minutes_since(now_ms: i64, at_ms: i64) -> f64 {
    (now_ms - at_ms) as f64 / 60_000.0
}

/// Carbs logged within the absorption window, with COB decaying linearly
/// over `cat_hours`. Future entries are ignored. Slope hints stay at 0.
pub fn meal_from_carbs(events: &[CarbEvent], now_ms: i64, cat_hours: f64) -> MealData {
    let cat_min = cat_hours * 60.0;
    let mut meal = MealData::default();
    if !(cat_min.is_finite() && cat_min > 0.0) {
        return meal;
    }
    for ev in events {
        let age = minutes_since(now_ms, ev.at_ms);
        if !(0.0..=cat_min).contains(&age) || !ev.grams.is_finite() {
            continue;
        }
        meal.carbs += ev.grams;
        meal.meal_cob += ev.grams * (1.0 - age / cat_min);
        meal.last_carb_time = meal.last_carb_time.max(ev.at_ms);
    }
    meal
}

/// Current absorption rate summed over all entries, weighted by grams.
pub fn carb_impact_now(events: &[CarbEvent], now_ms: i64, cat_hours: f64) -> f64 {
    events
        .iter()
        .map(|ev| {
            carb_impact(minutes_since(now_ms, ev.at_ms), cat_hours, CARB_PEAK_MIN) * ev.grams
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn cob_decays_linearly_and_tracks_last_entry() {
        let events = [
            CarbEvent {
                at_ms: NOW - 90 * 60_000,
                grams: 30.0,
            },
            CarbEvent {
                at_ms: NOW - 30 * 60_000,
                grams: 20.0,
            },
            // outside the 3h window
            CarbEvent {
                at_ms: NOW - 200 * 60_000,
                grams: 50.0,
            },
            // not eaten yet
            CarbEvent {
                at_ms: NOW + 60_000,
                grams: 10.0,
            },
        ];
        let meal = meal_from_carbs(&events, NOW, 3.0);
        assert!((meal.carbs - 50.0).abs() < 1e-12);
        // 30 * (1 - 90/180) + 20 * (1 - 30/180)
        assert!((meal.meal_cob - (15.0 + 20.0 * 5.0 / 6.0)).abs() < 1e-9);
        assert_eq!(meal.last_carb_time, NOW - 30 * 60_000);
    }

    #[test]
    fn no_carbs_no_meal() {
        assert_eq!(meal_from_carbs(&[], NOW, 3.0), MealData::default());
        let ev = [CarbEvent {
            at_ms: NOW,
            grams: 10.0,
        }];
        assert_eq!(meal_from_carbs(&ev, NOW, 0.0), MealData::default());
    }

    #[test]
    fn impact_peaks_at_two_hours() {
        let at_peak = [CarbEvent {
            at_ms: NOW - 120 * 60_000,
            grams: 10.0,
        }];
        assert!((carb_impact_now(&at_peak, NOW, 3.0) - 10.0).abs() < 1e-9);
        let fresh = [CarbEvent {
            at_ms: NOW,
            grams: 10.0,
        }];
        assert!(carb_impact_now(&fresh, NOW, 3.0).abs() < 1e-12);
    }
}
