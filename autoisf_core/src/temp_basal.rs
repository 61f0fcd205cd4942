//! Rate clamping and the temp-basal commit helper.
//!
//! Every exit path that emits a rate goes through `clamp_rate`.

use crate::config::Profile;
use crate::decision::Decision;
use crate::format::ReasonFormat;
use crate::types::CurrentTemp;

/// Ceiling for any emitted rate (U/h).
pub fn max_safe_basal(profile: &Profile) -> f64 {
    profile.max_basal.min(
        (profile.max_daily_basal * profile.autosens_max)
            .min(profile.current_basal * profile.autosens_max * 2.0),
    )
}

/// Clamp `rate` into `[0, max_safe_basal]`. NaN becomes 0.
pub fn clamp_rate(rate: f64, profile: &Profile) -> f64 {
    let ceiling = max_safe_basal(profile).max(0.0);
    let out = if rate.is_nan() || rate < 0.0 {
        0.0
    } else if rate > ceiling {
        ceiling
    } else {
        rate
    };
    debug_assert!((0.0..=ceiling).contains(&out));
    out
}

/// Commit a temp basal of `rate` for `duration` minutes, unless the running
/// temp is already close enough.
///
/// A running temp within ±20% of the request with at least `duration - 10`
/// minutes left is kept. A request equal to the profile basal either sets a
/// neutral temp or, with `skip_neutral_temps`, cancels the running temp.
pub fn set_temp_basal(
    mut d: Decision,
    rate: f64,
    duration: u32,
    profile: &Profile,
    current: &CurrentTemp,
    fmt: ReasonFormat,
) -> Decision {
    let rate = clamp_rate(rate, profile);

    if duration > 0
        && f64::from(current.duration) > f64::from(duration) - 10.0
        && current.duration <= 120
        && rate <= current.rate * 1.2
        && rate >= current.rate * 0.8
    {
        d.reason.push_str(&format!(
            " {}m left and {} ~ req {}U/hr: no temp required",
            current.duration,
            fmt.without_zeros(current.rate),
            fmt.without_zeros(rate)
        ));
        tracing::debug!(rate, current_rate = current.rate, "running temp kept");
        return d;
    }

    if (rate - profile.current_basal).abs() < 1e-9 {
        if profile.skip_neutral_temps {
            if current.duration > 0 {
                d.reason.push_str(
                    " Suggested rate is same as profile rate, a temp basal is active, canceling current temp",
                );
                d.set_temp(0.0, 0);
            } else {
                d.reason.push_str(
                    " Suggested rate is same as profile rate, no temp basal is active, doing nothing",
                );
            }
            return d;
        }
        d.reason.push_str(&format!(
            " Setting neutral temp basal of {}U/hr",
            profile.current_basal
        ));
    }
    d.set_temp(rate, duration);
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::TempAction;
    use rstest::rstest;

    fn profile() -> Profile {
        Profile {
            current_basal: 1.0,
            max_basal: 3.0,
            max_daily_basal: 1.5,
            autosens_max: 1.2,
            ..Profile::default()
        }
    }

    #[test]
    fn safe_max_is_the_tightest_bound() {
        // min(3.0, 1.5 * 1.2, 1.0 * 1.2 * 2)
        assert!((max_safe_basal(&profile()) - 1.8).abs() < 1e-12);
    }

    #[rstest]
    #[case(-1.0, 0.0)]
    #[case(f64::NAN, 0.0)]
    #[case(0.7, 0.7)]
    #[case(9.0, 1.8)]
    fn clamps(#[case] rate: f64, #[case] want: f64) {
        assert!((clamp_rate(rate, &profile()) - want).abs() < 1e-12);
    }

    #[test]
    fn close_running_temp_is_kept() {
        let current = CurrentTemp {
            duration: 25,
            rate: 1.5,
            minutes_running: 5,
        };
        let d = set_temp_basal(
            Decision::new(0, false),
            1.4,
            30,
            &profile(),
            &current,
            ReasonFormat::default(),
        );
        assert_eq!(d.action(), TempAction::Keep);
        assert!(d.reason.contains("no temp required"));
    }

    #[test]
    fn neutral_request_cancels_with_skip_neutral() {
        let p = Profile {
            skip_neutral_temps: true,
            ..profile()
        };
        let current = CurrentTemp {
            duration: 10,
            rate: 0.0,
            minutes_running: 20,
        };
        let d = set_temp_basal(
            Decision::new(0, false),
            1.0,
            30,
            &p,
            &current,
            ReasonFormat::default(),
        );
        assert_eq!(d.action(), TempAction::Cancel);

        let d = set_temp_basal(
            Decision::new(0, false),
            1.0,
            30,
            &p,
            &CurrentTemp::default(),
            ReasonFormat::default(),
        );
        assert_eq!(d.action(), TempAction::Keep);
    }

    #[test]
    fn neutral_request_sets_neutral_temp() {
        let d = set_temp_basal(
            Decision::new(0, false),
            1.0,
            30,
            &profile(),
            &CurrentTemp::default(),
            ReasonFormat::default(),
        );
        assert_eq!(
            d.action(),
            TempAction::Set {
                rate: 1.0,
                duration: 30
            }
        );
        assert!(d.reason.contains("neutral temp"));
    }

    #[test]
    fn excessive_request_is_clamped() {
        let d = set_temp_basal(
            Decision::new(0, false),
            5.0,
            30,
            &profile(),
            &CurrentTemp::default(),
            ReasonFormat::default(),
        );
        assert!(d.rate.is_some_and(|r| (r - 1.8).abs() < 1e-9));
        assert_eq!(d.duration, Some(30));
    }
}
