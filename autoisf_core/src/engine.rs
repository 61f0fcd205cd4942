//! The per-cycle basal/SMB decision.
//!
//! `determine_basal` is a pure function of its inputs. Branches run in a
//! fixed order and the first one that commits (or deliberately keeps) a temp
//! basal ends the cycle:
//!
//! 1. sensor fault
//! 2. carbs-required advisory (never terminal)
//! 3. deep low: zero temp
//! 4. skip-neutral cancel near the top of the hour
//! 5. eventual BG below target range
//! 6. falling slower than expected / in range, when SMB is off
//! 7. above range: max IOB hold, SMB, or a computed temp

use autoisf_traits::clock::minute_of_hour;

use crate::builder::DecisionInputs;
use crate::config::Profile;
use crate::decision::Decision;
use crate::error::{BuildError, Result};
use crate::format::ReasonFormat;
use crate::guard::{GuardInputs, blend};
use crate::predictions::{CurveInputs, finalize, generate};
use crate::sensitivity::{adjust_for_high_bg, resolve};
use crate::smb::{
    IOB_TH_TOLERANCE, SmbSizing, delivery_ratio, initial_eligibility, max_delta_fraction,
    microbolus,
};
use crate::temp_basal::{clamp_rate, set_temp_basal};
use crate::types::{CurrentTemp, GlucoseStatus};
use crate::units::{BG_FLOOR, round_dec, round_to_30, safe_div};

/// BG at or below this reads as a calibrating sensor (mmol/L, ~10 mg/dL).
const SENSOR_FLOOR: f64 = 0.6;

/// Flat readings only count as a fault above this BG (mmol/L, 60 mg/dL).
const FLAT_BG_MIN: f64 = 3.3;

/// Readings older than this many minutes are stale.
const MAX_BG_AGE_MIN: f64 = 12.0;

/// Readings this far in the future (minutes) point at a wrong clock.
const MIN_BG_AGE_MIN: f64 = -5.0;

/// Horizon over which `expected_delta` closes the gap to target (5-min blocks in 2h).
const EXPECTED_DELTA_BLOCKS: f64 = 24.0;

/// Minute past the hour from which neutral temps are cancelled.
const SKIP_NEUTRAL_MINUTE: u32 = 55;

/// Horizon of the prediction curves in minutes.
const HORIZON_MIN: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorFault {
    /// BG at or below the sensor floor, or noise of 3 and above.
    Calibrating,
    Stale { minutes_ago: f64, bg_time: i64 },
    Flat,
}

/// Every fault present in this reading.
pub fn sensor_faults(glucose: &GlucoseStatus, now_ms: i64, flat_bgs_detected: bool) -> Vec<SensorFault> {
    let mut faults = Vec::new();
    #[allow(clippy::cast_precision_loss)]
    let minutes_ago = round_dec((now_ms - glucose.date) as f64 / 60_000.0, 1);
    if glucose.glucose <= SENSOR_FLOOR || glucose.noise >= 3.0 {
        faults.push(SensorFault::Calibrating);
    }
    if minutes_ago > MAX_BG_AGE_MIN || minutes_ago < MIN_BG_AGE_MIN {
        faults.push(SensorFault::Stale {
            minutes_ago,
            bg_time: glucose.date,
        });
    } else if glucose.glucose > FLAT_BG_MIN && flat_bgs_detected {
        faults.push(SensorFault::Flat);
    }
    faults
}

fn describe_faults(d: &mut Decision, faults: &[SensorFault], now_ms: i64) {
    for fault in faults {
        match fault {
            SensorFault::Calibrating => {
                d.reason
                    .push_str("CGM is calibrating, in ??? state, or noise is high");
            }
            SensorFault::Stale {
                minutes_ago,
                bg_time,
            } => d.reason.push_str(&format!(
                "If current system time {now_ms} is correct, then BG data is too old. The last BG data was read {minutes_ago}m ago at {bg_time}"
            )),
            SensorFault::Flat => d
                .reason
                .push_str("Error: CGM data is unchanged for the past ~45m"),
        }
    }
}

/// Safe response to unusable sensor data: neutralize a high temp, shorten a
/// long zero temp, or leave things alone.
fn sensor_fault_response(
    mut d: Decision,
    profile: &Profile,
    current: &CurrentTemp,
    fmt: ReasonFormat,
) -> Decision {
    let basal = profile.current_basal;
    if current.rate > basal {
        d.reason.push_str(&format!(
            ". Replacing high temp basal of {} with neutral temp of {basal}",
            current.rate
        ));
        d.deliver_at = Some(d.timestamp);
        d.set_temp(clamp_rate(basal, profile), 30);
    } else if current.rate == 0.0 && current.duration > 30 {
        d.reason.push_str(&format!(
            ". Shortening {}m long zero temp to 30m. ",
            current.duration
        ));
        d.deliver_at = Some(d.timestamp);
        d.set_temp(0.0, 30);
    } else {
        d.reason.push_str(&format!(
            ". Temp {} <= current basal {}U/hr; doing nothing. ",
            current.rate,
            fmt.without_zeros(round_dec(basal, 2))
        ));
    }
    d
}

/// Keep a running temp equal to `basal`, otherwise set `basal` for 30 minutes.
fn hold_basal(
    mut d: Decision,
    basal: f64,
    profile: &Profile,
    current: &CurrentTemp,
    fmt: ReasonFormat,
) -> Decision {
    if current.duration > 15 && (basal - current.rate).abs() < 1e-9 {
        d.reason.push_str(&format!(
            ", temp {} ~ req {}U/hr. ",
            current.rate,
            fmt.without_zeros(round_dec(basal, 2))
        ));
        return d;
    }
    d.reason.push_str(&format!(
        "; setting current basal of {} as temp. ",
        round_dec(basal, 2)
    ));
    set_temp_basal(d, basal, 30, profile, current, fmt)
}

/// Minutes until `curve` first drops below `level`, 240 if it never does.
fn minutes_above(curve: &[f64], level: f64) -> u32 {
    curve
        .iter()
        .position(|&v| v < level)
        .and_then(|i| u32::try_from(i * 5).ok())
        .unwrap_or(HORIZON_MIN)
}

/// BG change per 5 minutes that would bring eventual BG to target in 2 hours.
pub fn expected_delta(target_bg: f64, eventual_bg: f64, bgi: f64) -> f64 {
    round_dec(bgi + (target_bg - eventual_bg) / EXPECTED_DELTA_BLOCKS, 1)
}

/// Low-BG threshold halfway between `min_bg` and 2.2 mmol/L.
pub fn low_threshold(min_bg: f64) -> f64 {
    min_bg - 0.5 * (min_bg - BG_FLOOR)
}

/// Run one dosing cycle.
#[allow(clippy::too_many_lines, clippy::cognitive_complexity)]
pub fn determine_basal(inputs: &DecisionInputs) -> Result<Decision> {
    let DecisionInputs {
        glucose,
        current_temp: current,
        iob,
        profile,
        autosens,
        meal,
        options,
    } = inputs;
    let fmt = options.reason_format;
    let now_ms = options.current_time_ms;
    let iob_now = iob
        .first()
        .ok_or_else(|| eyre::Report::new(BuildError::EmptyIob))?;

    let mut d = Decision::new(now_ms, options.auto_isf_mode);
    let bg = glucose.glucose;

    let faults = sensor_faults(glucose, now_ms, options.flat_bgs_detected);
    if !faults.is_empty() {
        tracing::debug!(?faults, bg, "sensor fault");
        describe_faults(&mut d, &faults, now_ms);
        return sensor_fault_response(d, profile, current, fmt).ensure_finite();
    }

    // ── Sensitivity and targets ──────────────────────────────────────────────
    let res = resolve(profile, autosens, profile.temptarget_set, options.auto_isf_mode);
    d.console_error.extend(res.notes.iter().cloned());
    d.console_error.push(format!("CR: {}", profile.carb_ratio));
    if options.auto_isf_mode {
        d.console_error
            .push(format!("start AutoISF {}", profile.autoisf_version));
    }
    let sensitivity_ratio = res.sensitivity_ratio;
    let basal = res.basal;
    let sens = res.sens;
    if !(sens.is_finite() && sens > 0.0) {
        tracing::warn!(sens, "degenerate ISF; insulin effects contribute nothing");
    }
    if !(profile.carb_ratio.is_finite() && profile.carb_ratio > 0.0) {
        tracing::warn!(carb_ratio = profile.carb_ratio, "degenerate carb ratio; carb effects contribute nothing");
    }

    let iob_th_reduction = if options.iob_threshold_percent == 100 {
        1.0
    } else {
        f64::from(options.profile_percentage) / 100.0 * res.exercise_ratio
    };
    let iob_th_virtual = f64::from(options.iob_threshold_percent) * IOB_TH_TOLERANCE / 10_000.0
        * profile.max_iob
        * iob_th_reduction;

    let delta = glucose.delta;
    let tick = if delta > -0.05 {
        format!("+{}", fmt.bg(delta))
    } else {
        fmt.bg(delta)
    };
    let min_delta = delta.min(glucose.short_avg_delta);
    let min_avg_delta = glucose.short_avg_delta.min(glucose.long_avg_delta);
    let max_delta = delta.max(glucose.short_avg_delta.max(glucose.long_avg_delta));

    let mut band = res.targets;
    let mut enable_smb = initial_eligibility(
        options.loop_wanted_smb,
        profile,
        options.microbolus_allowed,
        meal,
        band.target_bg,
        fmt,
        &mut d.console_error,
    );

    // ── Deviation and eventual BG ────────────────────────────────────────────
    let bgi = round_dec(-iob_now.activity * sens * 5.0, 2);
    let mut deviation = round_dec(6.0 * (min_delta - bgi), 0);
    if deviation < 0.0 {
        deviation = round_dec(6.0 * (min_avg_delta - bgi), 0);
        if deviation < 0.0 {
            deviation = round_dec(6.0 * (glucose.long_avg_delta - bgi), 0);
        }
    }
    let naive_eventual_bg = if options.auto_isf_mode || iob_now.iob > 0.0 {
        round_dec(bg - iob_now.iob * sens, 1)
    } else {
        round_dec(bg - iob_now.iob * sens.min(profile.sens), 1)
    };
    let eventual_bg = naive_eventual_bg + deviation;

    let (adjusted, notes) = adjust_for_high_bg(
        band,
        bg,
        eventual_bg,
        naive_eventual_bg,
        profile.adv_target_adjustments,
        profile.temptarget_set,
    );
    band = adjusted;
    d.console_error.extend(notes);
    let min_bg = band.min_bg;
    let max_bg = band.max_bg;
    let target_bg = band.target_bg;

    let expected = expected_delta(target_bg, eventual_bg, bgi);
    let threshold = low_threshold(min_bg);

    d.bg = Some(bg);
    d.tick = Some(tick.clone());
    d.eventual_bg = Some(eventual_bg);
    d.target_bg = Some(target_bg);
    d.insulin_req = Some(0.0);
    d.deliver_at = Some(now_ms);
    d.sensitivity_ratio = Some(sensitivity_ratio);
    d.variable_sens = Some(profile.variable_sens);

    // ── Predictions and guards ───────────────────────────────────────────────
    let set = generate(&CurveInputs {
        bg,
        iob,
        meal,
        sens,
        carb_ratio: profile.carb_ratio,
        sensitivity_ratio,
        min_delta,
        bgi,
        now_ms,
        enable_uam: profile.enable_uam,
        remaining_carbs_cap: profile.remaining_carbs_cap,
    })?;
    d.console_error.extend(set.notes.iter().cloned());
    let surfaced = finalize(&set, meal.meal_cob, target_bg, profile.enable_uam, eventual_bg);
    let eventual_bg = surfaced.eventual_bg;
    d.eventual_bg = Some(eventual_bg);
    d.predictions = Some(surfaced.predictions.clone());
    d.console_error.push(format!("EventualBG is {eventual_bg} ;"));

    let guard = blend(&GuardInputs {
        minima: set.minima,
        last_iob: surfaced.last_iob,
        last_cob: surfaced.last_cob,
        last_uam: surfaced.last_uam,
        carbs: meal.carbs,
        meal_cob: meal.meal_cob,
        enable_uam: profile.enable_uam,
        absorbing: set.carbs.absorbing(),
        threshold,
        target_bg,
    });
    let min_guard_bg = guard.min_guard_bg;
    let min_pred_bg = guard.min_pred_bg;
    let show = |v: Option<f64>| v.map_or_else(|| "none".to_string(), |x| x.to_string());
    d.console_error.push(format!(
        "minPredBG: {min_pred_bg} minIOBPredBG: {} minZTGuardBG: {}",
        show(guard.min_iob_pred_bg),
        set.minima.min_zt_guard
    ));
    if let Some(v) = guard.min_cob_pred_bg {
        d.console_error.push(format!(" minCOBPredBG: {v}"));
    }
    if let Some(v) = guard.min_uam_pred_bg {
        d.console_error.push(format!(" minUAMPredBG: {v}"));
    }
    d.console_error.push(format!(
        " avgPredBG: {} COB: {} / {}",
        guard.avg_pred_bg, meal.meal_cob, meal.carbs
    ));

    d.cob = Some(meal.meal_cob);
    d.iob = Some(iob_now.iob);
    d.reason.push_str(&format!(
        "COB: {}, Dev: {}, BGI: {}, ISF: {}, CR: {}, Target: {}, minPredBG {}, minGuardBG {}, IOBpredBG {}",
        fmt.without_zeros(round_dec(meal.meal_cob, 1)),
        fmt.bg(deviation),
        fmt.bg(bgi),
        fmt.bg(sens),
        fmt.without_zeros(round_dec(profile.carb_ratio, 2)),
        fmt.bg(target_bg),
        fmt.bg(min_pred_bg),
        fmt.bg(min_guard_bg),
        fmt.bg(surfaced.last_iob),
    ));
    if let Some(v) = surfaced.last_cob {
        d.reason.push_str(&format!(", COBpredBG {}", fmt.bg(v)));
    }
    if let Some(v) = surfaced.last_uam {
        d.reason.push_str(&format!(", UAMpredBG {}", fmt.bg(v)));
    }
    d.reason.push_str("; ");

    // ── Carbs required ───────────────────────────────────────────────────────
    let mut carbs_req_bg = naive_eventual_bg;
    if carbs_req_bg < BG_FLOOR {
        carbs_req_bg = min_guard_bg.min(carbs_req_bg);
    }
    let bg_undershoot = threshold - carbs_req_bg;
    let horizon_curve = surfaced.cob.as_deref().unwrap_or(&surfaced.iob);
    let minutes_above_min_bg = minutes_above(horizon_curve, min_bg);
    let minutes_above_threshold = minutes_above(horizon_curve, threshold);

    if enable_smb && min_guard_bg < threshold {
        d.console_error.push(format!(
            "minGuardBG {} projected below {} - disabling SMB",
            fmt.bg(min_guard_bg),
            fmt.bg(threshold)
        ));
        enable_smb = false;
    }
    let max_delta_pct = max_delta_fraction(options.loop_wanted_smb);
    if max_delta > max_delta_pct * bg {
        let msg = format!(
            "maxDelta {} > {}% of BG {}",
            fmt.bg(max_delta),
            100.0 * max_delta_pct,
            fmt.bg(bg)
        );
        d.console_error.push(format!("{msg} - disabling SMB"));
        d.reason.push_str(&format!("{msg}: SMB disabled; "));
        enable_smb = false;
    }

    d.console_error.push(format!(
        "BG projected to remain above {} for {minutes_above_min_bg} minutes",
        fmt.bg(min_bg)
    ));
    if minutes_above_threshold < HORIZON_MIN || minutes_above_min_bg < 60 {
        d.console_error.push(format!(
            "BG projected to remain above {} for {minutes_above_threshold} minutes",
            fmt.bg(threshold)
        ));
    }

    let zero_temp_effect =
        profile.current_basal * sens * f64::from(minutes_above_threshold) / 60.0;
    let cob_for_carbs_req = (meal.meal_cob - 0.25 * meal.carbs).max(0.0);
    let carbs_req_g =
        (safe_div(bg_undershoot - zero_temp_effect, set.carbs.csf) - cob_for_carbs_req).round();
    #[allow(clippy::cast_possible_truncation)]
    let carbs_req = carbs_req_g as i64;
    d.console_error.push(format!(
        "naive_eventualBG: {naive_eventual_bg} bgUndershoot: {bg_undershoot} zeroTempDuration {minutes_above_threshold} zeroTempEffect: {} carbsReq: {carbs_req}",
        zero_temp_effect.round()
    ));
    if carbs_req_g >= profile.remaining_carbs_cap && minutes_above_threshold <= 45 {
        d.carbs_req = Some(carbs_req);
        d.carbs_req_within = Some(minutes_above_threshold);
        d.reason.push_str(&format!(
            "{carbs_req} add'l carbs req w/in {minutes_above_threshold}m; "
        ));
    }

    // ── Deep low ─────────────────────────────────────────────────────────────
    let low_iob_bound = -profile.current_basal * 20.0 / 60.0;
    if bg < threshold && iob_now.iob < low_iob_bound && min_delta > 0.0 && min_delta > expected {
        d.reason.push_str(&format!(
            "IOB {} < {} and minDelta {} > expectedDelta {}; ",
            iob_now.iob,
            round_dec(low_iob_bound, 2),
            fmt.bg(min_delta),
            fmt.bg(expected)
        ));
    } else if bg < threshold || min_guard_bg < threshold {
        d.reason.push_str(&format!(
            "minGuardBG {} < {}",
            fmt.bg(min_guard_bg),
            fmt.bg(threshold)
        ));
        let worst_case = safe_div(target_bg - min_guard_bg, sens);
        let duration = round_to_30(safe_div(60.0 * worst_case, profile.current_basal), 30, 120);
        tracing::debug!(branch = "deep_low", bg, min_guard_bg, threshold, duration, "zero temp");
        return set_temp_basal(d, 0.0, duration, profile, current, fmt).ensure_finite();
    }

    let minute = minute_of_hour(now_ms);
    if profile.skip_neutral_temps && minute >= SKIP_NEUTRAL_MINUTE {
        d.reason
            .push_str(&format!("; Canceling temp at {minute}m past the hour. "));
        tracing::debug!(branch = "skip_neutral", minute, "cancel temp");
        return set_temp_basal(d, 0.0, 0, profile, current, fmt).ensure_finite();
    }

    // ── Eventual BG below range ──────────────────────────────────────────────
    if eventual_bg < min_bg {
        d.reason.push_str(&format!(
            "Eventual BG {} < {}",
            fmt.bg(eventual_bg),
            fmt.bg(min_bg)
        ));
        if min_delta > expected && min_delta > 0.0 && carbs_req == 0 {
            if naive_eventual_bg < BG_FLOOR {
                d.reason.push_str(", naive_eventualBG < 2.2. ");
                tracing::debug!(branch = "low_naive_eventual", "zero temp");
                return set_temp_basal(d, 0.0, 30, profile, current, fmt).ensure_finite();
            }
            if delta > min_delta {
                d.reason.push_str(&format!(
                    ", but Delta {tick} > expectedDelta {}",
                    fmt.bg(expected)
                ));
            } else {
                d.reason.push_str(&format!(
                    ", but Min. Delta {} > Exp. Delta {}",
                    fmt.fixed2(min_delta),
                    fmt.bg(expected)
                ));
            }
            tracing::debug!(branch = "low_but_rising", basal, "hold basal");
            return hold_basal(d, basal, profile, current, fmt).ensure_finite();
        }

        let mut insulin_req = round_dec(2.0 * safe_div(eventual_bg - target_bg, sens).min(0.0), 2);
        let naive_insulin_req = round_dec(safe_div(naive_eventual_bg - target_bg, sens).min(0.0), 2);
        if min_delta < 0.0 && min_delta > expected {
            insulin_req = round_dec(insulin_req * safe_div(min_delta, expected), 2);
        }
        d.insulin_req = Some(insulin_req);
        let rate = basal + 2.0 * insulin_req;

        let insulin_scheduled = f64::from(current.duration) * (current.rate - basal) / 60.0;
        let min_insulin_req = insulin_req.min(naive_insulin_req);
        if insulin_scheduled < min_insulin_req - basal * 0.3 {
            d.reason.push_str(&format!(
                ", {}m@{} is a lot less than needed. ",
                current.duration,
                fmt.fixed2(current.rate)
            ));
            tracing::debug!(branch = "low_reduce", rate, "running temp too high");
            return set_temp_basal(d, rate, 30, profile, current, fmt).ensure_finite();
        }
        if current.duration > 5 && rate >= current.rate * 0.8 {
            d.reason.push_str(&format!(
                ", temp {} ~< req {}U/hr. ",
                current.rate,
                round_dec(rate, 2)
            ));
            tracing::debug!(branch = "low_keep", rate, "running temp low enough");
            return d.ensure_finite();
        }
        if rate <= 0.0 {
            let worst_case = safe_div(target_bg - naive_eventual_bg, sens);
            let raw = safe_div(60.0 * worst_case, profile.current_basal).round();
            let duration = if raw < 0.0 { 0 } else { round_to_30(raw, 0, 120) };
            if duration > 0 {
                d.reason
                    .push_str(&format!(", setting {duration}m zero temp. "));
                tracing::debug!(branch = "low_zero", duration, "zero temp");
                return set_temp_basal(d, rate, duration, profile, current, fmt).ensure_finite();
            }
        } else {
            d.reason
                .push_str(&format!(", setting {}U/hr. ", round_dec(rate, 2)));
        }
        tracing::debug!(branch = "low_reduce", rate, "reduced temp");
        return set_temp_basal(d, rate, 30, profile, current, fmt).ensure_finite();
    }

    let smb_active = options.microbolus_allowed && enable_smb;

    // ── Not rising as expected / in range ────────────────────────────────────
    if min_delta < expected && !smb_active {
        if delta < min_delta {
            d.reason.push_str(&format!(
                "Eventual BG {} > {} but Delta {tick} < Exp. Delta {}",
                fmt.bg(eventual_bg),
                fmt.bg(min_bg),
                fmt.bg(expected)
            ));
        } else {
            d.reason.push_str(&format!(
                "Eventual BG {} > {} but Min. Delta {} < Exp. Delta {}",
                fmt.bg(eventual_bg),
                fmt.bg(min_bg),
                fmt.fixed2(min_delta),
                fmt.bg(expected)
            ));
        }
        tracing::debug!(branch = "slower_than_expected", min_delta, expected, "hold basal");
        return hold_basal(d, basal, profile, current, fmt).ensure_finite();
    }

    if eventual_bg.min(min_pred_bg) < max_bg && !smb_active {
        d.reason.push_str(&format!(
            "{}-{} in range: no temp required",
            fmt.bg(eventual_bg),
            fmt.bg(min_pred_bg)
        ));
        tracing::debug!(branch = "in_range", eventual_bg, min_pred_bg, "hold basal");
        return hold_basal(d, basal, profile, current, fmt).ensure_finite();
    }

    // ── Above range ──────────────────────────────────────────────────────────
    if eventual_bg >= max_bg {
        d.reason.push_str(&format!(
            "Eventual BG {} >= {}, ",
            fmt.bg(eventual_bg),
            fmt.bg(max_bg)
        ));
    }
    if iob_now.iob > profile.max_iob {
        d.reason.push_str(&format!(
            "IOB {} > max_iob {}",
            round_dec(iob_now.iob, 2),
            profile.max_iob
        ));
        tracing::debug!(branch = "max_iob", iob = iob_now.iob, "hold basal");
        return hold_basal(d, basal, profile, current, fmt).ensure_finite();
    }

    let mut insulin_req = round_dec(safe_div(min_pred_bg.min(eventual_bg) - target_bg, sens), 2);
    if insulin_req > profile.max_iob - iob_now.iob {
        d.reason.push_str(&format!("max_iob {}, ", profile.max_iob));
        insulin_req = profile.max_iob - iob_now.iob;
    }
    let rate = basal + 2.0 * insulin_req;
    let insulin_req = round_dec(insulin_req, 3);
    d.insulin_req = Some(insulin_req);

    if smb_active && bg > threshold {
        let smb_ratio = options
            .smb_ratio
            .unwrap_or_else(|| delivery_ratio(profile, bg, target_bg));
        let (units, _max_bolus) = microbolus(
            &SmbSizing {
                insulin_req,
                iob: iob_now.iob,
                meal_cob: meal.meal_cob,
                carb_ratio: profile.carb_ratio,
                current_basal: profile.current_basal,
                max_smb_basal_minutes: profile.max_smb_basal_minutes,
                max_uam_smb_basal_minutes: profile.max_uam_smb_basal_minutes,
                range_extension: options.smb_max_range_extension,
                bolus_increment: profile.bolus_increment,
                auto_isf_mode: options.auto_isf_mode,
                smb_ratio,
                mode: options.loop_wanted_smb,
                iob_th_virtual,
            },
            &mut d.console_error,
        );
        // the zero-temp guard stands in when the IOB minimum never settled
        let min_iob_pred = guard
            .min_iob_pred_bg
            .unwrap_or(set.minima.min_iob_guard);
        let worst_case = safe_div(target_bg - (naive_eventual_bg + min_iob_pred) / 2.0, sens);
        let duration = round_to_30(safe_div(60.0 * worst_case, profile.current_basal), 0, 120);
        let covering = clamp_rate(basal, profile);
        d.smb_units = Some(units);
        d.set_temp(covering, duration);
        d.reason.push_str(&format!(
            " SMB: {units}U, setting temp {covering}U/hr for {duration}m"
        ));
        tracing::debug!(branch = "smb", units, covering, duration, "microbolus");
        return d.ensure_finite();
    }

    d.reason
        .push_str(&format!("; setting temp basal of {}U/hr. ", round_dec(rate, 2)));
    tracing::debug!(branch = "high_temp", rate, insulin_req, "computed temp");
    set_temp_basal(d, rate, 30, profile, current, fmt).ensure_finite()
}
