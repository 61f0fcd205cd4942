//! IOB timeline from raw insulin events.
//!
//! Temp basals count as their net delivery against the scheduled basal,
//! split into 5-minute micro-doses. The zero-temp variant drops temp
//! delivery from `now` on and assumes nothing is delivered instead.

use crate::curves::{insulin_activity, iob_curve};
use crate::types::IobEntry;

/// Step between timeline entries and micro-dose size.
const STEP_MS: i64 = 5 * 60_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsulinEvent {
    Bolus { at_ms: i64, units: f64 },
    /// `rate` in U/h.
    TempBasal {
        at_ms: i64,
        rate: f64,
        duration_min: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Dose {
    at_ms: i64,
    units: f64,
}

/// Net micro-doses of a temp basal; the last chunk may be shorter.
#[allow(clippy::cast_possible_truncation)]
fn temp_chunks(at_ms: i64, rate: f64, duration_min: f64, scheduled: f64) -> Vec<Dose> {
    if !(duration_min.is_finite() && duration_min > 0.0 && rate.is_finite()) {
        return Vec::new();
    }
    let total_ms = (duration_min * 60_000.0).round() as i64;
    let mut out = Vec::with_capacity(usize::try_from(total_ms / STEP_MS + 1).unwrap_or(0));
    let mut offset = 0;
    while offset < total_ms {
        let len_ms = STEP_MS.min(total_ms - offset);
        #[allow(clippy::cast_precision_loss)]
        let hours = len_ms as f64 / 3_600_000.0;
        out.push(Dose {
            at_ms: at_ms + offset,
            units: (rate - scheduled) * hours,
        });
        offset += STEP_MS;
    }
    out
}

fn doses(
    events: &[InsulinEvent],
    scheduled_basal: f64,
    zero_temp_from: Option<(i64, i64)>,
) -> Vec<Dose> {
    let mut out = Vec::new();
    for ev in events {
        match *ev {
            InsulinEvent::Bolus { at_ms, units } => {
                if units.is_finite() {
                    out.push(Dose { at_ms, units });
                }
            }
            InsulinEvent::TempBasal {
                at_ms,
                rate,
                duration_min,
            } => {
                let chunks = temp_chunks(at_ms, rate, duration_min, scheduled_basal);
                match zero_temp_from {
                    Some((from, _)) => out.extend(chunks.into_iter().filter(|c| c.at_ms < from)),
                    None => out.extend(chunks),
                }
            }
        }
    }
    if let Some((from, until)) = zero_temp_from {
        let mut at_ms = from;
        while at_ms < until {
            out.push(Dose {
                at_ms,
                units: -scheduled_basal * 5.0 / 60.0,
            });
            at_ms += STEP_MS;
        }
    }
    out
}

fn totals(doses: &[Dose], t_ms: i64, dia_hours: f64) -> (f64, f64) {
    doses.iter().fold((0.0, 0.0), |(iob, act), d| {
        #[allow(clippy::cast_precision_loss)]
        let minutes = (t_ms - d.at_ms) as f64 / 60_000.0;
        (
            iob + d.units * iob_curve(minutes, dia_hours),
            act + d.units * insulin_activity(minutes, dia_hours),
        )
    })
}

/// IOB and activity at `steps` 5-minute offsets from `now_ms`, each with its
/// zero-temp counterpart. `steps == 0` gives an empty timeline.
pub fn iob_timeline(
    events: &[InsulinEvent],
    now_ms: i64,
    dia_hours: f64,
    scheduled_basal: f64,
    steps: usize,
) -> Vec<IobEntry> {
    let horizon_ms = now_ms + i64::try_from(steps).unwrap_or(i64::MAX / STEP_MS) * STEP_MS;
    let actual = doses(events, scheduled_basal, None);
    let zero_temp = doses(events, scheduled_basal, Some((now_ms, horizon_ms)));

    (0..steps)
        .map(|k| {
            let t_ms = now_ms + i64::try_from(k).unwrap_or(0) * STEP_MS;
            let (iob, activity) = totals(&actual, t_ms, dia_hours);
            let (zt_iob, zt_activity) = totals(&zero_temp, t_ms, dia_hours);
            IobEntry::new(iob, activity).with_zero_temp(IobEntry::new(zt_iob, zt_activity))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 10 * 3_600_000;

    #[test]
    fn fresh_bolus_is_fully_on_board() {
        let events = [InsulinEvent::Bolus {
            at_ms: NOW,
            units: 2.0,
        }];
        let tl = iob_timeline(&events, NOW, 5.0, 0.0, 48);
        assert_eq!(tl.len(), 48);
        assert!((tl[0].iob - 2.0).abs() < 1e-12);
        assert!(tl[0].activity.abs() < 1e-12);
        // decays monotonically and activity is positive once absorbing
        assert!(tl.windows(2).all(|w| w[1].iob <= w[0].iob));
        assert!(tl[6].activity > 0.0);
    }

    #[test]
    fn temp_basal_counts_net_of_schedule() {
        let events = [InsulinEvent::TempBasal {
            at_ms: NOW - 30 * 60_000,
            rate: 1.0,
            duration_min: 30.0,
        }];
        // running exactly the scheduled rate adds nothing
        let tl = iob_timeline(&events, NOW, 5.0, 1.0, 3);
        assert!(tl[0].iob.abs() < 1e-12);

        // a zero temp against 1 U/h scheduled is negative IOB
        let events = [InsulinEvent::TempBasal {
            at_ms: NOW - 30 * 60_000,
            rate: 0.0,
            duration_min: 30.0,
        }];
        let tl = iob_timeline(&events, NOW, 5.0, 1.0, 3);
        assert!(tl[0].iob < 0.0);
        assert!(tl[0].iob > -0.5);
    }

    #[test]
    fn zero_temp_variant_never_exceeds_actual_for_boluses() {
        let events = [
            InsulinEvent::Bolus {
                at_ms: NOW - 60 * 60_000,
                units: 1.0,
            },
            InsulinEvent::Bolus {
                at_ms: NOW,
                units: 0.5,
            },
        ];
        let tl = iob_timeline(&events, NOW, 5.0, 0.8, 48);
        for e in &tl {
            let zt = e.iob_with_zero_temp.as_ref().expect("zero temp");
            assert!(zt.iob <= e.iob + 1e-12);
        }
    }

    #[test]
    fn no_steps_no_entries() {
        assert!(iob_timeline(&[], NOW, 5.0, 1.0, 0).is_empty());
    }

    #[test]
    fn chunks_cover_the_whole_duration() {
        let chunks = temp_chunks(0, 2.0, 32.0, 0.5);
        assert_eq!(chunks.len(), 7);
        let total: f64 = chunks.iter().map(|c| c.units).sum();
        assert!((total - 1.5 * 32.0 / 60.0).abs() < 1e-12);
    }
}
