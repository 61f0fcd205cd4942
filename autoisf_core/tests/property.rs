use autoisf_core::sensitivity::resolve;
use autoisf_core::{
    AutosensResult, CurrentTemp, Decision, DecisionInputs, GlucoseStatus, IobEntry, LoopOptions,
    MealData, Profile, TempAction, clamp_rate, max_safe_basal,
};
use proptest::prelude::*;

const NOW: i64 = 1_700_000_000_000 - 1_700_000_000_000 % 3_600_000;

#[derive(Debug, Clone)]
struct Cycle {
    glucose: GlucoseStatus,
    profile: Profile,
    iob: Vec<IobEntry>,
    current: CurrentTemp,
    meal: MealData,
    autosens: f64,
    microbolus_allowed: bool,
}

prop_compose! {
    fn profile_strategy()(
        min_bg in 4.0f64..7.0,
        span in 0.0f64..3.0,
        sens in 0.5f64..8.0,
        carb_ratio in 3.0f64..25.0,
        basal in 0.0f64..3.0,
        max_basal in 0.5f64..6.0,
        max_iob in 0.0f64..8.0,
        smb_always in any::<bool>(),
        enable_uam in any::<bool>(),
    ) -> Profile {
        Profile {
            min_bg,
            max_bg: min_bg + span,
            target_bg: min_bg + span / 2.0,
            sens,
            variable_sens: sens,
            carb_ratio,
            current_basal: basal,
            max_basal,
            max_daily_basal: basal.max(0.5),
            max_iob,
            enable_smb_always: smb_always,
            enable_uam,
            ..Profile::default()
        }
    }
}

prop_compose! {
    fn cycle_strategy()(
        bg in 1.0f64..25.0,
        delta in -1.0f64..1.0,
        short in -1.0f64..1.0,
        long in -1.0f64..1.0,
        profile in profile_strategy(),
        iob in -1.0f64..6.0,
        activity in -0.01f64..0.05,
        temp_rate in 0.0f64..4.0,
        temp_duration in 0u32..120,
        cob in 0.0f64..80.0,
        extra_carbs in 0.0f64..40.0,
        carb_age_min in 0i64..240,
        autosens in 0.7f64..1.3,
        microbolus_allowed in any::<bool>(),
    ) -> Cycle {
        let iob = (0..48)
            .map(|k| {
                let decay = 1.0 - f64::from(k) / 48.0;
                IobEntry::new(iob * decay, activity * decay)
            })
            .collect();
        Cycle {
            glucose: GlucoseStatus {
                glucose: bg,
                delta,
                short_avg_delta: short,
                long_avg_delta: long,
                date: NOW,
                noise: 0.0,
            },
            profile,
            iob,
            current: CurrentTemp { duration: temp_duration, rate: temp_rate, minutes_running: 0 },
            meal: MealData {
                carbs: cob + extra_carbs,
                meal_cob: cob,
                last_carb_time: NOW - carb_age_min * 60_000,
                ..MealData::default()
            },
            autosens,
            microbolus_allowed,
        }
    }
}

fn run(c: &Cycle) -> Decision {
    DecisionInputs::builder()
        .with_glucose(c.glucose)
        .with_profile(c.profile.clone())
        .with_iob(c.iob.clone())
        .with_current_temp(c.current)
        .with_meal(c.meal)
        .with_autosens(AutosensResult::with_ratio(c.autosens))
        .with_options(LoopOptions {
            microbolus_allowed: c.microbolus_allowed,
            ..LoopOptions::default()
        })
        .at_time_ms(NOW)
        .build()
        .expect("inputs")
        .decide()
        .expect("decision")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn emitted_rate_stays_within_safe_max(c in cycle_strategy()) {
        let d = run(&c);
        if let Some(rate) = d.rate {
            let ceiling = max_safe_basal(&c.profile).max(0.0);
            prop_assert!(rate >= 0.0, "rate {rate}");
            prop_assert!(rate <= ceiling + 1e-12, "rate {rate} > {ceiling}");
        }
        if let Some(units) = d.smb_units {
            prop_assert!(units >= 0.0);
        }
        prop_assert!(d.insulin_req.is_none_or(f64::is_finite));
        prop_assert!(!d.reason.is_empty());
    }

    #[test]
    fn predictions_stay_within_surfaced_range(c in cycle_strategy()) {
        let d = run(&c);
        if let Some(p) = d.predictions {
            for v in p.values() {
                prop_assert!((40..=401).contains(&v), "prediction {v}");
            }
        }
    }

    #[test]
    fn higher_bg_never_lowers_eventual(c in cycle_strategy(), bump in 0.0f64..5.0) {
        prop_assume!(c.glucose.glucose > 1.0);
        let lo = run(&c);
        let mut hi_cycle = c.clone();
        hi_cycle.glucose.glucose += bump;
        let hi = run(&hi_cycle);
        if let (Some(a), Some(b)) = (lo.eventual_bg, hi.eventual_bg) {
            prop_assert!(b >= a, "eventual {a} -> {b} after +{bump}");
        }
    }

    #[test]
    fn deep_low_always_zero_temps(c in cycle_strategy()) {
        let threshold = c.profile.min_bg - 0.5 * (c.profile.min_bg - 2.2);
        let mut c = c;
        // below the low threshold with no negative IOB to excuse it
        c.glucose.glucose = 1.0 + (c.glucose.glucose / 25.0) * (threshold - 1.1);
        for e in &mut c.iob {
            e.iob = e.iob.abs();
        }
        let d = run(&c);
        match d.action() {
            TempAction::Set { rate, duration } => {
                prop_assert!(rate.abs() < 1e-12, "rate {rate}");
                prop_assert!(duration % 30 == 0 && (30..=120).contains(&duration), "duration {duration}");
            }
            // the running temp already matches the zero request
            TempAction::Keep => prop_assert!(c.current.rate == 0.0 && c.current.duration > 0),
            TempAction::Cancel => prop_assert!(false, "deep low must not cancel"),
        }
    }

    #[test]
    fn sensitivity_resolution_is_pure(p in profile_strategy(), ratio in 0.5f64..2.0, tt in any::<bool>(), auto in any::<bool>()) {
        let a = AutosensResult::with_ratio(ratio);
        prop_assert_eq!(resolve(&p, &a, tt, auto), resolve(&p, &a, tt, auto));
    }

    #[test]
    fn clamping_a_clamped_rate_is_a_no_op(p in profile_strategy(), rate in -5.0f64..10.0) {
        let once = clamp_rate(rate, &p);
        prop_assert_eq!(clamp_rate(once, &p), once);
    }
}
