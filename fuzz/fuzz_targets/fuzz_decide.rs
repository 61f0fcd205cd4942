#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

use autoisf_core::{
    CurrentTemp, DecisionInputs, GlucoseStatus, IobEntry, LoopOptions, MealData, Profile,
    max_safe_basal,
};

#[derive(Debug, Arbitrary)]
struct Cycle {
    glucose: u16,
    delta: i16,
    short_avg_delta: i16,
    long_avg_delta: i16,
    iob: i16,
    activity: i16,
    temp_rate: u16,
    temp_duration: u8,
    cob: u8,
    sens: u8,
    max_basal: u8,
    smb: bool,
    enable_smb_always: bool,
}

// now at the top of an hour
const NOW: i64 = 1_700_042_400_000 - 1_700_042_400_000 % 3_600_000;

fuzz_target!(|c: Cycle| {
    let profile = Profile {
        sens: 0.5 + f64::from(c.sens) / 16.0,
        variable_sens: 0.5 + f64::from(c.sens) / 16.0,
        max_basal: 0.1 + f64::from(c.max_basal) / 32.0,
        enable_smb_always: c.enable_smb_always,
        ..Profile::default()
    };
    let Ok(inputs) = DecisionInputs::builder()
        .with_glucose(GlucoseStatus {
            glucose: f64::from(c.glucose) / 1000.0,
            delta: f64::from(c.delta) / 1000.0,
            short_avg_delta: f64::from(c.short_avg_delta) / 1000.0,
            long_avg_delta: f64::from(c.long_avg_delta) / 1000.0,
            date: NOW,
            noise: 0.0,
        })
        .with_iob(vec![
            IobEntry::new(f64::from(c.iob) / 1000.0, f64::from(c.activity) / 100_000.0);
            48
        ])
        .with_current_temp(CurrentTemp {
            duration: u32::from(c.temp_duration),
            rate: f64::from(c.temp_rate) / 1000.0,
            minutes_running: 0,
        })
        .with_meal(MealData {
            carbs: f64::from(c.cob),
            meal_cob: f64::from(c.cob),
            last_carb_time: NOW - 30 * 60_000,
            ..MealData::default()
        })
        .with_options(LoopOptions {
            microbolus_allowed: c.smb,
            ..LoopOptions::default()
        })
        .with_profile(profile.clone())
        .at_time_ms(NOW)
        .build()
    else {
        return;
    };
    let Ok(d) = inputs.decide() else {
        return;
    };
    if let Some(rate) = d.rate {
        assert!(rate >= 0.0 && rate <= max_safe_basal(&profile).max(0.0) + 1e-12);
    }
    if let Some(units) = d.smb_units {
        assert!(units >= 0.0);
    }
});
