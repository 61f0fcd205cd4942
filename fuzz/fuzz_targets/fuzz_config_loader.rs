#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<autoisf_config::Config>(data) {
        if cfg.validate().is_ok() {
            // a validated profile must convert and bound its own rates
            let profile = autoisf_core::Profile::from(&cfg.profile);
            let ceiling = autoisf_core::max_safe_basal(&profile);
            let clamped = autoisf_core::clamp_rate(f64::MAX, &profile);
            assert!(clamped <= ceiling.max(0.0));
        }
    }
});
