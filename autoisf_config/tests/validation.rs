use autoisf_config::{GlucoseUnits, SmbModeCfg, load_toml};
use rstest::rstest;

const FULL: &str = r#"
[profile]
units = "mgdl"
min_bg = 90
max_bg = 126
sens = 108
carb_ratio = 10
current_basal = 1.0
max_basal = 3.0
max_daily_basal = 1.2
max_iob = 4.0
autosens_max = 1.2
enable_uam = true
enable_smb_with_cob = true

[loop]
microbolus_allowed = true
auto_isf_mode = true
loop_wanted_smb = "enforced"
smb_ratio = 0.5
iob_threshold_percent = 80

[replay]
max_eventual_mae = 0.3
min_rate_match_pct = 90

[logging]
file = "autoisf.log"
rotation = "daily"
"#;

#[test]
fn accepts_full_config() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.profile.units, GlucoseUnits::Mgdl);
    assert_eq!(cfg.loop_opts.loop_wanted_smb, SmbModeCfg::Enforced);
    assert_eq!(cfg.loop_opts.iob_threshold_percent, 80);
    assert_eq!(cfg.replay.min_rate_match_pct, Some(90.0));
    // untouched keys keep their defaults
    assert_eq!(cfg.profile.half_basal_exercise_target, 160);
    assert!((cfg.replay.rate_tolerance - 0.05).abs() < 1e-12);
}

#[rstest]
#[case("[profile]\nmin_bg = 0.0\n", "profile.min_bg must be > 0")]
#[case("[profile]\nmin_bg = 6.0\nmax_bg = 5.0\n", "profile.max_bg must be >= profile.min_bg")]
#[case("[profile]\ntarget_bg = 9.0\n", "profile.target_bg must lie within")]
#[case("[profile]\nsens = 0.0\n", "profile.sens must be > 0")]
#[case("[profile]\ncarb_ratio = -1.0\n", "profile.carb_ratio must be > 0")]
#[case("[profile]\ncurrent_basal = -0.1\n", "profile.current_basal must be >= 0")]
#[case("[profile]\nmax_basal = 0.0\n", "profile.max_basal must be > 0")]
#[case("[profile]\nautosens_max = 0.5\n", "profile.autosens_max must be in")]
#[case("[profile]\nhalf_basal_exercise_target = 90\n", "half_basal_exercise_target must be > 100")]
#[case("[profile]\nbolus_increment = 0.0\n", "profile.bolus_increment must be in")]
#[case("[profile]\nsmb_delivery_ratio_max = 1.5\n", "profile.smb_delivery_ratio_max must be in")]
#[case("[profile]\ndia_hours = 0.0\n", "profile.dia_hours must be in")]
#[case("[loop]\nprofile_percentage = 0\n", "loop.profile_percentage must be in")]
#[case("[loop]\niob_threshold_percent = 0\n", "loop.iob_threshold_percent must be in")]
#[case("[loop]\nsmb_ratio = 2.0\n", "loop.smb_ratio must be in")]
#[case("[replay]\nmin_rate_match_pct = 120.0\n", "replay.min_rate_match_pct must be in")]
#[case("[autosens]\nmin_points = 0\n", "autosens.min_points must be >= 1")]
#[case("[autosens]\nclip_min = 1.1\n", "autosens clip range")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}");
}

#[test]
fn unknown_smb_mode_is_a_parse_error() {
    let err = load_toml("[loop]\nloop_wanted_smb = \"sometimes\"\n").expect_err("parse error");
    assert!(format!("{err}").contains("sometimes"));
}
