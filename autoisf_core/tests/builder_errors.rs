use autoisf_core::error::BuildError;
use autoisf_core::{DecisionInputs, GlucoseStatus, IobEntry, Profile};
use rstest::rstest;

fn glucose() -> GlucoseStatus {
    GlucoseStatus {
        glucose: 6.0,
        delta: 0.0,
        short_avg_delta: 0.0,
        long_avg_delta: 0.0,
        date: 0,
        noise: 0.0,
    }
}

#[rstest]
fn missing_glucose_yields_typed_build_error() {
    let err = DecisionInputs::builder()
        .with_profile(Profile::default())
        .with_iob(vec![IobEntry::default()])
        .try_build()
        .expect_err("should fail with MissingGlucose");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingGlucose) => {}
        other => panic!("expected MissingGlucose, got: {other:?}"),
    }
}

#[rstest]
fn missing_profile_yields_typed_build_error() {
    let err = DecisionInputs::builder()
        .with_glucose(glucose())
        .with_iob(vec![IobEntry::default()])
        .try_build()
        .expect_err("should fail with MissingProfile");
    assert_eq!(
        err.downcast_ref::<BuildError>(),
        Some(&BuildError::MissingProfile)
    );
}

#[rstest]
fn missing_iob_yields_typed_build_error() {
    let err = DecisionInputs::builder()
        .with_glucose(glucose())
        .with_profile(Profile::default())
        .try_build()
        .expect_err("should fail with MissingIob");
    assert_eq!(
        err.downcast_ref::<BuildError>(),
        Some(&BuildError::MissingIob)
    );
}

#[rstest]
fn empty_iob_is_rejected_even_when_all_parts_are_set() {
    let err = DecisionInputs::builder()
        .with_glucose(glucose())
        .with_profile(Profile::default())
        .with_iob(Vec::new())
        .at_time_ms(0)
        .build()
        .expect_err("should fail with EmptyIob");
    assert_eq!(
        err.downcast_ref::<BuildError>(),
        Some(&BuildError::EmptyIob)
    );
}

#[rstest]
#[case(Profile { max_bg: 4.0, min_bg: 5.0, ..Profile::default() }, "max_bg")]
#[case(Profile { sens: f64::INFINITY, ..Profile::default() }, "finite")]
fn invalid_profile_is_rejected(#[case] profile: Profile, #[case] needle: &str) {
    let err = DecisionInputs::builder()
        .with_glucose(glucose())
        .with_profile(profile)
        .with_iob(vec![IobEntry::default()])
        .at_time_ms(0)
        .build()
        .expect_err("should fail with InvalidInput");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidInput(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidInput, got: {other:?}"),
    }
}

#[rstest]
fn non_finite_iob_is_rejected() {
    let err = DecisionInputs::builder()
        .with_glucose(glucose())
        .with_profile(Profile::default())
        .with_iob(vec![IobEntry::new(f64::NAN, 0.0)])
        .at_time_ms(0)
        .build()
        .expect_err("should fail");
    assert!(err.to_string().contains("IOB timeline"));
}
