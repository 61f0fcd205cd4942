//! Type-state builder for `DecisionInputs`.
//!
//! The builder enforces at compile time that glucose, profile and the IOB
//! timeline are provided before `build()` is available. `try_build()` is
//! always available for dynamic checks.

use std::marker::PhantomData;

use autoisf_traits::clock::{Clock, SystemClock};

use crate::config::{LoopOptions, Profile};
use crate::decision::Decision;
use crate::engine::determine_basal;
use crate::error::{BuildError, Result};
use crate::types::{AutosensResult, CurrentTemp, GlucoseStatus, IobEntry, MealData};

// ── Inputs ───────────────────────────────────────────────────────────────────

/// Everything one dosing cycle reads. Built fresh per cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionInputs {
    pub glucose: GlucoseStatus,
    pub current_temp: CurrentTemp,
    /// Non-empty; index 0 is now.
    pub iob: Vec<IobEntry>,
    pub profile: Profile,
    pub autosens: AutosensResult,
    pub meal: MealData,
    pub options: LoopOptions,
}

impl DecisionInputs {
    /// Start building inputs.
    pub fn builder() -> DecisionInputsBuilder<Missing, Missing, Missing> {
        DecisionInputsBuilder::default()
    }

    /// Run the decision for these inputs.
    pub fn decide(&self) -> Result<Decision> {
        determine_basal(self)
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct DecisionInputsBuilder<G, P, I> {
    glucose: Option<GlucoseStatus>,
    profile: Option<Profile>,
    iob: Option<Vec<IobEntry>>,
    current_temp: Option<CurrentTemp>,
    autosens: Option<AutosensResult>,
    meal: Option<MealData>,
    options: Option<LoopOptions>,
    time_ms: Option<i64>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _g: PhantomData<G>,
    _p: PhantomData<P>,
    _i: PhantomData<I>,
}

impl Default for DecisionInputsBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            glucose: None,
            profile: None,
            iob: None,
            current_temp: None,
            autosens: None,
            meal: None,
            options: None,
            time_ms: None,
            clock: None,
            _g: PhantomData,
            _p: PhantomData,
            _i: PhantomData,
        }
    }
}

impl<G, P, I> core::fmt::Debug for DecisionInputsBuilder<G, P, I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecisionInputsBuilder")
            .field("glucose", &self.glucose)
            .field("has_profile", &self.profile.is_some())
            .field("iob_len", &self.iob.as_ref().map(Vec::len))
            .field("time_ms", &self.time_ms)
            .field("has_clock", &self.clock.is_some())
            .finish_non_exhaustive()
    }
}

fn validate(glucose: &GlucoseStatus, profile: &Profile, iob: &[IobEntry]) -> Result<()> {
    let bg_fields = [
        glucose.glucose,
        glucose.delta,
        glucose.short_avg_delta,
        glucose.long_avg_delta,
        glucose.noise,
    ];
    if bg_fields.iter().any(|v| !v.is_finite()) {
        return Err(eyre::Report::new(BuildError::InvalidInput(
            "glucose status must be finite",
        )));
    }
    let profile_fields = [
        profile.min_bg,
        profile.max_bg,
        profile.sens,
        profile.carb_ratio,
        profile.current_basal,
        profile.max_basal,
        profile.max_daily_basal,
        profile.max_iob,
        profile.autosens_max,
        profile.variable_sens,
    ];
    if profile_fields.iter().any(|v| !v.is_finite()) {
        return Err(eyre::Report::new(BuildError::InvalidInput(
            "profile values must be finite",
        )));
    }
    if profile.max_bg < profile.min_bg {
        return Err(eyre::Report::new(BuildError::InvalidInput(
            "max_bg must be >= min_bg",
        )));
    }
    if iob
        .iter()
        .any(|e| !(e.iob.is_finite() && e.activity.is_finite()))
    {
        return Err(eyre::Report::new(BuildError::InvalidInput(
            "IOB timeline must be finite",
        )));
    }
    Ok(())
}

impl<G, P, I> DecisionInputsBuilder<G, P, I> {
    /// Fallible build available in any type-state; returns a typed error for missing pieces.
    pub fn try_build(self) -> Result<DecisionInputs> {
        let glucose = self
            .glucose
            .ok_or_else(|| eyre::Report::new(BuildError::MissingGlucose))?;
        let profile = self
            .profile
            .ok_or_else(|| eyre::Report::new(BuildError::MissingProfile))?;
        let iob = self
            .iob
            .ok_or_else(|| eyre::Report::new(BuildError::MissingIob))?;
        if iob.is_empty() {
            return Err(eyre::Report::new(BuildError::EmptyIob));
        }
        validate(&glucose, &profile, &iob)?;

        let mut options = self.options.unwrap_or_default();
        // explicit time, then an injected clock, then the options' own stamp
        if let Some(t) = self.time_ms {
            options.current_time_ms = t;
        } else if let Some(clock) = self.clock {
            options.current_time_ms = clock.now_ms();
        } else if options.current_time_ms == 0 {
            options.current_time_ms = SystemClock::new().now_ms();
        }

        Ok(DecisionInputs {
            glucose,
            current_temp: self.current_temp.unwrap_or_default(),
            iob,
            profile,
            autosens: self.autosens.unwrap_or_default(),
            meal: self.meal.unwrap_or_default(),
            options,
        })
    }
}

/// Chainable setters that do not affect type-state.
impl<G, P, I> DecisionInputsBuilder<G, P, I> {
    pub fn with_current_temp(mut self, current_temp: CurrentTemp) -> Self {
        self.current_temp = Some(current_temp);
        self
    }
    pub fn with_autosens(mut self, autosens: AutosensResult) -> Self {
        self.autosens = Some(autosens);
        self
    }
    pub fn with_meal(mut self, meal: MealData) -> Self {
        self.meal = Some(meal);
        self
    }
    pub fn with_options(mut self, options: LoopOptions) -> Self {
        self.options = Some(options);
        self
    }
    /// Pin the cycle time (epoch ms).
    pub fn at_time_ms(mut self, time_ms: i64) -> Self {
        self.time_ms = Some(time_ms);
        self
    }
    /// Provide a custom clock; defaults to `SystemClock` when neither a clock
    /// nor a time is given.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<P, I> DecisionInputsBuilder<Missing, P, I> {
    pub fn with_glucose(self, glucose: GlucoseStatus) -> DecisionInputsBuilder<Set, P, I> {
        DecisionInputsBuilder {
            glucose: Some(glucose),
            profile: self.profile,
            iob: self.iob,
            current_temp: self.current_temp,
            autosens: self.autosens,
            meal: self.meal,
            options: self.options,
            time_ms: self.time_ms,
            clock: self.clock,
            _g: PhantomData,
            _p: PhantomData,
            _i: PhantomData,
        }
    }
}

impl<G, I> DecisionInputsBuilder<G, Missing, I> {
    pub fn with_profile(self, profile: Profile) -> DecisionInputsBuilder<G, Set, I> {
        DecisionInputsBuilder {
            glucose: self.glucose,
            profile: Some(profile),
            iob: self.iob,
            current_temp: self.current_temp,
            autosens: self.autosens,
            meal: self.meal,
            options: self.options,
            time_ms: self.time_ms,
            clock: self.clock,
            _g: PhantomData,
            _p: PhantomData,
            _i: PhantomData,
        }
    }
}

impl<G, P> DecisionInputsBuilder<G, P, Missing> {
    pub fn with_iob(self, iob: Vec<IobEntry>) -> DecisionInputsBuilder<G, P, Set> {
        DecisionInputsBuilder {
            glucose: self.glucose,
            profile: self.profile,
            iob: Some(iob),
            current_temp: self.current_temp,
            autosens: self.autosens,
            meal: self.meal,
            options: self.options,
            time_ms: self.time_ms,
            clock: self.clock,
            _g: PhantomData,
            _p: PhantomData,
            _i: PhantomData,
        }
    }
}

impl DecisionInputsBuilder<Set, Set, Set> {
    /// Build once glucose, profile and IOB are set. Still fails on an empty
    /// or non-finite timeline and on non-finite inputs.
    pub fn build(self) -> Result<DecisionInputs> {
        self.try_build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoisf_traits::clock::FixedClock;

    fn glucose() -> GlucoseStatus {
        GlucoseStatus {
            glucose: 6.0,
            delta: 0.0,
            short_avg_delta: 0.0,
            long_avg_delta: 0.0,
            date: 1_000,
            noise: 0.0,
        }
    }

    #[test]
    fn explicit_time_wins_over_clock() {
        let inputs = DecisionInputs::builder()
            .with_glucose(glucose())
            .with_profile(Profile::default())
            .with_iob(vec![IobEntry::default()])
            .with_clock(Box::new(FixedClock::new(5_000)))
            .at_time_ms(7_000)
            .build()
            .expect("build");
        assert_eq!(inputs.options.current_time_ms, 7_000);
    }

    #[test]
    fn clock_supplies_time() {
        let inputs = DecisionInputs::builder()
            .with_glucose(glucose())
            .with_profile(Profile::default())
            .with_iob(vec![IobEntry::default()])
            .with_clock(Box::new(FixedClock::new(5_000)))
            .build()
            .expect("build");
        assert_eq!(inputs.options.current_time_ms, 5_000);
        assert_eq!(inputs.current_temp, CurrentTemp::default());
        assert!((inputs.autosens.ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_glucose_is_rejected() {
        let g = GlucoseStatus {
            delta: f64::NAN,
            ..glucose()
        };
        let err = DecisionInputs::builder()
            .with_glucose(g)
            .with_profile(Profile::default())
            .with_iob(vec![IobEntry::default()])
            .at_time_ms(0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidInput(_))
        ));
    }
}
