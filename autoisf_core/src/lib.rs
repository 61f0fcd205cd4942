#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! AutoISF basal and SMB determination.
//!
//! One call, [`determine_basal`], turns a snapshot of sensor state, insulin
//! on board, carbs and the therapy profile into a temp-basal and microbolus
//! decision with a human-readable reason trace. Nothing here does I/O or
//! keeps state between cycles.
//!
//! ## Layout
//!
//! - **Primitives**: unit conversion, rounding, insulin/carb curves (`units`, `curves`)
//! - **Sensitivity**: autosens and temp-target scaling of ISF, basal and targets (`sensitivity`)
//! - **Predictions**: IOB/ZT/COB/aCOB/UAM curves (`predictions`)
//! - **Guard**: blended minimum and eventual BG (`guard`)
//! - **Decision**: the branch tree, SMB sizing and rate clamping (`engine`, `smb`, `temp_basal`)
//! - **Inputs**: type-state builder, config conversions, and builders for IOB,
//!   meal and autosens state from raw history (`builder`, `conversions`, `iob`, `meal`, `autosens`)
//! - **Replay**: batch scoring against recorded reference decisions (`replay`)
//!
//! All glucose values are mmol/L internally; predictions are reported in
//! whole mg/dL.

pub mod autosens;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod curves;
pub mod decision;
pub mod engine;
pub mod error;
pub mod format;
pub mod guard;
pub mod iob;
pub mod meal;
pub mod mocks;
pub mod predictions;
pub mod replay;
pub mod sensitivity;
pub mod smb;
pub mod temp_basal;
pub mod types;
pub mod units;

pub use autosens::{AutosensSample, AutosensWindow, autosens_ratio};
pub use builder::{DecisionInputs, DecisionInputsBuilder, Missing, Set};
pub use config::{LoopOptions, LoopSmbMode, Profile};
pub use conversions::inputs_from_record;
pub use decision::{Decision, Predictions, TempAction};
pub use engine::{SensorFault, determine_basal};
pub use error::{AutoIsfError, BuildError, Report, Result};
pub use format::{DecimalSeparator, ReasonFormat};
pub use iob::{InsulinEvent, iob_timeline};
pub use meal::{CarbEvent, carb_impact_now, meal_from_carbs};
pub use replay::{RegressionGuard, ReferenceOutcome, ReplayCase, ReplayMetrics, replay};
pub use temp_basal::{clamp_rate, max_safe_basal};
pub use types::{AutosensResult, CurrentTemp, GlucoseStatus, IobEntry, MealData};
