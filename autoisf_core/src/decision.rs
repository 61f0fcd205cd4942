//! Decision returned for one dosing cycle.

use crate::error::{AutoIsfError, Result};

/// Predicted trajectories in whole mg/dL (display convention), each
/// independently trimmed. `None` means the curve was not active this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predictions {
    pub iob: Option<Vec<i32>>,
    pub zt: Option<Vec<i32>>,
    pub cob: Option<Vec<i32>>,
    pub acob: Option<Vec<i32>>,
    pub uam: Option<Vec<i32>>,
}

impl Predictions {
    /// Every populated value, across all curves.
    pub fn values(&self) -> impl Iterator<Item = i32> + '_ {
        [&self.iob, &self.zt, &self.cob, &self.acob, &self.uam]
            .into_iter()
            .flatten()
            .flat_map(|v| v.iter().copied())
    }
}

/// What the pump should do with its temp basal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempAction {
    /// Leave the running temp (or scheduled basal) untouched.
    Keep,
    /// Cancel the running temp.
    Cancel,
    /// Start a new temp.
    Set { rate: f64, duration: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub algorithm: &'static str,
    pub running_dynamic_isf: bool,
    pub timestamp: i64,

    pub bg: Option<f64>,
    pub tick: Option<String>,
    pub eventual_bg: Option<f64>,
    pub target_bg: Option<f64>,
    pub insulin_req: Option<f64>,
    pub carbs_req: Option<i64>,
    pub carbs_req_within: Option<u32>,
    pub deliver_at: Option<i64>,
    pub sensitivity_ratio: Option<f64>,

    pub duration: Option<u32>,
    pub rate: Option<f64>,
    /// Microbolus to deliver this cycle (U).
    pub smb_units: Option<f64>,

    pub predictions: Option<Predictions>,

    pub cob: Option<f64>,
    pub iob: Option<f64>,
    pub variable_sens: Option<f64>,

    pub reason: String,
    pub console_log: Vec<String>,
    pub console_error: Vec<String>,
}

impl Decision {
    pub const ALGORITHM: &'static str = "AUTO_ISF";

    pub fn new(timestamp: i64, running_dynamic_isf: bool) -> Self {
        Self {
            algorithm: Self::ALGORITHM,
            running_dynamic_isf,
            timestamp,
            bg: None,
            tick: None,
            eventual_bg: None,
            target_bg: None,
            insulin_req: None,
            carbs_req: None,
            carbs_req_within: None,
            deliver_at: None,
            sensitivity_ratio: None,
            duration: None,
            rate: None,
            smb_units: None,
            predictions: None,
            cob: None,
            iob: None,
            variable_sens: None,
            reason: String::new(),
            console_log: Vec::new(),
            console_error: Vec::new(),
        }
    }

    pub fn action(&self) -> TempAction {
        match (self.duration, self.rate) {
            (Some(0), _) => TempAction::Cancel,
            (Some(duration), Some(rate)) => TempAction::Set { rate, duration },
            _ => TempAction::Keep,
        }
    }

    pub(crate) fn set_temp(&mut self, rate: f64, duration: u32) {
        self.rate = Some(rate);
        self.duration = Some(duration);
    }

    /// Reject decisions carrying a non-finite dosing value.
    pub(crate) fn ensure_finite(self) -> Result<Self> {
        let checks = [
            ("rate", self.rate),
            ("insulin_req", self.insulin_req),
            ("smb_units", self.smb_units),
            ("eventual_bg", self.eventual_bg),
        ];
        for (name, value) in checks {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(eyre::Report::new(AutoIsfError::NonFinite(name)));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_maps_duration_and_rate() {
        let mut d = Decision::new(0, false);
        assert_eq!(d.action(), TempAction::Keep);
        d.set_temp(0.8, 30);
        assert_eq!(
            d.action(),
            TempAction::Set {
                rate: 0.8,
                duration: 30
            }
        );
        d.set_temp(0.0, 0);
        assert_eq!(d.action(), TempAction::Cancel);
    }

    #[test]
    fn non_finite_rate_is_rejected() {
        let mut d = Decision::new(0, false);
        d.set_temp(f64::NAN, 30);
        let err = d.ensure_finite().unwrap_err();
        assert_eq!(
            err.downcast_ref::<AutoIsfError>(),
            Some(&AutoIsfError::NonFinite("rate"))
        );
    }

    #[test]
    fn prediction_values_span_all_curves() {
        let p = Predictions {
            iob: Some(vec![100, 101]),
            uam: Some(vec![99]),
            ..Predictions::default()
        };
        assert_eq!(p.values().collect::<Vec<_>>(), vec![100, 101, 99]);
    }
}
