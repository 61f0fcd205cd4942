//! Number rendering for the human-readable reason trace.
//!
//! The trace is an audit log, so formatting is an explicit parameter of
//! every decision instead of process-wide locale state.

use crate::units::round_dec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecimalSeparator {
    #[default]
    Comma,
    Point,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReasonFormat {
    pub separator: DecimalSeparator,
}

impl ReasonFormat {
    pub const fn new(separator: DecimalSeparator) -> Self {
        Self { separator }
    }

    fn localize(self, s: String) -> String {
        match self.separator {
            DecimalSeparator::Comma => s.replace('.', ","),
            DecimalSeparator::Point => s,
        }
    }

    /// Glucose value, one decimal.
    pub fn bg(self, v: f64) -> String {
        self.localize(format!("{:.1}", round_dec(v, 1)))
    }

    /// Two fixed decimals.
    pub fn fixed2(self, v: f64) -> String {
        self.localize(format!("{:.2}", round_dec(v, 2)))
    }

    /// Up to two decimals with trailing zeros dropped.
    pub fn without_zeros(self, v: f64) -> String {
        let s = format!("{v:.2}");
        let s = s.trim_end_matches('0').trim_end_matches('.').to_string();
        self.localize(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DecimalSeparator::Comma, 6.04, "6,0")]
    #[case(DecimalSeparator::Point, 6.06, "6.1")]
    #[case(DecimalSeparator::Point, -0.25, "-0.3")]
    fn bg_formats_one_decimal(#[case] sep: DecimalSeparator, #[case] v: f64, #[case] want: &str) {
        assert_eq!(ReasonFormat::new(sep).bg(v), want);
    }

    #[test]
    fn without_zeros_trims() {
        let f = ReasonFormat::default();
        assert_eq!(f.without_zeros(1.0), "1");
        assert_eq!(f.without_zeros(1.50), "1,5");
        assert_eq!(f.without_zeros(0.127), "0,13");
        assert_eq!(ReasonFormat::new(DecimalSeparator::Point).fixed2(1.006), "1.01");
    }
}
