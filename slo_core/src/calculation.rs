use crate::backend::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of evaluating one objective over one budget window.
///
/// Raw fields hold whatever the backend returned; the accessors apply the
/// clamping rules: counts never go below zero and the SLI never exceeds 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub good: f64,
    pub valid: f64,
    pub bad: f64,
    pub result: f64,
}

impl Calculation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_good(&mut self, samples: &[Sample]) {
        self.good = first_value(samples).unwrap_or(0.0);
    }

    pub fn set_valid(&mut self, samples: &[Sample]) {
        self.valid = first_value(samples).unwrap_or(0.0);
    }

    /// A missing ratio sample counts as full compliance.
    pub fn set_ratio(&mut self, samples: &[Sample]) {
        self.result = first_value(samples).unwrap_or(1.0);
    }

    pub fn compute_bad(&mut self) {
        self.bad = self.valid - self.good;
    }

    pub fn good(&self) -> f64 {
        floor_at_zero(self.good)
    }

    pub fn valid(&self) -> f64 {
        floor_at_zero(self.valid)
    }

    pub fn bad(&self) -> f64 {
        floor_at_zero(self.bad)
    }

    /// NaN passes through so an undefined SLI is never reported as compliant.
    pub fn result(&self) -> f64 {
        if self.result > 1.0 {
            1.0
        } else {
            self.result
        }
    }

    /// Remaining bad events the budget still tolerates. Negative once the
    /// budget is exhausted.
    pub fn available(&self, goal: f64) -> f64 {
        self.valid() - (self.valid() * goal) - self.bad()
    }
}

impl fmt::Display for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Result: {:.6} GoodEvents: {}, BadEvents: {}, ValidEvents: {}",
            self.result,
            self.good().trunc() as i64,
            self.bad().trunc() as i64,
            self.valid().trunc() as i64,
        )
    }
}

// f64::max would swallow NaN
fn floor_at_zero(value: f64) -> f64 {
    if value < 0.0 {
        0.0
    } else {
        value
    }
}

fn first_value(samples: &[Sample]) -> Option<f64> {
    samples.first().map(|sample| sample.value)
}
