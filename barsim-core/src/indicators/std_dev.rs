//! Rolling sample standard deviation of closes.

use crate::components::indicator::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct StdDev {
    period: usize,
    name: String,
}

impl StdDev {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("StdDev", period, 2)?;
        Ok(Self {
            period,
            name: format!("std_{period}"),
        })
    }
}

impl Indicator for StdDev {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes = super::closes(bars);
        let mut out = vec![f64::NAN; closes.len()];
        for i in self.period.saturating_sub(1)..closes.len() {
            out[i] = super::sample_std(&closes[i + 1 - self.period..=i]);
        }
        out
    }
}
