//! Exponential Moving Average of closes, seeded with the SMA of the first
//! `period` closes. alpha = 2 / (period + 1).

use crate::components::indicator::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("EMA", period, 1)?;
        Ok(Self {
            period,
            name: format!("ema_{period}"),
        })
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes = super::closes(bars);
        let mut out = vec![f64::NAN; closes.len()];
        if closes.len() < self.period {
            return out;
        }
        let alpha = 2.0 / (self.period as f64 + 1.0);
        let mut prev = closes[..self.period].iter().sum::<f64>() / self.period as f64;
        out[self.period - 1] = prev;
        for i in self.period..closes.len() {
            prev = alpha * closes[i] + (1.0 - alpha) * prev;
            out[i] = prev;
        }
        out
    }
}
