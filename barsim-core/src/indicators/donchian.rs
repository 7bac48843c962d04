//! Donchian channel: highest high (upper) or lowest low (lower) over `period` bars.

use crate::components::indicator::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonchianBand {
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Donchian {
    period: usize,
    band: DonchianBand,
    name: String,
}

impl Donchian {
    pub fn new(period: usize, band: DonchianBand) -> Result<Self, IndicatorError> {
        let period = check_period("Donchian", period, 1)?;
        let label = match band {
            DonchianBand::Upper => "upper",
            DonchianBand::Lower => "lower",
        };
        Ok(Self {
            period,
            band,
            name: format!("donchian_{label}_{period}"),
        })
    }

    pub fn upper(period: usize) -> Result<Self, IndicatorError> {
        Self::new(period, DonchianBand::Upper)
    }

    pub fn lower(period: usize) -> Result<Self, IndicatorError> {
        Self::new(period, DonchianBand::Lower)
    }
}

impl Indicator for Donchian {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut out = vec![f64::NAN; bars.len()];
        for i in self.period.saturating_sub(1)..bars.len() {
            let window = &bars[i + 1 - self.period..=i];
            out[i] = match self.band {
                DonchianBand::Upper => window.iter().map(|b| b.high).fold(f64::MIN, f64::max),
                DonchianBand::Lower => window.iter().map(|b| b.low).fold(f64::MAX, f64::min),
            };
        }
        out
    }
}
