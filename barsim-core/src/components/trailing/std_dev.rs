//! Standard-deviation trailing stop.
//!
//! Trails `multiplier` sample standard deviations of the last `period` closes
//! behind the running extreme since entry. While fewer than `period` closes are
//! visible the deviation falls back to a fixed 0.1.

use super::{trail_nearest, TrailingModel};
use crate::components::indicator::{check_multiplier, check_period, IndicatorError};
use crate::domain::Trade;
use crate::engine::MarketView;
use crate::indicators::sample_std;

const FALLBACK_STD: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct StdDevTrailing {
    period: usize,
    multiplier: f64,
}

impl StdDevTrailing {
    pub fn new(multiplier: f64, period: usize) -> Result<Self, IndicatorError> {
        Ok(Self {
            period: check_period("std_dev_trailing", period, 2)?,
            multiplier: check_multiplier("std_dev_trailing", multiplier)?,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl TrailingModel for StdDevTrailing {
    fn name(&self) -> &str {
        "std_dev_trailing"
    }

    fn trail(&self, trade: &Trade, stops: &[f64], market: &MarketView<'_>) -> Vec<f64> {
        let window = market.data();
        let std = if window.len() >= self.period {
            sample_std(&window.closes(self.period))
        } else {
            f64::NAN
        };
        let std = if std.is_finite() { std } else { FALLBACK_STD };
        let offset = std * self.multiplier;
        let candidate = if trade.is_long() {
            trade.extreme_price - offset
        } else {
            trade.extreme_price + offset
        };
        trail_nearest(trade, stops, candidate)
    }
}
