//! Percent trailing stop: a fixed fraction below the high-water close
//! (above the low-water close for shorts).

use super::{trail_nearest, TrailingModel};
use crate::components::indicator::IndicatorError;
use crate::domain::Trade;
use crate::engine::MarketView;

#[derive(Debug, Clone)]
pub struct PercentTrailing {
    /// Fraction in (0, 1), e.g. 0.05 for 5%.
    pub trail_pct: f64,
}

impl PercentTrailing {
    pub fn new(trail_pct: f64) -> Result<Self, IndicatorError> {
        if !(trail_pct > 0.0 && trail_pct < 1.0) {
            return Err(IndicatorError::InvalidMultiplier {
                indicator: "percent_trailing",
                value: trail_pct,
            });
        }
        Ok(Self { trail_pct })
    }
}

impl TrailingModel for PercentTrailing {
    fn name(&self) -> &str {
        "percent_trailing"
    }

    fn trail(&self, trade: &Trade, stops: &[f64], _market: &MarketView<'_>) -> Vec<f64> {
        let candidate = if trade.is_long() {
            trade.extreme_price * (1.0 - self.trail_pct)
        } else {
            trade.extreme_price * (1.0 + self.trail_pct)
        };
        trail_nearest(trade, stops, candidate)
    }
}
