//! ATR trailing stop: `multiplier` ATRs behind the running extreme.
//!
//! Reads a bound ATR series; while it is NaN the stops stay put.

use super::{trail_nearest, TrailingModel};
use crate::components::indicator::{check_multiplier, IndicatorError};
use crate::domain::Trade;
use crate::engine::{IndicatorHandle, MarketView};

#[derive(Debug, Clone)]
pub struct AtrTrailing {
    atr: IndicatorHandle,
    multiplier: f64,
}

impl AtrTrailing {
    /// `atr` must be a handle to a registered ATR series.
    pub fn new(atr: IndicatorHandle, multiplier: f64) -> Result<Self, IndicatorError> {
        Ok(Self {
            atr,
            multiplier: check_multiplier("atr_trailing", multiplier)?,
        })
    }
}

impl TrailingModel for AtrTrailing {
    fn name(&self) -> &str {
        "atr_trailing"
    }

    fn trail(&self, trade: &Trade, stops: &[f64], market: &MarketView<'_>) -> Vec<f64> {
        let atr = market
            .indicator(self.atr)
            .map(|v| v.latest())
            .unwrap_or(f64::NAN);
        if !(atr.is_finite() && atr > 0.0) {
            return vec![f64::NAN; stops.len()];
        }
        let candidate = if trade.is_long() {
            trade.extreme_price - atr * self.multiplier
        } else {
            trade.extreme_price + atr * self.multiplier
        };
        trail_nearest(trade, stops, candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::trade;
    use super::*;
    use crate::data::{make_bars, Window};
    use crate::domain::Direction;
    use crate::engine::IndicatorBinder;

    #[test]
    fn trails_by_atr() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        let mut binder = IndicatorBinder::default();
        let h = binder.register(&bars, "atr", |b| vec![2.0; b.len()]).unwrap();
        let market = MarketView::new(Window::new(&bars), &binder);
        let model = AtrTrailing::new(h, 3.0).unwrap();

        let t = trade(Direction::Long, 100.0, 110.0, &[95.0, 92.0]);
        let out = model.trail(&t, &[95.0, 92.0], &market);
        assert_eq!(out[0], 104.0);
        assert!(out[1].is_nan());
    }

    #[test]
    fn holds_while_atr_is_warming_up() {
        let bars = make_bars(&[100.0, 101.0]);
        let mut binder = IndicatorBinder::default();
        let h = binder
            .register(&bars, "atr", |b| vec![f64::NAN; b.len()])
            .unwrap();
        let market = MarketView::new(Window::new(&bars), &binder);
        let model = AtrTrailing::new(h, 3.0).unwrap();
        let t = trade(Direction::Long, 100.0, 110.0, &[95.0]);
        assert!(model.trail(&t, &[95.0], &market)[0].is_nan());
    }
}
