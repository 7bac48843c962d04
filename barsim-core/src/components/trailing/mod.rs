//! Trailing stop models.
//!
//! Once a trade has banked at least one take-profit level, the broker asks the
//! trade's trailing model for new stop-loss prices after each bar's matching.
//! Proposals are ratcheted by the broker: a long's stop only rises, a short's
//! only falls. A model never submits orders itself.

pub mod atr;
pub mod percent;
pub mod std_dev;

pub use atr::AtrTrailing;
pub use percent::PercentTrailing;
pub use std_dev::StdDevTrailing;

use crate::domain::Trade;
use crate::engine::MarketView;

pub trait TrailingModel: Send + Sync {
    fn name(&self) -> &str;

    /// One proposed price per entry of `stops` (the trade's surviving
    /// stop-loss levels, nearest first). NaN keeps a level where it is.
    fn trail(&self, trade: &Trade, stops: &[f64], market: &MarketView<'_>) -> Vec<f64>;
}

/// Move only the nearest stop to `candidate`, never past the tightest
/// existing stop in the losing direction.
pub(crate) fn trail_nearest(trade: &Trade, stops: &[f64], candidate: f64) -> Vec<f64> {
    if stops.is_empty() || !candidate.is_finite() {
        return vec![f64::NAN; stops.len()];
    }
    let tightest = if trade.is_long() {
        stops.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    } else {
        stops.iter().copied().fold(f64::INFINITY, f64::min)
    };
    let first = if trade.is_long() {
        tightest.max(candidate)
    } else {
        tightest.min(candidate)
    };
    std::iter::once(first)
        .chain(std::iter::repeat(f64::NAN).take(stops.len() - 1))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::{Direction, Level, LevelKind, OrderId, Trade, TradeId, TradeStatus};
    use chrono::TimeZone;

    pub fn trade(direction: Direction, entry: f64, extreme: f64, stops: &[f64]) -> Trade {
        Trade {
            id: TradeId(1),
            direction,
            entry_order: OrderId(1),
            entry_bar: 0,
            entry_time: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            entry_price: entry,
            initial_size: 10.0,
            remaining_size: 5.0,
            entry_commission: 0.0,
            levels: stops
                .iter()
                .map(|&p| Level::new(LevelKind::StopLoss, p, 1.0))
                .collect(),
            exits: Vec::new(),
            extreme_price: extreme,
            tag: None,
            status: TradeStatus::Open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::trade;
    use super::*;
    use crate::domain::Direction;

    #[test]
    fn nearest_level_moves_only() {
        let t = trade(Direction::Long, 100.0, 110.0, &[95.0, 90.0]);
        let out = trail_nearest(&t, &[95.0, 90.0], 104.0);
        assert_eq!(out[0], 104.0);
        assert!(out[1].is_nan());
    }

    #[test]
    fn candidate_below_tightest_keeps_it() {
        let t = trade(Direction::Long, 100.0, 101.0, &[95.0]);
        assert_eq!(trail_nearest(&t, &[95.0], 93.0), vec![95.0]);

        let s = trade(Direction::Short, 100.0, 95.0, &[105.0]);
        assert_eq!(trail_nearest(&s, &[105.0], 108.0), vec![105.0]);
        assert_eq!(trail_nearest(&s, &[105.0], 99.0), vec![99.0]);
    }
}
