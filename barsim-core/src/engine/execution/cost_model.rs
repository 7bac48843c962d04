//! Slippage and commission.
//!
//! Slippage is directional: buyers pay more, sellers receive less. It applies
//! to market and stop fills only; limit fills execute at their price.
//! Commission is basis points of notional plus a fixed fee per fill.

use crate::domain::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub slippage_bps: f64,
    pub commission_bps: f64,
    pub commission_fixed: f64,
}

impl CostModel {
    pub fn new(slippage_bps: f64, commission_bps: f64, commission_fixed: f64) -> Self {
        Self {
            slippage_bps,
            commission_bps,
            commission_fixed,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Returns `(slipped_price, slippage_cost)`.
    pub fn apply_slippage(&self, raw_price: f64, side: OrderSide, size: f64) -> (f64, f64) {
        if self.slippage_bps == 0.0 {
            return (raw_price, 0.0);
        }
        let slipped = raw_price * (1.0 + side.sign() * self.slippage_bps / 10_000.0);
        (slipped, (slipped - raw_price).abs() * size)
    }

    pub fn commission(&self, price: f64, size: f64) -> f64 {
        price * size * self.commission_bps / 10_000.0 + self.commission_fixed
    }
}
