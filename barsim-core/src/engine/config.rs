//! Engine configuration for a single backtest run.

use super::binder::LookaheadCheck;
use super::execution::{CostModel, GapPolicy};
use super::ledger::MarginMode;
use serde::{Deserialize, Serialize};

/// Broker and driver settings. Every field has a default, so a TOML table may
/// name only what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Starting cash.
    pub cash: f64,
    /// Commission in basis points of fill notional.
    pub commission_bps: f64,
    /// Fixed commission per fill.
    pub commission_fixed: f64,
    /// Adverse slippage in basis points, market and stop fills only.
    pub slippage_bps: f64,
    /// Margin requirement is gross notional / leverage.
    pub leverage: f64,
    pub margin_mode: MarginMode,
    pub gap_policy: GapPolicy,
    /// Open independent trades instead of netting opposite fills.
    pub hedging: bool,
    /// A new entry cancels other pending entries and closes open trades.
    pub exclusive_orders: bool,
    /// Unit sizes must be multiples of this.
    pub lot_size: f64,
    /// Close remaining trades at the last close.
    pub close_at_end: bool,
    pub lookahead_check: LookaheadCheck,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cash: 10_000.0,
            commission_bps: 0.0,
            commission_fixed: 0.0,
            slippage_bps: 0.0,
            leverage: 1.0,
            margin_mode: MarginMode::Equity,
            gap_policy: GapPolicy::FillAtWorst,
            hedging: false,
            exclusive_orders: false,
            lot_size: 1.0,
            close_at_end: true,
            lookahead_check: LookaheadCheck::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_cash(cash: f64) -> Self {
        Self {
            cash,
            ..Self::default()
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(
            self.slippage_bps,
            self.commission_bps,
            self.commission_fixed,
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        fn positive(name: &str, value: f64) -> Result<(), String> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(format!("{name} must be finite and > 0, got {value}"))
            }
        }
        fn non_negative(name: &str, value: f64) -> Result<(), String> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(format!("{name} must be finite and >= 0, got {value}"))
            }
        }

        positive("cash", self.cash)?;
        positive("leverage", self.leverage)?;
        positive("lot_size", self.lot_size)?;
        non_negative("commission_bps", self.commission_bps)?;
        non_negative("commission_fixed", self.commission_fixed)?;
        non_negative("slippage_bps", self.slippage_bps)?;
        if let LookaheadCheck::Probe { points: 0 } = self.lookahead_check {
            return Err("lookahead_check probe needs at least one point".into());
        }
        Ok(())
    }
}
