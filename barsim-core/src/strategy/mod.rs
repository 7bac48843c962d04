//! Strategy trait and the reference strategies.
//!
//! A strategy registers its indicators (and optionally a trailing model) in
//! [`Strategy::init`], then acts once per bar in [`Strategy::next`] through a
//! [`StrategyContext`] that only exposes data up to the current bar.

pub mod adx_trend;
pub mod context;
pub mod sma_cross;

pub use adx_trend::{AdxTrend, AdxTrendParams, RiskModelKind};
pub use context::{InitContext, StrategyContext};
pub use sma_cross::{SmaCross, SmaCrossParams};

use crate::components::{IndicatorError, TpSlError};
use crate::data::SeriesError;
use crate::domain::Trade;
use crate::engine::{BinderError, OrderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Binder(#[from] BinderError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error(transparent)]
    TpSl(#[from] TpSlError),

    #[error("invalid strategy parameters: {0}")]
    Config(String),
}

pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Called once before the first bar.
    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), StrategyError>;

    /// Called once per bar from the warm-up index on, after that bar's fills.
    fn next(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError>;

    /// Called for every trade that closed, after the bar that closed it.
    fn on_trade_closed(&mut self, _trade: &Trade) {}
}
