//! Run-level errors and non-fatal run warnings.

use super::binder::BinderError;
use super::ledger::LedgerError;
use super::order_book::OrderBookError;
use crate::data::SeriesError;
use crate::domain::{LevelKind, OrderId, OrderSide, TradeId};
use crate::strategy::StrategyError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    Config(String),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Binder(#[from] BinderError),

    #[error("warm-up of {warmup} bars covers the whole series of {len} bars")]
    InsufficientData { warmup: usize, len: usize },

    #[error("strategy failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error("invariant violated at bar {bar}: {message}")]
    Invariant { bar: usize, message: String },
}

impl EngineError {
    pub(crate) fn invariant(bar: usize, message: impl Into<String>) -> Self {
        Self::Invariant {
            bar,
            message: message.into(),
        }
    }

    pub(crate) fn from_book(bar: usize, err: OrderBookError) -> Self {
        Self::invariant(bar, err.to_string())
    }

    pub(crate) fn from_ledger(bar: usize, err: LedgerError) -> Self {
        Self::invariant(bar, err.to_string())
    }
}

/// Rejections of a strategy request. The request has no effect.
#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("order size must be finite and > 0, got {0}")]
    InvalidSize(f64),

    #[error("size {size} is not a multiple of the lot size {lot}")]
    OddLot { size: f64, lot: f64 },

    #[error("equity fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),

    #[error("{field} price must be finite and > 0, got {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("level weight must be finite and > 0, got {0}")]
    InvalidWeight(f64),

    #[error("{side} {kind} at {level} is on the wrong side of reference price {reference}")]
    InvalidExitGeometry {
        side: OrderSide,
        reference: f64,
        level: f64,
        kind: LevelKind,
    },

    #[error("{0} does not exist")]
    UnknownTrade(TradeId),

    #[error("{0} is already closed")]
    TradeClosed(TradeId),

    #[error("close portion must be in (0, 1], got {0}")]
    InvalidPortion(f64),

    #[error("{0} is managed by its trade and cannot be canceled directly")]
    ContingentOrder(OrderId),

    #[error("{0} does not exist")]
    UnknownOrder(OrderId),

    #[error("{0} has several levels of that kind; edit its exit plan instead")]
    MultiLevelPlan(TradeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    InsufficientMargin,
    ZeroSize,
    AlreadyFinal,
    Liquidation,
}

/// A recoverable problem recorded on the run instead of failing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWarning {
    pub bar_index: usize,
    pub kind: WarningKind,
    pub message: String,
}
