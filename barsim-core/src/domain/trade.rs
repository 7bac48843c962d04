//! Trade: an open or closed position leg with its exit plan and booked exits.

use super::ids::{OrderId, TradeId};
use super::order::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sizes below this are treated as zero.
pub const SIZE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    pub fn from_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Self::Long,
            OrderSide::Sell => Self::Short,
        }
    }

    /// Side of the order that reduces a trade in this direction.
    pub fn exit_side(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Sell,
            Self::Short => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelKind {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLoss => f.write_str("stop-loss"),
            Self::TakeProfit => f.write_str("take-profit"),
        }
    }
}

/// One exit level of a trade. `order` is the live contingent order, if the
/// level currently has a non-zero allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub kind: LevelKind,
    pub price: f64,
    pub weight: f64,
    pub order: Option<OrderId>,
    pub hit: bool,
}

impl Level {
    pub fn new(kind: LevelKind, price: f64, weight: f64) -> Self {
        Self {
            kind,
            price,
            weight,
            order: None,
            hit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Strategy-requested close.
    Close,
    /// Reduced by an opposite entry under netting.
    Netting,
    EndOfData,
    Liquidation,
}

/// One partial or full exit booked against a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRecord {
    pub order_id: Option<OrderId>,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub reason: ExitReason,
    /// Gross P&L of this exit, before commissions.
    pub pnl: f64,
    pub commission: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub direction: Direction,
    pub entry_order: OrderId,
    pub entry_bar: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub initial_size: f64,
    pub remaining_size: f64,
    pub entry_commission: f64,
    pub levels: Vec<Level>,
    pub exits: Vec<ExitRecord>,
    /// Highest close since entry for longs, lowest for shorts.
    pub extreme_price: f64,
    pub tag: Option<String>,
    pub status: TradeStatus,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn signed_size(&self) -> f64 {
        self.remaining_size * self.direction.sign()
    }

    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        (mark - self.entry_price) * self.signed_size()
    }

    pub fn gross_pnl(&self) -> f64 {
        self.exits.iter().map(|e| e.pnl).sum()
    }

    pub fn commission(&self) -> f64 {
        self.entry_commission + self.exits.iter().map(|e| e.commission).sum::<f64>()
    }

    /// Realized P&L net of entry and exit commissions.
    pub fn net_pnl(&self) -> f64 {
        self.gross_pnl() - self.commission()
    }

    /// Net P&L as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.initial_size;
        if notional <= 0.0 {
            return 0.0;
        }
        self.net_pnl() / notional
    }

    /// Size-weighted average exit price over all booked exits.
    pub fn exit_price(&self) -> Option<f64> {
        let size: f64 = self.exits.iter().map(|e| e.size).sum();
        if size <= SIZE_EPSILON {
            return None;
        }
        Some(self.exits.iter().map(|e| e.price * e.size).sum::<f64>() / size)
    }

    pub fn exit_bar(&self) -> Option<usize> {
        self.exits.last().map(|e| e.bar_index)
    }

    pub fn exit_time(&self) -> Option<DateTime<Utc>> {
        self.exits.last().map(|e| e.timestamp)
    }

    pub fn bars_held(&self) -> Option<usize> {
        self.exit_bar().map(|b| b.saturating_sub(self.entry_bar))
    }

    pub fn take_profits_hit(&self) -> usize {
        self.exits
            .iter()
            .filter(|e| e.reason == ExitReason::TakeProfit)
            .count()
    }

    /// Levels of `kind` that have not fired yet, nearest to entry first.
    pub fn surviving_levels(&self, kind: LevelKind) -> impl Iterator<Item = &Level> {
        self.levels.iter().filter(move |l| l.kind == kind && !l.hit)
    }

    pub fn level_for_order(&self, order: OrderId) -> Option<usize> {
        self.levels.iter().position(|l| l.order == Some(order))
    }

    /// Track the running extreme close.
    pub fn mark_extreme(&mut self, close: f64) {
        self.extreme_price = match self.direction {
            Direction::Long => self.extreme_price.max(close),
            Direction::Short => self.extreme_price.min(close),
        };
    }

    /// Book an exit, shrinking `remaining_size`. Returns true when the trade closed.
    pub(crate) fn book_exit(&mut self, exit: ExitRecord) -> bool {
        self.remaining_size -= exit.size;
        if self.remaining_size <= SIZE_EPSILON {
            self.remaining_size = 0.0;
            self.status = TradeStatus::Closed;
        }
        self.exits.push(exit);
        !self.is_open()
    }
}
