//! Cash and trade ledger.
//!
//! Cash moves only on fills: buying debits `price * size`, selling credits it,
//! and every fill's commission is debited. Equity is therefore always
//! `cash + sum(signed remaining size) * mark`.

use crate::domain::{
    Direction, ExitReason, ExitRecord, Level, OrderId, Trade, TradeId, TradeStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("{0} is not an open trade")]
    NotOpen(TradeId),

    #[error("exit of {size} exceeds {trade} remaining size {remaining}")]
    Oversized {
        trade: TradeId,
        size: f64,
        remaining: f64,
    },
}

/// How much of the equity counts toward free margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    /// Equity including unrealized P&L.
    #[default]
    Equity,
    /// Unrealized gains are not credited; unrealized losses still count.
    Realized,
}

/// Net exposure summary over all open trades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Signed units, positive long.
    pub size: f64,
    /// Size-weighted average entry over open trades; 0 when flat.
    pub avg_entry_price: f64,
    pub open_trades: usize,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.open_trades == 0
    }

    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }
}

/// A new trade opened by an entry fill.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub direction: Direction,
    pub entry_order: OrderId,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub commission: f64,
    pub levels: Vec<Level>,
    pub tag: Option<String>,
}

/// One reduction of an open trade.
#[derive(Debug, Clone)]
pub struct TradeExit {
    pub order_id: Option<OrderId>,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub reason: ExitReason,
    pub commission: f64,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    cash: f64,
    open: Vec<Trade>,
    closed: Vec<Trade>,
    next_trade_id: u64,
    commissions: f64,
}

impl Ledger {
    pub fn new(cash: f64) -> Self {
        Self {
            cash,
            open: Vec::new(),
            closed: Vec::new(),
            next_trade_id: 0,
            commissions: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn commissions(&self) -> f64 {
        self.commissions
    }

    /// Open trades, oldest first. Each call returns a fresh iterator.
    pub fn open_trades(&self) -> std::slice::Iter<'_, Trade> {
        self.open.iter()
    }

    /// Closed trades in the order they closed.
    pub fn closed_trades(&self) -> std::slice::Iter<'_, Trade> {
        self.closed.iter()
    }

    pub fn trade(&self, id: TradeId) -> Option<&Trade> {
        self.open
            .iter()
            .chain(self.closed.iter())
            .find(|t| t.id == id)
    }

    pub(crate) fn open_trade_mut(&mut self, id: TradeId) -> Option<&mut Trade> {
        self.open.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn open_trades_mut(&mut self) -> std::slice::IterMut<'_, Trade> {
        self.open.iter_mut()
    }

    pub fn net_size(&self) -> f64 {
        self.open.iter().map(Trade::signed_size).sum()
    }

    pub fn gross_size(&self) -> f64 {
        self.open.iter().map(|t| t.remaining_size).sum()
    }

    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        self.open.iter().map(|t| t.unrealized_pnl(mark)).sum()
    }

    pub fn equity(&self, mark: f64) -> f64 {
        self.cash + self.net_size() * mark
    }

    pub fn margin_used(&self, mark: f64, leverage: f64) -> f64 {
        self.gross_size() * mark / leverage
    }

    pub fn free_margin(&self, mark: f64, leverage: f64, mode: MarginMode) -> f64 {
        let equity = match mode {
            MarginMode::Equity => self.equity(mark),
            MarginMode::Realized => self.equity(mark) - self.unrealized_pnl(mark).max(0.0),
        };
        equity - self.margin_used(mark, leverage)
    }

    /// Free margin after hypothetically opening `size` more units at `price`
    /// in `direction`, paying `commission`.
    pub fn free_margin_after_open(
        &self,
        direction: Direction,
        size: f64,
        price: f64,
        commission: f64,
        leverage: f64,
        mode: MarginMode,
    ) -> f64 {
        let cash = self.cash - direction.sign() * price * size - commission;
        let equity = cash + (self.net_size() + direction.sign() * size) * price;
        let credited = match mode {
            MarginMode::Equity => equity,
            MarginMode::Realized => equity - self.unrealized_pnl(price).max(0.0),
        };
        credited - (self.gross_size() + size) * price / leverage
    }

    pub fn position(&self) -> Position {
        let gross = self.gross_size();
        let avg_entry_price = if gross > 0.0 {
            self.open
                .iter()
                .map(|t| t.entry_price * t.remaining_size)
                .sum::<f64>()
                / gross
        } else {
            0.0
        };
        Position {
            size: self.net_size(),
            avg_entry_price,
            open_trades: self.open.len(),
        }
    }

    pub fn open(&mut self, new: NewTrade) -> TradeId {
        self.next_trade_id += 1;
        let id = TradeId(self.next_trade_id);
        self.cash -= new.direction.sign() * new.price * new.size + new.commission;
        self.commissions += new.commission;
        self.open.push(Trade {
            id,
            direction: new.direction,
            entry_order: new.entry_order,
            entry_bar: new.bar_index,
            entry_time: new.timestamp,
            entry_price: new.price,
            initial_size: new.size,
            remaining_size: new.size,
            entry_commission: new.commission,
            levels: new.levels,
            exits: Vec::new(),
            extreme_price: new.price,
            tag: new.tag,
            status: TradeStatus::Open,
        });
        id
    }

    /// Book an exit. Returns true when the trade closed.
    pub fn reduce(&mut self, id: TradeId, exit: TradeExit) -> Result<bool, LedgerError> {
        let pos = self
            .open
            .iter()
            .position(|t| t.id == id)
            .ok_or(LedgerError::NotOpen(id))?;
        let trade = &mut self.open[pos];
        if exit.size > trade.remaining_size + crate::domain::trade::SIZE_EPSILON {
            return Err(LedgerError::Oversized {
                trade: id,
                size: exit.size,
                remaining: trade.remaining_size,
            });
        }

        let sign = trade.direction.sign();
        self.cash += sign * exit.price * exit.size - exit.commission;
        self.commissions += exit.commission;

        let closed = trade.book_exit(ExitRecord {
            order_id: exit.order_id,
            bar_index: exit.bar_index,
            timestamp: exit.timestamp,
            price: exit.price,
            size: exit.size,
            reason: exit.reason,
            pnl: (exit.price - trade.entry_price) * exit.size * sign,
            commission: exit.commission,
        });
        if closed {
            let trade = self.open.remove(pos);
            self.closed.push(trade);
        }
        Ok(closed)
    }

    /// Every trade, closed ones first, then the still-open ones.
    pub fn into_trades(self) -> Vec<Trade> {
        let mut all = self.closed;
        all.extend(self.open);
        all
    }
}
