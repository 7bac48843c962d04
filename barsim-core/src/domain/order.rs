//! Orders, order requests, exit plans and the audit trail.

use super::ids::{OrderId, TradeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill at the next bar's open.
    Market,
    /// Fill at the limit price or better.
    Limit { limit_price: f64 },
    /// Triggers when price crosses the stop, then fills as market.
    Stop { stop_price: f64 },
    /// Triggers at `stop_price`, then rests as a limit at `limit_price`.
    StopLimit { stop_price: f64, limit_price: f64 },
}

impl OrderType {
    /// Price used to validate exit-plan geometry, if the order carries one.
    pub fn reference_price(&self) -> Option<f64> {
        match *self {
            Self::Market => None,
            Self::Limit { limit_price } | Self::StopLimit { limit_price, .. } => Some(limit_price),
            Self::Stop { stop_price } => Some(stop_price),
        }
    }
}

/// Order lifecycle states. `Filled`, `Canceled`, `Expired` and `Rejected` are final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    /// Stop-limit whose stop has fired; rests as a limit.
    Triggered,
    Filled,
    Canceled { reason: String },
    Expired,
    Rejected { reason: String },
}

impl OrderStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Triggered)
    }

    pub fn is_final(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Triggered => f.write_str("triggered"),
            Self::Filled => f.write_str("filled"),
            Self::Canceled { reason } => write!(f, "canceled ({reason})"),
            Self::Expired => f.write_str("expired"),
            Self::Rejected { reason } => write!(f, "rejected ({reason})"),
        }
    }
}

/// Requested order size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderSize {
    /// Absolute units, a positive multiple of the lot size.
    Units(f64),
    /// Fraction in (0, 1) of available margin, resolved to whole lots at fill time.
    EquityFraction(f64),
}

impl OrderSize {
    pub fn units(&self) -> Option<f64> {
        match *self {
            Self::Units(u) => Some(u),
            Self::EquityFraction(_) => None,
        }
    }
}

/// How long a non-contingent order stays eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lifetime {
    #[default]
    GoodTillCanceled,
    /// Eligible for this many bars after submission, then expires.
    Bars(usize),
}

impl Lifetime {
    /// Last bar index on which an order created at `created_bar` may fill.
    pub fn last_eligible_bar(self, created_bar: usize) -> Option<usize> {
        match self {
            Self::GoodTillCanceled => None,
            Self::Bars(n) => Some(created_bar + n),
        }
    }
}

/// Why an order exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    /// Strategy order: opens a trade, or nets against opposite trades.
    Entry,
    /// Market close of part of a trade.
    Close { trade: TradeId },
    /// Contingent stop order for one stop-loss level.
    StopLoss { trade: TradeId },
    /// Contingent limit order for one take-profit level.
    TakeProfit { trade: TradeId },
}

impl OrderRole {
    pub fn is_contingent(&self) -> bool {
        matches!(self, Self::StopLoss { .. } | Self::TakeProfit { .. })
    }

    pub fn trade(&self) -> Option<TradeId> {
        match *self {
            Self::Entry => None,
            Self::Close { trade } | Self::StopLoss { trade } | Self::TakeProfit { trade } => {
                Some(trade)
            }
        }
    }
}

/// One requested exit level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub price: f64,
    pub weight: f64,
}

/// Weighted stop-loss and take-profit levels attached to an entry.
///
/// A plain `sl`/`tp` pair is a plan with one level of each kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub stop_losses: Vec<LevelSpec>,
    pub take_profits: Vec<LevelSpec>,
}

impl ExitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        let mut plan = Self::new();
        if let Some(price) = stop_loss {
            plan = plan.stop_loss(price, 1.0);
        }
        if let Some(price) = take_profit {
            plan = plan.take_profit(price, 1.0);
        }
        plan
    }

    pub fn stop_loss(mut self, price: f64, weight: f64) -> Self {
        self.stop_losses.push(LevelSpec { price, weight });
        self
    }

    pub fn take_profit(mut self, price: f64, weight: f64) -> Self {
        self.take_profits.push(LevelSpec { price, weight });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stop_losses.is_empty() && self.take_profits.is_empty()
    }

    pub fn levels(&self) -> impl Iterator<Item = &LevelSpec> {
        self.stop_losses.iter().chain(self.take_profits.iter())
    }
}

/// What a strategy asks the broker for. Built fluently:
///
/// ```
/// use barsim_core::domain::OrderRequest;
/// let req = OrderRequest::units(10.0).limit(99.0).stop_loss(95.0).take_profit(110.0);
/// assert_eq!(req.limit, Some(99.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub size: OrderSize,
    pub limit: Option<f64>,
    pub stop: Option<f64>,
    pub exit_plan: ExitPlan,
    pub lifetime: Lifetime,
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn units(size: f64) -> Self {
        Self::with_size(OrderSize::Units(size))
    }

    pub fn equity_fraction(fraction: f64) -> Self {
        Self::with_size(OrderSize::EquityFraction(fraction))
    }

    fn with_size(size: OrderSize) -> Self {
        Self {
            size,
            limit: None,
            stop: None,
            exit_plan: ExitPlan::default(),
            lifetime: Lifetime::GoodTillCanceled,
            tag: None,
        }
    }

    pub fn limit(mut self, price: f64) -> Self {
        self.limit = Some(price);
        self
    }

    pub fn stop(mut self, price: f64) -> Self {
        self.stop = Some(price);
        self
    }

    /// Single full-weight stop-loss level.
    pub fn stop_loss(mut self, price: f64) -> Self {
        self.exit_plan = std::mem::take(&mut self.exit_plan).stop_loss(price, 1.0);
        self
    }

    /// Single full-weight take-profit level.
    pub fn take_profit(mut self, price: f64) -> Self {
        self.exit_plan = std::mem::take(&mut self.exit_plan).take_profit(price, 1.0);
        self
    }

    pub fn exit_plan(mut self, plan: ExitPlan) -> Self {
        self.exit_plan = plan;
        self
    }

    pub fn good_for_bars(mut self, bars: usize) -> Self {
        self.lifetime = Lifetime::Bars(bars);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn order_type(&self) -> OrderType {
        match (self.stop, self.limit) {
            (None, None) => OrderType::Market,
            (None, Some(limit_price)) => OrderType::Limit { limit_price },
            (Some(stop_price), None) => OrderType::Stop { stop_price },
            (Some(stop_price), Some(limit_price)) => OrderType::StopLimit {
                stop_price,
                limit_price,
            },
        }
    }
}

/// A single order in the order book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: OrderSize,
    pub status: OrderStatus,
    pub role: OrderRole,
    pub lifetime: Lifetime,
    pub exit_plan: ExitPlan,
    pub tag: Option<String>,
    pub created_bar: usize,
    pub created_at: DateTime<Utc>,
    /// First bar index on which the order may be matched.
    pub eligible_from: usize,
    pub filled_size: f64,
    pub fill_price: Option<f64>,
    pub fill_bar: Option<usize>,
}

impl Order {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_contingent(&self) -> bool {
        self.role.is_contingent()
    }

    /// Signed requested units (+ buy, - sell); `None` for equity-fraction sizing.
    pub fn signed_size(&self) -> Option<f64> {
        self.size.units().map(|u| u * self.side.sign())
    }

    pub fn is_eligible(&self, bar_index: usize) -> bool {
        self.is_active() && bar_index >= self.eligible_from
    }
}

/// Audit trail entry for an order state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub bar_index: usize,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_picks_order_type() {
        assert_eq!(OrderRequest::units(1.0).order_type(), OrderType::Market);
        assert_eq!(
            OrderRequest::units(1.0).limit(99.0).order_type(),
            OrderType::Limit { limit_price: 99.0 }
        );
        assert_eq!(
            OrderRequest::units(1.0).stop(101.0).order_type(),
            OrderType::Stop { stop_price: 101.0 }
        );
        assert_eq!(
            OrderRequest::units(1.0).stop(101.0).limit(102.0).order_type(),
            OrderType::StopLimit {
                stop_price: 101.0,
                limit_price: 102.0
            }
        );
    }

    #[test]
    fn single_sl_tp_is_one_level_each() {
        let req = OrderRequest::units(5.0).stop_loss(90.0).take_profit(120.0);
        assert_eq!(req.exit_plan.stop_losses.len(), 1);
        assert_eq!(req.exit_plan.take_profits.len(), 1);
        assert_eq!(req.exit_plan.take_profits[0].weight, 1.0);
        assert_eq!(req.exit_plan, ExitPlan::single(Some(90.0), Some(120.0)));
    }

    #[test]
    fn status_finality() {
        assert!(OrderStatus::Pending.is_active());
        assert!(OrderStatus::Triggered.is_active());
        assert!(OrderStatus::Filled.is_final());
        assert!(OrderStatus::Expired.is_final());
        assert!(OrderStatus::Rejected {
            reason: "margin".into()
        }
        .is_final());
    }

    #[test]
    fn lifetime_last_bar() {
        assert_eq!(Lifetime::GoodTillCanceled.last_eligible_bar(4), None);
        assert_eq!(Lifetime::Bars(2).last_eligible_bar(4), Some(6));
    }

    #[test]
    fn contingent_roles_reference_their_trade() {
        let role = OrderRole::StopLoss { trade: TradeId(3) };
        assert!(role.is_contingent());
        assert_eq!(role.trade(), Some(TradeId(3)));
        assert!(!OrderRole::Close { trade: TradeId(3) }.is_contingent());
        assert_eq!(OrderRole::Entry.trade(), None);
    }
}
