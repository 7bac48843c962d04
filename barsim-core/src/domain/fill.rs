use crate::domain::ids::{OrderId, TradeId};
use crate::domain::order::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fill record: one per executed order (or per liquidation / end-of-data close).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// `None` for closes the broker performs on its own (liquidation, end of data).
    pub order_id: Option<OrderId>,
    pub trade_id: Option<TradeId>,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub commission: f64,
    /// Slippage cost in currency units (always >= 0).
    pub slippage: f64,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}
