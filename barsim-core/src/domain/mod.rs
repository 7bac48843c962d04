//! Domain types for barsim

pub mod bar;
pub mod fill;
pub mod ids;
pub mod order;
pub mod trade;

pub use bar::Bar;
pub use fill::Fill;
pub use ids::{OrderId, TradeId};
pub use order::{
    ExitPlan, LevelSpec, Lifetime, Order, OrderAuditEntry, OrderRequest, OrderRole, OrderSide,
    OrderSize, OrderStatus, OrderType,
};
pub use trade::{Direction, ExitReason, ExitRecord, Level, LevelKind, Trade, TradeStatus};
