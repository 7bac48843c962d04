//! Backtesting engine: indicator binding, the order book and ledger, the
//! matching broker, and the bar-by-bar driver that ties them to a strategy.
//!
//! Per bar the driver advances the window, lets the broker match eligible
//! orders against the new bar, applies trailing stops, marks equity at the
//! close and finally calls the strategy.

pub mod binder;
pub mod broker;
pub mod config;
pub mod driver;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod market;
pub mod order_book;

pub use binder::{BinderError, IndicatorBinder, IndicatorHandle, IndicatorView, LookaheadCheck};
pub use broker::{Broker, BrokerRecord, CancelOutcome};
pub use config::EngineConfig;
pub use driver::{run, EquityPoint, RunOutput};
pub use error::{EngineError, OrderError, RunWarning, WarningKind};
pub use execution::{CostModel, GapPolicy};
pub use ledger::{Ledger, LedgerError, MarginMode, Position};
pub use market::MarketView;
pub use order_book::{OrderBook, OrderBookError};
