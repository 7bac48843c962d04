//! barsim core: event-driven bar-by-bar backtesting of a single instrument.
//!
//! - Bar series with a look-ahead-free window
//! - Indicator binder: full-history computation, truncated views
//! - Order book, trade ledger and the matching broker
//! - Multi-level exit plans with trailing stops
//! - Strategy trait, driver loop and reference strategies

pub mod components;
pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod strategy;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: run inputs and outputs can cross threads, which
    /// the batch executor relies on.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Order>();
        require_sync::<domain::Order>();
        require_send::<domain::OrderRequest>();
        require_sync::<domain::OrderRequest>();
        require_send::<domain::Fill>();
        require_sync::<domain::Fill>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::OrderId>();
        require_sync::<domain::OrderId>();
        require_send::<domain::TradeId>();
        require_sync::<domain::TradeId>();

        // Data
        require_send::<data::BarSeries>();
        require_sync::<data::BarSeries>();

        // Engine types
        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();
        require_send::<engine::IndicatorBinder>();
        require_sync::<engine::IndicatorBinder>();
        require_send::<engine::OrderBook>();
        require_sync::<engine::OrderBook>();
        require_send::<engine::Ledger>();
        require_sync::<engine::Ledger>();
        require_send::<engine::Broker>();
        require_sync::<engine::Broker>();
        require_send::<engine::RunOutput>();
        require_sync::<engine::RunOutput>();
        require_send::<engine::EngineError>();
        require_sync::<engine::EngineError>();

        // Components and strategies
        require_send::<Box<dyn components::TrailingModel>>();
        require_sync::<Box<dyn components::TrailingModel>>();
        require_send::<Box<dyn components::RiskModel>>();
        require_send::<Box<dyn components::TpSlModel>>();
        require_send::<strategy::SmaCross>();
        require_send::<strategy::AdxTrend>();
        require_send::<Box<dyn strategy::Strategy>>();
    }
}
