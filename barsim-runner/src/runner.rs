//! Backtest runner: wires a run config, a bar series, the engine and metrics.

use barsim_core::data::BarSeries;
use barsim_core::domain::{Order, OrderAuditEntry, Trade};
use barsim_core::engine::{run, EngineError, EquityPoint, RunWarning};
use barsim_core::strategy::StrategyError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, RunConfig, RunId};
use crate::metrics::Statistics;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("strategy setup failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for serialized reports.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub symbol: String,
    pub strategy: String,
    pub config: RunConfig,
    pub statistics: Statistics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub orders: Vec<Order>,
    pub audit_trail: Vec<OrderAuditEntry>,
    pub warnings: Vec<RunWarning>,
    /// First bar the strategy was consulted on.
    pub warmup_bars: usize,
    pub liquidated_at: Option<usize>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run one backtest over pre-loaded bars. No I/O.
pub fn run_backtest(series: &BarSeries, config: &RunConfig) -> Result<BacktestReport, RunError> {
    config.validate()?;
    let run_id = config.run_id()?;
    let mut strategy = config.build_strategy()?;

    let output = run(series, strategy.as_mut(), &config.engine)?;
    let statistics = Statistics::compute(
        &output.equity_curve,
        &output.record.trades,
        series.full(),
        config.engine.cash,
        &config.report,
    );
    info!(
        run_id = %&run_id[..12],
        symbol = %output.symbol,
        strategy = %output.strategy,
        trades = statistics.trade_count,
        total_return = statistics.total_return,
        sharpe = statistics.sharpe,
        "backtest complete"
    );

    Ok(BacktestReport {
        schema_version: SCHEMA_VERSION,
        run_id,
        symbol: output.symbol,
        strategy: output.strategy,
        config: config.clone(),
        statistics,
        equity_curve: output.equity_curve,
        trades: output.record.trades,
        orders: output.record.orders,
        audit_trail: output.record.audit_trail,
        warnings: output.record.warnings,
        warmup_bars: output.warmup,
        liquidated_at: output.liquidated_at,
    })
}
