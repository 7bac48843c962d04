//! barsim runner: run configuration, CSV loading, backtest reports and batches.
//!
//! This crate builds on `barsim-core` to provide:
//! - TOML run configuration with content-addressed run ids
//! - Canonical OHLCV CSV loading
//! - Single-run orchestration into a serializable report with statistics
//! - A batch executor for many independent runs

pub mod batch;
pub mod config;
pub mod data_loader;
pub mod metrics;
pub mod runner;

pub use batch::{run_batch, run_batch_with, BatchError, BatchOutcome, WorkUnit};
pub use config::{ConfigError, ReportConfig, RunConfig, RunId, StrategyConfig};
pub use data_loader::{load_csv, read_bars, write_bars, LoadError};
pub use metrics::Statistics;
pub use runner::{run_backtest, BacktestReport, RunError, SCHEMA_VERSION};
