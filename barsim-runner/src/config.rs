//! Serializable run configuration, loaded from TOML.
//!
//! ```toml
//! [engine]
//! cash = 10000.0
//! commission_bps = 2.0
//!
//! [strategy]
//! type = "sma_cross"
//! fast = 10
//! slow = 30
//!
//! [report]
//! periods_per_year = 252
//! ```

use barsim_core::engine::EngineConfig;
use barsim_core::strategy::{AdxTrend, AdxTrendParams, SmaCross, SmaCrossParams, Strategy, StrategyError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a run (content-addressable hash of its config).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid engine config: {0}")]
    Engine(String),

    #[error("invalid report config: {0}")]
    Report(String),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything needed to reproduce one backtest over a given series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub report: ReportConfig,
    /// CSV file to load bars from, when not given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PathBuf>,
}

/// Reference strategy and its typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    SmaCross(SmaCrossParams),
    AdxTrend(AdxTrendParams),
}

/// Settings for reducing a run into statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Bars per year, for annualization.
    pub periods_per_year: f64,
    /// Annual risk-free rate used by Sharpe and Sortino.
    pub risk_free_rate: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
        }
    }
}

impl RunConfig {
    pub fn new(strategy: StrategyConfig) -> Self {
        Self {
            engine: EngineConfig::default(),
            strategy,
            report: ReportConfig::default(),
            data: None,
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate().map_err(ConfigError::Engine)?;
        self.report.validate().map_err(ConfigError::Report)?;
        match &self.strategy {
            StrategyConfig::SmaCross(p) => p.validate()?,
            StrategyConfig::AdxTrend(p) => p.validate()?,
        }
        Ok(())
    }

    /// Deterministic hash of the canonical JSON form.
    ///
    /// Two runs with identical configs share a run id.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Fresh strategy instance for one run.
    pub fn build_strategy(&self) -> Result<Box<dyn Strategy>, StrategyError> {
        Ok(match &self.strategy {
            StrategyConfig::SmaCross(p) => Box::new(SmaCross::new(p.clone())?),
            StrategyConfig::AdxTrend(p) => Box::new(AdxTrend::new(p.clone())?),
        })
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(format!(
                "periods_per_year must be finite and > 0, got {}",
                self.periods_per_year
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err("risk_free_rate must be finite".into());
        }
        Ok(())
    }
}
