//! Component traits a strategy is assembled from.
//!
//! - Indicator: pure full-history series, bound once per run
//! - Risk model: currency amount to risk on the next trade
//! - TP/SL model: exit plan for a new entry
//! - Trailing model: moves stop-loss levels after a take-profit has banked

pub mod indicator;
pub mod risk;
pub mod tpsl;
pub mod trailing;

pub use indicator::{Indicator, IndicatorError};
pub use risk::{size_for_risk, FixedFractionRisk, KellyRisk, RiskContext, RiskModel};
pub use tpsl::{
    AtrRiskReward, MultiLevelAtr, PivotPoints, Pivots, PsarRiskReward, TpSlError, TpSlModel,
};
pub use trailing::{AtrTrailing, PercentTrailing, StdDevTrailing, TrailingModel};
