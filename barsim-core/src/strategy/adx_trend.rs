//! ADX trend follower with multi-level exits.
//!
//! While ADX is above the threshold, an up close enters long and a down close
//! enters short. An opposite position is closed first; entries resume once it
//! is gone. Each entry carries `n_sl_levels` stops and `n_tp_levels` targets
//! from [`MultiLevelAtr`], is sized from the risk model and the weighted stop
//! distance, and trails its stops by standard deviation after the first target.

use super::{InitContext, Strategy, StrategyContext, StrategyError};
use crate::components::{
    size_for_risk, FixedFractionRisk, KellyRisk, MultiLevelAtr, RiskContext, RiskModel,
    StdDevTrailing, TpSlError, TpSlModel,
};
use crate::domain::{Direction, ExitPlan, OrderRequest, Trade};
use crate::engine::IndicatorHandle;
use crate::indicators::{Adx, Atr};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskModelKind {
    FixedFraction,
    #[default]
    Kelly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdxTrendParams {
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub risk_reward: f64,
    pub n_tp_levels: usize,
    pub n_sl_levels: usize,
    pub risk_model: RiskModelKind,
    /// Fraction of equity risked per trade (Kelly scales this).
    pub initial_risk: f64,
    pub std_dev_multiplier: f64,
    pub std_dev_period: usize,
    /// Most trades open at once.
    pub max_trades: usize,
}

impl Default for AdxTrendParams {
    fn default() -> Self {
        Self {
            adx_period: 14,
            adx_threshold: 25.0,
            atr_period: 14,
            atr_multiplier: 3.0,
            risk_reward: 2.0,
            n_tp_levels: 4,
            n_sl_levels: 4,
            risk_model: RiskModelKind::Kelly,
            initial_risk: 0.01,
            std_dev_multiplier: 1.5,
            std_dev_period: 16,
            max_trades: 8,
        }
    }
}

impl AdxTrendParams {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.adx_period == 0 || self.atr_period == 0 {
            return Err(StrategyError::Config(
                "adx_period and atr_period must be >= 1".into(),
            ));
        }
        if !(self.adx_threshold.is_finite() && (0.0..=100.0).contains(&self.adx_threshold)) {
            return Err(StrategyError::Config(format!(
                "adx_threshold must be in [0, 100], got {}",
                self.adx_threshold
            )));
        }
        if self.n_tp_levels == 0 || self.n_sl_levels == 0 {
            return Err(StrategyError::Config(
                "need at least one take-profit and one stop-loss level".into(),
            ));
        }
        if !(self.initial_risk > 0.0 && self.initial_risk < 1.0) {
            return Err(StrategyError::Config(format!(
                "initial_risk must be in (0, 1), got {}",
                self.initial_risk
            )));
        }
        if self.max_trades == 0 {
            return Err(StrategyError::Config("max_trades must be >= 1".into()));
        }
        Ok(())
    }
}

pub struct AdxTrend {
    params: AdxTrendParams,
    risk: Box<dyn RiskModel>,
    exits: Option<MultiLevelAtr>,
    adx: Option<IndicatorHandle>,
    closed_pnls: Vec<f64>,
}

impl AdxTrend {
    pub fn new(params: AdxTrendParams) -> Result<Self, StrategyError> {
        params.validate()?;
        let risk: Box<dyn RiskModel> = match params.risk_model {
            RiskModelKind::FixedFraction => Box::new(FixedFractionRisk::new(params.initial_risk)),
            RiskModelKind::Kelly => Box::new(KellyRisk::new(params.initial_risk)),
        };
        Ok(Self {
            params,
            risk,
            exits: None,
            adx: None,
            closed_pnls: Vec::new(),
        })
    }

    pub fn params(&self) -> &AdxTrendParams {
        &self.params
    }

    fn enter(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        direction: Direction,
    ) -> Result<(), StrategyError> {
        let Some(exits) = &self.exits else {
            return Err(StrategyError::Config("next() called before init()".into()));
        };
        let plan = match exits.levels(direction, &ctx.market()) {
            Ok(plan) => plan,
            Err(TpSlError::NotReady { .. } | TpSlError::InvalidLevels { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let close = ctx.bar().close;
        let Some(distance) = weighted_stop_distance(&plan, close) else {
            return Ok(());
        };
        let risk = self.risk.risk_per_trade(&RiskContext {
            equity: ctx.equity(),
            closed_pnls: &self.closed_pnls,
        });
        let lot = ctx.lot_size();
        let units = size_for_risk(risk, close, close - distance);
        let size = (units / lot).ceil() * lot;
        if size <= 0.0 {
            return Ok(());
        }

        debug!(?direction, size, risk, bar = ctx.bar_index(), "adx trend entry");
        let request = OrderRequest::units(size).exit_plan(plan).tag("adx_trend");
        match direction {
            Direction::Long => ctx.buy(request)?,
            Direction::Short => ctx.sell(request)?,
        };
        Ok(())
    }
}

/// Weight-averaged distance from `close` to the plan's stop-loss levels.
fn weighted_stop_distance(plan: &ExitPlan, close: f64) -> Option<f64> {
    let total: f64 = plan.stop_losses.iter().map(|l| l.weight).sum();
    if total <= 0.0 {
        return None;
    }
    let distance = plan
        .stop_losses
        .iter()
        .map(|l| l.weight * (close - l.price).abs())
        .sum::<f64>()
        / total;
    (distance > 0.0).then_some(distance)
}

impl Strategy for AdxTrend {
    fn name(&self) -> &str {
        "adx_trend"
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), StrategyError> {
        let p = &self.params;
        self.adx = Some(ctx.register_indicator(&Adx::new(p.adx_period)?)?);
        let atr = ctx.register_indicator(&Atr::new(p.atr_period)?)?;
        self.exits = Some(MultiLevelAtr::new(
            atr,
            p.atr_multiplier,
            p.risk_reward,
            p.n_tp_levels,
            p.n_sl_levels,
        )?);
        ctx.set_trailing(Box::new(StdDevTrailing::new(
            p.std_dev_multiplier,
            p.std_dev_period,
        )?));
        Ok(())
    }

    fn next(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        let Some(adx) = self.adx else {
            return Err(StrategyError::Config("next() called before init()".into()));
        };
        let data = ctx.data();
        if data.len() < 2 || ctx.indicator(adx)?.latest() <= self.params.adx_threshold {
            return Ok(());
        }
        let (close, prev) = (data.close(-1)?, data.close(-2)?);
        let direction = if close > prev {
            Direction::Long
        } else if close < prev {
            Direction::Short
        } else {
            return Ok(());
        };

        let position = ctx.position();
        let opposite = match direction {
            Direction::Long => position.is_short(),
            Direction::Short => position.is_long(),
        };
        if opposite {
            ctx.close_position();
            return Ok(());
        }
        if position.open_trades >= self.params.max_trades {
            return Ok(());
        }
        self.enter(ctx, direction)
    }

    fn on_trade_closed(&mut self, trade: &Trade) {
        let pnl = trade.net_pnl();
        self.closed_pnls.push(pnl);
        if pnl > 0.0 {
            self.risk.update_after_win();
        } else {
            self.risk.update_after_loss();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let p = AdxTrendParams::default();
        assert!(p.validate().is_ok());
        assert_eq!(p.n_tp_levels, 4);
        assert_eq!(p.std_dev_period, 16);
    }

    #[test]
    fn bad_params_fail_construction() {
        for p in [
            AdxTrendParams {
                n_sl_levels: 0,
                ..AdxTrendParams::default()
            },
            AdxTrendParams {
                initial_risk: 1.5,
                ..AdxTrendParams::default()
            },
            AdxTrendParams {
                adx_threshold: 120.0,
                ..AdxTrendParams::default()
            },
        ] {
            assert!(AdxTrend::new(p).is_err());
        }
    }

    #[test]
    fn stop_distance_is_weight_averaged() {
        let plan = ExitPlan::new()
            .stop_loss(98.0, 0.5)
            .stop_loss(94.0, 0.5)
            .take_profit(110.0, 1.0);
        assert_eq!(weighted_stop_distance(&plan, 100.0), Some(4.0));
        assert_eq!(weighted_stop_distance(&ExitPlan::new(), 100.0), None);
    }
}
