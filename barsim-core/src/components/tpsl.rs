//! Take-profit / stop-loss models.
//!
//! A model turns the current market into an [`ExitPlan`] for a new entry.
//! Levels are placed around the latest close; the broker validates the
//! geometry again against the actual reference price on submit.

use super::indicator::{check_multiplier, IndicatorError};
use crate::domain::{Direction, ExitPlan};
use crate::engine::{BinderError, IndicatorHandle, MarketView};
use crate::indicators::{Atr, ParabolicSar};
use crate::strategy::InitContext;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TpSlError {
    #[error("{model}: no value available at bar {bar}")]
    NotReady { model: &'static str, bar: usize },

    #[error("{model}: {reason}")]
    InvalidLevels { model: &'static str, reason: String },

    #[error(transparent)]
    Binder(#[from] BinderError),

    #[error(transparent)]
    Params(#[from] IndicatorError),
}

pub trait TpSlModel: Send + Sync {
    fn name(&self) -> &str;

    fn levels(&self, direction: Direction, market: &MarketView<'_>) -> Result<ExitPlan, TpSlError>;
}

fn latest_close(model: &'static str, market: &MarketView<'_>) -> Result<f64, TpSlError> {
    market
        .current_bar()
        .map(|b| b.close)
        .ok_or(TpSlError::NotReady {
            model,
            bar: market.bar_index(),
        })
}

fn latest_atr(
    model: &'static str,
    handle: IndicatorHandle,
    market: &MarketView<'_>,
) -> Result<f64, TpSlError> {
    let atr = market.indicator(handle)?.latest();
    if atr.is_finite() && atr > 0.0 {
        Ok(atr)
    } else {
        Err(TpSlError::NotReady {
            model,
            bar: market.bar_index(),
        })
    }
}

/// One stop `multiplier` ATRs away, one target `risk_reward` times further.
#[derive(Debug, Clone)]
pub struct AtrRiskReward {
    atr: IndicatorHandle,
    multiplier: f64,
    risk_reward: f64,
}

impl AtrRiskReward {
    pub fn new(atr: IndicatorHandle, multiplier: f64, risk_reward: f64) -> Result<Self, TpSlError> {
        Ok(Self {
            atr,
            multiplier: check_multiplier("atr_risk_reward", multiplier)?,
            risk_reward: check_multiplier("atr_risk_reward", risk_reward)?,
        })
    }
}

impl TpSlModel for AtrRiskReward {
    fn name(&self) -> &str {
        "atr_risk_reward"
    }

    fn levels(&self, direction: Direction, market: &MarketView<'_>) -> Result<ExitPlan, TpSlError> {
        let close = latest_close("atr_risk_reward", market)?;
        let risk = latest_atr("atr_risk_reward", self.atr, market)? * self.multiplier;
        let sign = direction.sign();
        let sl = close - sign * risk;
        let tp = close + sign * risk * self.risk_reward;
        if sl <= 0.0 {
            return Err(TpSlError::InvalidLevels {
                model: "atr_risk_reward",
                reason: format!("stop {sl:.4} is not a positive price"),
            });
        }
        Ok(ExitPlan::single(Some(sl), Some(tp)))
    }
}

/// Classic floor-trader pivots from the latest bar.
///
/// Stop at the mean of S1/S2 and target at the mean of R1/R2 for longs,
/// mirrored for shorts. Rejects levels that land on the wrong side of the close.
#[derive(Debug, Clone, Default)]
pub struct PivotPoints;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivots {
    pub pp: f64,
    pub r1: f64,
    pub r2: f64,
    pub s1: f64,
    pub s2: f64,
}

impl Pivots {
    pub fn from_hlc(high: f64, low: f64, close: f64) -> Self {
        let pp = (high + low + close) / 3.0;
        Self {
            pp,
            r1: 2.0 * pp - low,
            r2: pp + (high - low),
            s1: 2.0 * pp - high,
            s2: pp - (high - low),
        }
    }
}

impl TpSlModel for PivotPoints {
    fn name(&self) -> &str {
        "pivot_points"
    }

    fn levels(&self, direction: Direction, market: &MarketView<'_>) -> Result<ExitPlan, TpSlError> {
        let bar = market.current_bar().ok_or(TpSlError::NotReady {
            model: "pivot_points",
            bar: market.bar_index(),
        })?;
        let p = Pivots::from_hlc(bar.high, bar.low, bar.close);
        let support = (p.s1 + p.s2) / 2.0;
        let resistance = (p.r1 + p.r2) / 2.0;
        let (sl, tp) = match direction {
            Direction::Long => (support, resistance),
            Direction::Short => (resistance, support),
        };
        let inverted = match direction {
            Direction::Long => sl >= bar.close || tp <= bar.close,
            Direction::Short => sl <= bar.close || tp >= bar.close,
        };
        if inverted || sl <= 0.0 || tp <= 0.0 {
            return Err(TpSlError::InvalidLevels {
                model: "pivot_points",
                reason: format!(
                    "stop {sl:.4} / target {tp:.4} inverted around close {:.4}",
                    bar.close
                ),
            });
        }
        Ok(ExitPlan::single(Some(sl), Some(tp)))
    }
}

/// Stop behind the previous bar's Parabolic SAR, target `risk_reward` times
/// the stop distance.
///
/// The stop is pushed out to at least 1.5 ATR(14) and one cent from the
/// close. Levels that still come out inverted or non-positive fall back to
/// a 1% stop and a 1% target.
#[derive(Debug, Clone)]
pub struct PsarRiskReward {
    psar: IndicatorHandle,
    atr: IndicatorHandle,
    risk_reward: f64,
}

impl PsarRiskReward {
    pub const ATR_PERIOD: usize = 14;
    pub const ATR_MULTIPLE: f64 = 1.5;
    pub const MIN_DISTANCE: f64 = 0.01;
    pub const FALLBACK_FRACTION: f64 = 0.01;

    pub fn new(
        psar: IndicatorHandle,
        atr: IndicatorHandle,
        risk_reward: f64,
    ) -> Result<Self, TpSlError> {
        Ok(Self {
            psar,
            atr,
            risk_reward: check_multiplier("psar_risk_reward", risk_reward)?,
        })
    }

    /// Register PSAR(`af0`, `af_step`, `af_max`) and ATR(14), then build the model.
    pub fn register(
        ctx: &mut InitContext<'_>,
        af0: f64,
        af_step: f64,
        af_max: f64,
        risk_reward: f64,
    ) -> Result<Self, TpSlError> {
        let risk_reward = check_multiplier("psar_risk_reward", risk_reward)?;
        let psar = ParabolicSar::new(af0, af_step, af_max)?;
        let psar = ctx.register_indicator(&psar)?;
        let atr = ctx.register_indicator(&Atr::new(Self::ATR_PERIOD)?)?;
        Self::new(psar, atr, risk_reward)
    }
}

impl TpSlModel for PsarRiskReward {
    fn name(&self) -> &str {
        "psar_risk_reward"
    }

    fn levels(&self, direction: Direction, market: &MarketView<'_>) -> Result<ExitPlan, TpSlError> {
        let close = latest_close("psar_risk_reward", market)?;
        let psar = market
            .indicator(self.psar)?
            .at(-2)
            .ok()
            .filter(|v| v.is_finite())
            .ok_or(TpSlError::NotReady {
                model: "psar_risk_reward",
                bar: market.bar_index(),
            })?;
        let buffer = latest_atr("psar_risk_reward", self.atr, market)? * Self::ATR_MULTIPLE;

        let sign = direction.sign();
        let sl = match direction {
            Direction::Long => psar.min(close - buffer).min(close - Self::MIN_DISTANCE),
            Direction::Short => psar.max(close + buffer).max(close + Self::MIN_DISTANCE),
        };
        let risk = sign * (close - sl);
        let tp = close + sign * risk * self.risk_reward;

        let usable = risk > 0.0 && sign * (tp - close) > 0.0 && sl > 0.0 && tp > 0.0;
        let (sl, tp) = if usable {
            (sl, tp)
        } else {
            (
                close * (1.0 - sign * Self::FALLBACK_FRACTION),
                close * (1.0 + sign * Self::FALLBACK_FRACTION),
            )
        };
        Ok(ExitPlan::single(Some(sl), Some(tp)))
    }
}

/// `n_sl` equally spaced, equally weighted stops out to `multiplier` ATRs and
/// `n_tp` targets out to `risk_reward` times that distance.
#[derive(Debug, Clone)]
pub struct MultiLevelAtr {
    atr: IndicatorHandle,
    multiplier: f64,
    risk_reward: f64,
    n_tp: usize,
    n_sl: usize,
}

impl MultiLevelAtr {
    pub fn new(
        atr: IndicatorHandle,
        multiplier: f64,
        risk_reward: f64,
        n_tp: usize,
        n_sl: usize,
    ) -> Result<Self, TpSlError> {
        if n_tp == 0 || n_sl == 0 {
            return Err(TpSlError::InvalidLevels {
                model: "multi_level_atr",
                reason: format!("need at least one level of each kind, got {n_tp} TP / {n_sl} SL"),
            });
        }
        Ok(Self {
            atr,
            multiplier: check_multiplier("multi_level_atr", multiplier)?,
            risk_reward: check_multiplier("multi_level_atr", risk_reward)?,
            n_tp,
            n_sl,
        })
    }
}

impl TpSlModel for MultiLevelAtr {
    fn name(&self) -> &str {
        "multi_level_atr"
    }

    fn levels(&self, direction: Direction, market: &MarketView<'_>) -> Result<ExitPlan, TpSlError> {
        let close = latest_close("multi_level_atr", market)?;
        let risk = latest_atr("multi_level_atr", self.atr, market)? * self.multiplier;
        let sign = direction.sign();
        let furthest_sl = close - sign * risk;
        if furthest_sl <= 0.0 {
            return Err(TpSlError::InvalidLevels {
                model: "multi_level_atr",
                reason: format!("furthest stop {furthest_sl:.4} is not a positive price"),
            });
        }

        let mut plan = ExitPlan::new();
        let sl_weight = 1.0 / self.n_sl as f64;
        for i in 1..=self.n_sl {
            let step = risk * i as f64 / self.n_sl as f64;
            plan = plan.stop_loss(close - sign * step, sl_weight);
        }
        let tp_weight = 1.0 / self.n_tp as f64;
        let reward = risk * self.risk_reward;
        for i in 1..=self.n_tp {
            let step = reward * i as f64 / self.n_tp as f64;
            plan = plan.take_profit(close + sign * step, tp_weight);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{make_bars, Window};
    use crate::domain::Bar;
    use crate::engine::IndicatorBinder;

    fn with_atr(bars: &[Bar], value: f64) -> (IndicatorBinder, IndicatorHandle) {
        let mut binder = IndicatorBinder::default();
        let h = binder
            .register(bars, "atr", move |b| vec![value; b.len()])
            .unwrap();
        (binder, h)
    }

    #[test]
    fn atr_risk_reward_places_one_level_each() {
        let bars = make_bars(&[100.0, 100.0]);
        let (binder, h) = with_atr(&bars, 2.0);
        let market = MarketView::new(Window::new(&bars), &binder);
        let model = AtrRiskReward::new(h, 3.0, 2.0).unwrap();

        let long = model.levels(Direction::Long, &market).unwrap();
        assert_eq!(long, ExitPlan::single(Some(94.0), Some(112.0)));
        let short = model.levels(Direction::Short, &market).unwrap();
        assert_eq!(short, ExitPlan::single(Some(106.0), Some(88.0)));
    }

    #[test]
    fn nan_atr_is_not_ready() {
        let bars = make_bars(&[100.0]);
        let (binder, h) = with_atr(&bars, f64::NAN);
        let market = MarketView::new(Window::new(&bars), &binder);
        let model = AtrRiskReward::new(h, 3.0, 2.0).unwrap();
        assert!(matches!(
            model.levels(Direction::Long, &market),
            Err(TpSlError::NotReady { bar: 0, .. })
        ));
    }

    #[test]
    fn pivots_known_values() {
        let p = Pivots::from_hlc(110.0, 90.0, 100.0);
        assert_eq!(p.pp, 100.0);
        assert_eq!(p.r1, 110.0);
        assert_eq!(p.r2, 120.0);
        assert_eq!(p.s1, 90.0);
        assert_eq!(p.s2, 80.0);
    }

    #[test]
    fn pivot_levels_bracket_the_close() {
        // make_bars: last bar open 100, close 100, high 101, low 99.
        let bars = make_bars(&[100.0, 100.0]);
        let binder = IndicatorBinder::default();
        let market = MarketView::new(Window::new(&bars), &binder);

        let long = PivotPoints.levels(Direction::Long, &market).unwrap();
        assert!((long.stop_losses[0].price - 98.5).abs() < 1e-9);
        assert!((long.take_profits[0].price - 101.5).abs() < 1e-9);
        let short = PivotPoints.levels(Direction::Short, &market).unwrap();
        assert!((short.stop_losses[0].price - 101.5).abs() < 1e-9);
    }

    #[test]
    fn pivot_rejects_inverted_levels() {
        // A zero-range bar collapses every pivot onto the close.
        let mut bars = make_bars(&[100.0, 100.0]);
        bars[1].high = 100.0;
        bars[1].low = 100.0;
        let binder = IndicatorBinder::default();
        let market = MarketView::new(Window::new(&bars), &binder);
        for direction in [Direction::Long, Direction::Short] {
            assert!(matches!(
                PivotPoints.levels(direction, &market),
                Err(TpSlError::InvalidLevels { .. })
            ));
        }
    }

    fn with_psar_and_atr(
        bars: &[Bar],
        psar: Vec<f64>,
        atr: f64,
    ) -> (IndicatorBinder, PsarRiskReward) {
        let mut binder = IndicatorBinder::default();
        let p = binder
            .register(bars, "psar", move |b| psar[..b.len()].to_vec())
            .unwrap();
        let a = binder
            .register(bars, "atr", move |b| vec![atr; b.len()])
            .unwrap();
        (binder, PsarRiskReward::new(p, a, 1.5).unwrap())
    }

    #[test]
    fn psar_stop_uses_previous_bar() {
        let bars = make_bars(&[100.0, 100.0, 100.0]);
        let (binder, model) = with_psar_and_atr(&bars, vec![f64::NAN, 96.0, 90.0], 2.0);
        let market = MarketView::new(Window::new(&bars), &binder);

        // min(96, 100 - 3, 99.99) = 96, risk 4
        let long = model.levels(Direction::Long, &market).unwrap();
        assert_eq!(long, ExitPlan::single(Some(96.0), Some(106.0)));
        // max(96, 103, 100.01) = 103, risk 3
        let short = model.levels(Direction::Short, &market).unwrap();
        assert_eq!(short, ExitPlan::single(Some(103.0), Some(95.5)));
    }

    #[test]
    fn psar_falls_back_to_one_percent() {
        let bars = make_bars(&[100.0, 100.0, 100.0]);
        // 1.5 * 100 ATR pushes the long stop below zero and the short target below zero
        let (binder, model) = with_psar_and_atr(&bars, vec![f64::NAN, 96.0, 96.0], 100.0);
        let market = MarketView::new(Window::new(&bars), &binder);

        let long = model.levels(Direction::Long, &market).unwrap();
        assert!((long.stop_losses[0].price - 99.0).abs() < 1e-9);
        assert!((long.take_profits[0].price - 101.0).abs() < 1e-9);
        let short = model.levels(Direction::Short, &market).unwrap();
        assert!((short.stop_losses[0].price - 101.0).abs() < 1e-9);
        assert!((short.take_profits[0].price - 99.0).abs() < 1e-9);
    }

    #[test]
    fn psar_needs_a_previous_value() {
        let bars = make_bars(&[100.0, 100.0]);
        let (binder, model) = with_psar_and_atr(&bars, vec![f64::NAN, 96.0], 2.0);
        let market = MarketView::new(Window::new(&bars), &binder);
        assert!(matches!(
            model.levels(Direction::Long, &market),
            Err(TpSlError::NotReady { bar: 1, .. })
        ));

        let one = make_bars(&[100.0]);
        let (binder, model) = with_psar_and_atr(&one, vec![96.0], 2.0);
        let market = MarketView::new(Window::new(&one), &binder);
        assert!(model.levels(Direction::Short, &market).is_err());
    }

    #[test]
    fn psar_register_validates_params() {
        let bars = make_bars(&[100.0; 20]);
        let mut binder = IndicatorBinder::default();
        let mut trailing = None;
        let mut ctx = InitContext::new(&bars, &mut binder, &mut trailing);

        assert!(matches!(
            PsarRiskReward::register(&mut ctx, 0.2, 0.02, 0.1, 1.5),
            Err(TpSlError::Params(IndicatorError::InvalidAcceleration { .. }))
        ));
        assert!(matches!(
            PsarRiskReward::register(&mut ctx, 0.02, 0.02, 0.2, 0.0),
            Err(TpSlError::Params(IndicatorError::InvalidMultiplier { .. }))
        ));
        let model = PsarRiskReward::register(&mut ctx, 0.02, 0.02, 0.2, 2.0).unwrap();
        assert_eq!(model.name(), "psar_risk_reward");
    }

    #[test]
    fn multi_level_spacing_and_weights() {
        let bars = make_bars(&[100.0, 100.0]);
        let (binder, h) = with_atr(&bars, 1.0);
        let market = MarketView::new(Window::new(&bars), &binder);
        let model = MultiLevelAtr::new(h, 4.0, 2.0, 4, 2).unwrap();

        let plan = model.levels(Direction::Long, &market).unwrap();
        let sl: Vec<f64> = plan.stop_losses.iter().map(|l| l.price).collect();
        let tp: Vec<f64> = plan.take_profits.iter().map(|l| l.price).collect();
        assert_eq!(sl, vec![98.0, 96.0]);
        assert_eq!(tp, vec![102.0, 104.0, 106.0, 108.0]);
        assert!(plan.take_profits.iter().all(|l| l.weight == 0.25));
        assert!(plan.stop_losses.iter().all(|l| l.weight == 0.5));
    }

    #[test]
    fn multi_level_needs_levels() {
        let bars = make_bars(&[100.0]);
        let (_, h) = with_atr(&bars, 1.0);
        assert!(MultiLevelAtr::new(h, 3.0, 2.0, 0, 1).is_err());
        assert!(MultiLevelAtr::new(h, 0.0, 2.0, 1, 1).is_err());
    }
}
