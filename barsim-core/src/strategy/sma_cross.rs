//! Moving-average crossover: long when the fast SMA crosses above the slow
//! one, short when it crosses below. Each cross closes the open position and
//! enters the other way with a fraction of available margin.

use super::{InitContext, Strategy, StrategyContext, StrategyError};
use crate::domain::OrderRequest;
use crate::engine::IndicatorHandle;
use crate::indicators::Sma;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmaCrossParams {
    pub fast: usize,
    pub slow: usize,
    /// Fraction in (0, 1) of available margin per entry.
    pub size_fraction: f64,
}

impl Default for SmaCrossParams {
    fn default() -> Self {
        Self {
            fast: 10,
            slow: 20,
            size_fraction: 0.95,
        }
    }
}

impl SmaCrossParams {
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.fast == 0 {
            return Err(StrategyError::Config("fast period must be >= 1".into()));
        }
        if self.fast >= self.slow {
            return Err(StrategyError::Config(format!(
                "fast period ({}) must be below slow period ({})",
                self.fast, self.slow
            )));
        }
        if !(self.size_fraction > 0.0 && self.size_fraction < 1.0) {
            return Err(StrategyError::Config(format!(
                "size_fraction must be in (0, 1), got {}",
                self.size_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SmaCross {
    params: SmaCrossParams,
    fast: Option<IndicatorHandle>,
    slow: Option<IndicatorHandle>,
}

impl SmaCross {
    pub fn new(params: SmaCrossParams) -> Result<Self, StrategyError> {
        params.validate()?;
        Ok(Self {
            params,
            fast: None,
            slow: None,
        })
    }

    pub fn params(&self) -> &SmaCrossParams {
        &self.params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cross {
    Up,
    Down,
}

fn crossed(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> Option<Cross> {
    if prev_fast <= prev_slow && fast > slow {
        Some(Cross::Up)
    } else if prev_fast >= prev_slow && fast < slow {
        Some(Cross::Down)
    } else {
        None
    }
}

impl Strategy for SmaCross {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), StrategyError> {
        self.fast = Some(ctx.register_indicator(&Sma::new(self.params.fast)?)?);
        self.slow = Some(ctx.register_indicator(&Sma::new(self.params.slow)?)?);
        Ok(())
    }

    fn next(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        let (Some(fast), Some(slow)) = (self.fast, self.slow) else {
            return Err(StrategyError::Config("next() called before init()".into()));
        };
        let fast = ctx.indicator(fast)?;
        let slow = ctx.indicator(slow)?;
        if fast.len() < 2 {
            return Ok(());
        }
        // NaN on the previous bar compares false, so no cross on the first valid bar.
        let cross = crossed(fast.at(-2)?, slow.at(-2)?, fast.latest(), slow.latest());
        let request = OrderRequest::equity_fraction(self.params.size_fraction);
        match cross {
            Some(Cross::Up) if !ctx.position().is_long() => {
                ctx.close_position();
                ctx.buy(request.tag("sma_cross_up"))?;
            }
            Some(Cross::Down) if !ctx.position().is_short() => {
                ctx.close_position();
                ctx.sell(request.tag("sma_cross_down"))?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_validated() {
        assert!(SmaCrossParams::default().validate().is_ok());
        let bad = SmaCrossParams {
            fast: 20,
            slow: 20,
            ..SmaCrossParams::default()
        };
        assert!(matches!(bad.validate(), Err(StrategyError::Config(_))));
        let bad = SmaCrossParams {
            size_fraction: 1.0,
            ..SmaCrossParams::default()
        };
        assert!(SmaCross::new(bad).is_err());
    }

    #[test]
    fn cross_detection() {
        assert_eq!(crossed(1.0, 2.0, 3.0, 2.0), Some(Cross::Up));
        assert_eq!(crossed(3.0, 2.0, 1.0, 2.0), Some(Cross::Down));
        assert_eq!(crossed(3.0, 2.0, 3.0, 2.0), None);
        assert_eq!(crossed(f64::NAN, 2.0, 3.0, 2.0), None);
    }
}
