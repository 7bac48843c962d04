//! Parabolic SAR (Wilder).
//!
//! Sequential: the trend direction, extreme point and acceleration factor
//! carry from bar to bar. The first value lands at index 1, seeded from the
//! direction of the first two closes.

use crate::components::indicator::{Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct ParabolicSar {
    af_start: f64,
    af_step: f64,
    af_max: f64,
    name: String,
}

impl ParabolicSar {
    pub fn new(af_start: f64, af_step: f64, af_max: f64) -> Result<Self, IndicatorError> {
        let finite = af_start.is_finite() && af_step.is_finite() && af_max.is_finite();
        if !finite || af_start <= 0.0 || af_step <= 0.0 || af_max < af_start {
            return Err(IndicatorError::InvalidAcceleration {
                indicator: "PSAR",
                start: af_start,
                step: af_step,
                max: af_max,
            });
        }
        Ok(Self {
            af_start,
            af_step,
            af_max,
            name: format!("psar_{af_start}_{af_step}_{af_max}"),
        })
    }
}

impl Default for ParabolicSar {
    fn default() -> Self {
        Self {
            af_start: 0.02,
            af_step: 0.02,
            af_max: 0.2,
            name: "psar_0.02_0.02_0.2".to_string(),
        }
    }
}

impl Indicator for ParabolicSar {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut out = vec![f64::NAN; n];
        if n < 2 {
            return out;
        }

        let mut rising = bars[1].close >= bars[0].close;
        let mut af = self.af_start;
        let (mut sar, mut ep) = if rising {
            (bars[0].low, bars[1].high)
        } else {
            (bars[0].high, bars[1].low)
        };
        out[1] = sar;

        for i in 2..n {
            let bar = &bars[i];
            let mut next = sar + af * (ep - sar);
            if rising {
                // never above the two prior lows
                next = next.min(bars[i - 1].low).min(bars[i - 2].low);
                if bar.low < next {
                    rising = false;
                    next = ep;
                    ep = bar.low;
                    af = self.af_start;
                } else if bar.high > ep {
                    ep = bar.high;
                    af = (af + self.af_step).min(self.af_max);
                }
            } else {
                next = next.max(bars[i - 1].high).max(bars[i - 2].high);
                if bar.high > next {
                    rising = true;
                    next = ep;
                    ep = bar.high;
                    af = self.af_start;
                } else if bar.low < ep {
                    ep = bar.low;
                    af = (af + self.af_step).min(self.af_max);
                }
            }
            sar = next;
            out[i] = sar;
        }
        out
    }
}
