//! Average True Range with Wilder smoothing (alpha = 1/period).
//!
//! TR[t] = max(high - low, |high - close[t-1]|, |low - close[t-1]|).
//! TR[0] has no previous close and is treated as warm-up, so the first ATR
//! value lands at index `period`.

use crate::components::indicator::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("ATR", period, 1)?;
        Ok(Self {
            period,
            name: format!("atr_{period}"),
        })
    }
}

/// True range series; index 0 is NaN.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for i in 1..bars.len() {
        let (h, l, pc) = (bars[i].high, bars[i].low, bars[i - 1].close);
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    tr
}

/// Wilder smoothing. Seeds with the mean of the first `period` values after the
/// leading NaN run; a NaN after the seed poisons the rest of the output.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return out;
    };
    if period == 0 || start + period > n {
        return out;
    }
    let seed_window = &values[start..start + period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return out;
    }
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    out[start + period - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in start + period..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        wilder_smooth(&true_range(bars), self.period)
    }
}
