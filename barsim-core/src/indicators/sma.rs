//! Simple Moving Average of closes. First valid value at index `period - 1`.

use crate::components::indicator::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("SMA", period, 1)?;
        Ok(Self {
            period,
            name: format!("sma_{period}"),
        })
    }
}

/// Rolling mean over `values`, NaN until `period` values are available.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        rolling_mean(&super::closes(bars), self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::make_bars;
    use crate::indicators::assert_approx;

    #[test]
    fn sma_known_values() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let out = Sma::new(3).unwrap().compute(&bars);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_approx(out[2], 11.0);
        assert_approx(out[3], 12.0);
        assert_approx(out[4], 13.0);
    }

    #[test]
    fn sma_shorter_series_is_all_nan() {
        let bars = make_bars(&[10.0, 11.0]);
        assert!(Sma::new(5).unwrap().compute(&bars).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_zero_period_fails() {
        assert!(Sma::new(0).is_err());
    }
}
