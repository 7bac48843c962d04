//! Relative Strength Index with Wilder-smoothed gains and losses.
//! avg_loss == 0 gives 100; first valid value at index `period`.

use crate::components::indicator::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("RSI", period, 1)?;
        Ok(Self {
            period,
            name: format!("rsi_{period}"),
        })
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut out = vec![f64::NAN; n];
        if n <= self.period {
            return out;
        }
        let p = self.period as f64;
        let change = |i: usize| bars[i].close - bars[i - 1].close;

        let (mut gain, mut loss) = (1..=self.period).fold((0.0, 0.0), |(g, l), i| {
            let c = change(i);
            (g + c.max(0.0), l + (-c).max(0.0))
        });
        gain /= p;
        loss /= p;
        out[self.period] = rsi_value(gain, loss);

        for i in self.period + 1..n {
            let c = change(i);
            gain = (gain * (p - 1.0) + c.max(0.0)) / p;
            loss = (loss * (p - 1.0) + (-c).max(0.0)) / p;
            out[i] = rsi_value(gain, loss);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::make_bars;

    #[test]
    fn rising_series_is_100() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        let out = Rsi::new(3).unwrap().compute(&bars);
        assert!(out[2].is_nan());
        assert!(out[3..].iter().all(|&v| v == 100.0));
    }

    #[test]
    fn rsi_is_bounded() {
        let bars = make_bars(&[10.0, 12.0, 11.0, 13.0, 9.0, 14.0, 12.0, 15.0]);
        let out = Rsi::new(3).unwrap().compute(&bars);
        assert!(out[3..].iter().all(|&v| (0.0..=100.0).contains(&v)));
    }
}
