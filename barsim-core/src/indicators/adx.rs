//! Average Directional Index (Wilder).
//!
//! +DM/-DM and TR are Wilder-smoothed into +DI/-DI, DX = 100 |+DI - -DI| / (+DI + -DI),
//! and ADX is the Wilder-smoothed DX. First valid value at index `2 * period - 1`.

use crate::components::indicator::{check_period, Indicator, IndicatorError};
use crate::domain::Bar;
use crate::indicators::atr::{true_range, wilder_smooth};

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        let period = check_period("ADX", period, 1)?;
        Ok(Self {
            period,
            name: format!("adx_{period}"),
        })
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];
        for i in 1..n {
            let up = bars[i].high - bars[i - 1].high;
            let down = bars[i - 1].low - bars[i].low;
            plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
            minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
        }

        let tr = wilder_smooth(&true_range(bars), self.period);
        let plus = wilder_smooth(&plus_dm, self.period);
        let minus = wilder_smooth(&minus_dm, self.period);

        let dx: Vec<f64> = (0..n)
            .map(|i| {
                if tr[i].is_nan() || tr[i] == 0.0 {
                    return f64::NAN;
                }
                let plus_di = 100.0 * plus[i] / tr[i];
                let minus_di = 100.0 * minus[i] / tr[i];
                let sum = plus_di + minus_di;
                if sum == 0.0 {
                    0.0
                } else {
                    100.0 * (plus_di - minus_di).abs() / sum
                }
            })
            .collect();

        wilder_smooth(&dx, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::make_bars;

    #[test]
    fn adx_is_bounded_and_warms_up() {
        let closes: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.3)
            .collect();
        let bars = make_bars(&closes);
        let adx = Adx::new(5).unwrap();
        let out = adx.compute(&bars);
        assert!(out[..adx.lookback()].iter().all(|v| v.is_nan()));
        assert!(!out[adx.lookback()].is_nan());
        assert!(out[adx.lookback()..]
            .iter()
            .all(|&v| (0.0..=100.0).contains(&v)));
    }

    #[test]
    fn steady_trend_has_high_adx() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + 2.0 * i as f64).collect();
        let out = Adx::new(5).unwrap().compute(&make_bars(&closes));
        assert!(out[29] > 50.0, "adx was {}", out[29]);
    }
}
