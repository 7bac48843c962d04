//! Concrete indicator implementations.
//!
//! All implement [`Indicator`](crate::components::Indicator). Multi-series
//! indicators (Donchian) are exposed as one instance per band.

pub mod adx;
pub mod atr;
pub mod donchian;
pub mod ema;
pub mod parabolic_sar;
pub mod rsi;
pub mod sma;
pub mod std_dev;

pub use adx::Adx;
pub use atr::Atr;
pub use donchian::{Donchian, DonchianBand};
pub use ema::Ema;
pub use parabolic_sar::ParabolicSar;
pub use rsi::Rsi;
pub use sma::Sma;
pub use std_dev::StdDev;

use crate::domain::Bar;

pub(crate) fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Sample standard deviation (n - 1 denominator). NaN for fewer than 2 values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_std_known_value() {
        // mean 5, squared deviations sum 32, / 7
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_approx(sample_std(&v), (32.0_f64 / 7.0).sqrt());
        assert!(sample_std(&[1.0]).is_nan());
    }
}
