//! Indicator trait.
//!
//! Indicators are pure functions: full bar history in, one value per bar out.
//! They are computed once per run by the indicator binder and exposed to the
//! strategy through a window that only reaches the current bar.

use crate::domain::Bar;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("{indicator} period must be >= {min}, got {period}")]
    InvalidPeriod {
        indicator: &'static str,
        period: usize,
        min: usize,
    },

    #[error("{indicator} multiplier must be finite and positive, got {value}")]
    InvalidMultiplier { indicator: &'static str, value: f64 },

    #[error("{indicator} acceleration needs 0 < start <= max and step > 0, got start {start}, step {step}, max {max}")]
    InvalidAcceleration {
        indicator: &'static str,
        start: f64,
        step: f64,
        max: f64,
    },
}

/// Reject periods below `min` at construction time.
pub fn check_period(
    indicator: &'static str,
    period: usize,
    min: usize,
) -> Result<usize, IndicatorError> {
    if period < min {
        return Err(IndicatorError::InvalidPeriod {
            indicator,
            period,
            min,
        });
    }
    Ok(period)
}

pub fn check_multiplier(indicator: &'static str, value: f64) -> Result<f64, IndicatorError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(IndicatorError::InvalidMultiplier { indicator, value });
    }
    Ok(value)
}

/// Trait for indicators.
///
/// `compute` receives the entire series and must return a vector of the same
/// length, `f64::NAN` during warm-up. Value `t` may depend only on bars `0..=t`;
/// the binder can verify this by recomputing on truncated prefixes.
pub trait Indicator: Send + Sync {
    /// Unique name within a run (e.g. "sma_20").
    fn name(&self) -> &str;

    /// Number of leading bars that are NaN.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Index of the first non-NaN value, if any.
pub fn first_valid_index(values: &[f64]) -> Option<usize> {
    values.iter().position(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_period_is_rejected() {
        assert_eq!(
            check_period("sma", 0, 1),
            Err(IndicatorError::InvalidPeriod {
                indicator: "sma",
                period: 0,
                min: 1
            })
        );
        assert_eq!(check_period("sma", 3, 1), Ok(3));
    }

    #[test]
    fn first_valid_skips_nan_prefix() {
        assert_eq!(first_valid_index(&[f64::NAN, f64::NAN, 1.0]), Some(2));
        assert_eq!(first_valid_index(&[f64::NAN]), None);
    }
}
