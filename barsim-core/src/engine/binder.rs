//! Indicator binder: computes every registered indicator once over the full
//! history, then hands out views truncated at the visible window.
//!
//! With [`LookaheadCheck::Probe`] each registration is recomputed on a few
//! truncated prefixes; any value that differs from the full-history result
//! means the indicator peeked at later bars and registration fails.

use crate::components::indicator::{first_valid_index, Indicator};
use crate::data::SeriesError;
use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum BinderError {
    #[error("indicator '{0}' is already registered")]
    Duplicate(String),

    #[error("indicator '{name}' produced {got} values for {expected} bars")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("indicator '{name}' uses future data: value at bar {bar} changes when later bars are removed")]
    LookAhead { name: String, bar: usize },

    #[error("unknown indicator handle {0}")]
    UnknownHandle(usize),
}

/// Opaque reference to a registered indicator series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndicatorHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookaheadCheck {
    Off,
    /// Recompute on `points` evenly spaced prefixes.
    Probe { points: usize },
}

impl Default for LookaheadCheck {
    fn default() -> Self {
        Self::Probe { points: 3 }
    }
}

#[derive(Debug, Clone)]
struct BoundSeries {
    name: String,
    values: Vec<f64>,
    first_valid: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorBinder {
    series: Vec<BoundSeries>,
    check: LookaheadCheck,
}

impl IndicatorBinder {
    pub fn new(check: LookaheadCheck) -> Self {
        Self {
            series: Vec::new(),
            check,
        }
    }

    /// Register an arbitrary full-history computation under `name`.
    pub fn register<F>(
        &mut self,
        bars: &[Bar],
        name: impl Into<String>,
        compute: F,
    ) -> Result<IndicatorHandle, BinderError>
    where
        F: Fn(&[Bar]) -> Vec<f64>,
    {
        let name = name.into();
        if self.series.iter().any(|s| s.name == name) {
            return Err(BinderError::Duplicate(name));
        }

        let values = compute(bars);
        if values.len() != bars.len() {
            return Err(BinderError::LengthMismatch {
                name,
                expected: bars.len(),
                got: values.len(),
            });
        }

        if let LookaheadCheck::Probe { points } = self.check {
            probe_prefixes(&name, bars, &values, points, &compute)?;
        }

        let first_valid = first_valid_index(&values);
        debug!(indicator = %name, ?first_valid, "indicator registered");
        self.series.push(BoundSeries {
            name,
            values,
            first_valid,
        });
        Ok(IndicatorHandle(self.series.len() - 1))
    }

    pub fn register_indicator(
        &mut self,
        bars: &[Bar],
        indicator: &dyn Indicator,
    ) -> Result<IndicatorHandle, BinderError> {
        self.register(bars, indicator.name(), |b| indicator.compute(b))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn name(&self, handle: IndicatorHandle) -> Option<&str> {
        self.series.get(handle.0).map(|s| s.name.as_str())
    }

    /// First bar index at which every registered series has a value.
    /// A series that is NaN throughout pushes warm-up past the end (`bar_count`).
    pub fn warmup(&self, bar_count: usize) -> usize {
        self.series
            .iter()
            .map(|s| s.first_valid.unwrap_or(bar_count))
            .max()
            .unwrap_or(0)
    }

    /// View of a series truncated at `visible_len` bars.
    pub fn view(
        &self,
        handle: IndicatorHandle,
        visible_len: usize,
    ) -> Result<IndicatorView<'_>, BinderError> {
        let series = self
            .series
            .get(handle.0)
            .ok_or(BinderError::UnknownHandle(handle.0))?;
        let end = visible_len.min(series.values.len());
        Ok(IndicatorView {
            values: &series.values[..end],
        })
    }
}

fn probe_prefixes<F>(
    name: &str,
    bars: &[Bar],
    full: &[f64],
    points: usize,
    compute: &F,
) -> Result<(), BinderError>
where
    F: Fn(&[Bar]) -> Vec<f64>,
{
    let n = bars.len();
    for k in 1..=points {
        let cut = n * k / (points + 1);
        if cut == 0 || cut >= n {
            continue;
        }
        let prefix = compute(&bars[..cut]);
        for (bar, (p, f)) in prefix.iter().zip(full).enumerate().take(cut) {
            let same = p.to_bits() == f.to_bits() || (p.is_nan() && f.is_nan());
            if !same {
                return Err(BinderError::LookAhead {
                    name: name.to_string(),
                    bar,
                });
            }
        }
    }
    Ok(())
}

/// Indicator values up to and including the current bar.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorView<'a> {
    values: &'a [f64],
}

impl<'a> IndicatorView<'a> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same offset convention as [`Window::bar_at`](crate::data::Window::bar_at).
    pub fn at(&self, offset: isize) -> Result<f64, SeriesError> {
        let len = self.values.len();
        let index = if offset < 0 {
            len.checked_sub(offset.unsigned_abs())
        } else {
            Some(offset as usize).filter(|&i| i < len)
        };
        index
            .map(|i| self.values[i])
            .ok_or(SeriesError::OutOfWindow { offset, len })
    }

    /// Latest value, NaN when nothing is visible yet.
    pub fn latest(&self) -> f64 {
        self.values.last().copied().unwrap_or(f64::NAN)
    }

    pub fn as_slice(&self) -> &'a [f64] {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::make_bars;
    use crate::indicators::Sma;

    fn closes() -> Vec<f64> {
        (0..20).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn view_is_truncated_at_window() {
        let bars = make_bars(&closes());
        let mut binder = IndicatorBinder::new(LookaheadCheck::default());
        let h = binder
            .register_indicator(&bars, &Sma::new(3).unwrap())
            .unwrap();

        let view = binder.view(h, 5).unwrap();
        assert_eq!(view.len(), 5);
        assert_eq!(view.latest(), 103.0);
        assert_eq!(view.at(-2).unwrap(), 102.0);
        assert!(view.at(5).is_err());
        assert_eq!(binder.warmup(bars.len()), 2);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let bars = make_bars(&closes());
        let mut binder = IndicatorBinder::default();
        binder.register(&bars, "x", |b| vec![1.0; b.len()]).unwrap();
        assert_eq!(
            binder.register(&bars, "x", |b| vec![1.0; b.len()]),
            Err(BinderError::Duplicate("x".into()))
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        let bars = make_bars(&closes());
        let mut binder = IndicatorBinder::default();
        let err = binder.register(&bars, "short", |b| vec![0.0; b.len() - 1]);
        assert!(matches!(err, Err(BinderError::LengthMismatch { got: 19, .. })));
    }

    #[test]
    fn future_peeking_series_is_detected() {
        let bars = make_bars(&closes());
        let mut binder = IndicatorBinder::new(LookaheadCheck::Probe { points: 3 });
        // Next bar's close: value at t depends on bar t + 1.
        let peek = |b: &[Bar]| -> Vec<f64> {
            (0..b.len())
                .map(|i| b.get(i + 1).map_or(f64::NAN, |n| n.close))
                .collect()
        };
        let err = binder.register(&bars, "peek", peek).unwrap_err();
        assert!(matches!(err, BinderError::LookAhead { .. }));

        let mut unchecked = IndicatorBinder::new(LookaheadCheck::Off);
        assert!(unchecked.register(&bars, "peek", peek).is_ok());
    }

    #[test]
    fn all_nan_series_pushes_warmup_to_end() {
        let bars = make_bars(&closes());
        let mut binder = IndicatorBinder::default();
        binder
            .register(&bars, "never", |b| vec![f64::NAN; b.len()])
            .unwrap();
        assert_eq!(binder.warmup(bars.len()), bars.len());
    }
}
