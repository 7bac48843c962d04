//! Bar series with a look-ahead-free window cursor.
//!
//! The full history is held once (shared `Arc<[Bar]>`, cheap to clone per run).
//! Strategy-facing reads go through [`Window`], which only ever covers
//! `[0..=current]`.

use crate::domain::Bar;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("bar series for '{0}' is empty")]
    Empty(String),

    #[error("timestamp at bar {index} ({timestamp}) does not increase on the previous bar")]
    NonIncreasing {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("bar {index} has non-finite or inconsistent OHLCV values")]
    InsaneBar { index: usize },

    #[error("offset {offset} is outside the visible window of {len} bars")]
    OutOfWindow { offset: isize, len: usize },
}

/// Ordered OHLCV history for one instrument plus the current window position.
#[derive(Debug, Clone)]
pub struct BarSeries {
    symbol: String,
    bars: Arc<[Bar]>,
    visible: usize,
}

impl BarSeries {
    /// Build from already-ordered bars. Validates ordering and bar sanity.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, SeriesError> {
        let symbol = symbol.into();
        if bars.is_empty() {
            return Err(SeriesError::Empty(symbol));
        }
        for (index, bar) in bars.iter().enumerate() {
            if !bar.is_sane() {
                return Err(SeriesError::InsaneBar { index });
            }
            if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
                return Err(SeriesError::NonIncreasing {
                    index,
                    timestamp: bar.timestamp,
                });
            }
        }
        Ok(Self {
            symbol,
            bars: bars.into(),
            visible: 0,
        })
    }

    /// Canonicalize raw rows (stable sort, keep the first row per timestamp), then validate.
    pub fn from_rows(symbol: impl Into<String>, mut rows: Vec<Bar>) -> Result<Self, SeriesError> {
        rows.sort_by_key(|b| b.timestamp);
        rows.dedup_by_key(|b| b.timestamp);
        Self::new(symbol, rows)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Make the next bar visible. Returns false once the whole series is visible.
    pub fn advance(&mut self) -> bool {
        if self.visible >= self.bars.len() {
            return false;
        }
        self.visible += 1;
        true
    }

    /// Hide every bar again, ready for a fresh run.
    pub fn rewind(&mut self) {
        self.visible = 0;
    }

    /// Index of the latest visible bar; `None` before the first `advance`.
    pub fn current_index(&self) -> Option<usize> {
        self.visible.checked_sub(1)
    }

    pub fn visible_len(&self) -> usize {
        self.visible
    }

    pub fn window(&self) -> Window<'_> {
        Window {
            bars: &self.bars[..self.visible],
        }
    }

    /// Same as `window().bar_at(offset)`.
    pub fn bar_at(&self, offset: isize) -> Result<&Bar, SeriesError> {
        self.window().bar_at(offset)
    }

    /// Complete history, including bars not yet visible. Strategies only
    /// ever see a [`Window`]; this is for the engine and for reporting.
    pub fn full(&self) -> &[Bar] {
        &self.bars
    }
}

/// Read-only view over the visible prefix of a series.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    bars: &'a [Bar],
}

impl<'a> Window<'a> {
    pub fn new(bars: &'a [Bar]) -> Self {
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Negative offsets count back from the latest bar (-1 is the latest);
    /// non-negative offsets index from the start of the window.
    pub fn bar_at(&self, offset: isize) -> Result<&'a Bar, SeriesError> {
        let len = self.bars.len();
        let index = if offset < 0 {
            len.checked_sub(offset.unsigned_abs())
        } else {
            Some(offset as usize).filter(|&i| i < len)
        };
        index
            .and_then(|i| self.bars.get(i))
            .ok_or(SeriesError::OutOfWindow { offset, len })
    }

    pub fn latest(&self) -> Option<&'a Bar> {
        self.bars.last()
    }

    pub fn open(&self, offset: isize) -> Result<f64, SeriesError> {
        self.bar_at(offset).map(|b| b.open)
    }

    pub fn high(&self, offset: isize) -> Result<f64, SeriesError> {
        self.bar_at(offset).map(|b| b.high)
    }

    pub fn low(&self, offset: isize) -> Result<f64, SeriesError> {
        self.bar_at(offset).map(|b| b.low)
    }

    pub fn close(&self, offset: isize) -> Result<f64, SeriesError> {
        self.bar_at(offset).map(|b| b.close)
    }

    pub fn volume(&self, offset: isize) -> Result<f64, SeriesError> {
        self.bar_at(offset).map(|b| b.volume)
    }

    /// The last `n` closes (fewer if the window is shorter), oldest first.
    pub fn closes(&self, n: usize) -> Vec<f64> {
        let start = self.bars.len().saturating_sub(n);
        self.bars[start..].iter().map(|b| b.close).collect()
    }

    pub fn bars(&self) -> &'a [Bar] {
        self.bars
    }
}
