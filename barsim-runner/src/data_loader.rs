//! Canonical OHLCV CSV loading.
//!
//! Expected header: `timestamp,open,high,low,close,volume` (`date` is accepted
//! for the first column). Timestamps are RFC 3339 or plain `YYYY-MM-DD` dates
//! taken as midnight UTC. Rows are sorted by time and the first row wins for a
//! duplicated timestamp. Any missing or non-numeric field fails the load.

use barsim_core::data::{BarSeries, SeriesError};
use barsim_core::domain::Bar;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open '{path}': {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: unrecognized timestamp '{value}' (expected RFC 3339 or YYYY-MM-DD)")]
    Timestamp { row: usize, value: String },

    #[error(transparent)]
    Series(#[from] SeriesError),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Serialize)]
struct CsvOut {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load a CSV file. The symbol defaults to the file stem.
pub fn load_csv(path: &Path, symbol: Option<&str>) -> Result<BarSeries, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let symbol = symbol
        .map(str::to_owned)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "UNKNOWN".to_string());
    read_bars(file, &symbol)
}

/// Parse bars from any reader and canonicalize them into a series.
pub fn read_bars<R: io::Read>(reader: R, symbol: &str) -> Result<BarSeries, LoadError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (i, record) in csv.deserialize::<CsvRow>().enumerate() {
        let row = record?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
            row: i + 1,
            value: row.timestamp.clone(),
        })?;
        bars.push(Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    let rows = bars.len();
    let series = BarSeries::from_rows(symbol, bars)?;
    let dropped = rows - series.len();
    if dropped > 0 {
        warn!(symbol, dropped, "duplicate timestamps dropped, first row kept");
    }
    info!(symbol, bars = series.len(), "loaded bars");
    Ok(series)
}

/// Write bars in the format [`read_bars`] accepts.
pub fn write_bars<W: io::Write>(writer: W, bars: &[Bar]) -> Result<(), LoadError> {
    let mut csv = csv::Writer::from_writer(writer);
    for bar in bars {
        csv.serialize(CsvOut {
            timestamp: bar.timestamp.to_rfc3339(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })?;
    }
    csv.flush().map_err(|e| LoadError::Csv(e.into()))?;
    Ok(())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
