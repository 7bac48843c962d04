//! Shared helpers for the integration tests.
#![allow(dead_code)]

use barsim_core::data::BarSeries;
use barsim_core::domain::Bar;
use barsim_core::strategy::{InitContext, Strategy, StrategyContext, StrategyError};
use chrono::{Duration, TimeZone, Utc};

/// Daily bars from `(open, high, low, close)` rows starting 2024-01-01.
pub fn bars(rows: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    rows.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: start + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        })
        .collect()
}

pub fn series(rows: &[(f64, f64, f64, f64)]) -> BarSeries {
    BarSeries::new("TEST", bars(rows)).unwrap()
}

/// A bar that opens and closes at `price` with a one-point range.
pub fn flat(price: f64) -> (f64, f64, f64, f64) {
    (price, price + 1.0, price - 1.0, price)
}

type Script = Box<dyn FnMut(&mut StrategyContext<'_>) -> Result<(), StrategyError> + Send>;
type Setup = Box<dyn FnMut(&mut InitContext<'_>) -> Result<(), StrategyError> + Send>;

/// Strategy driven by closures, for scenario tests.
pub struct Scripted {
    setup: Option<Setup>,
    step: Script,
    pub closed: Vec<f64>,
}

pub fn scripted<F>(step: F) -> Scripted
where
    F: FnMut(&mut StrategyContext<'_>) -> Result<(), StrategyError> + Send + 'static,
{
    Scripted {
        setup: None,
        step: Box::new(step),
        closed: Vec::new(),
    }
}

impl Scripted {
    pub fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: FnMut(&mut InitContext<'_>) -> Result<(), StrategyError> + Send + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn init(&mut self, ctx: &mut InitContext<'_>) -> Result<(), StrategyError> {
        match self.setup.as_mut() {
            Some(setup) => setup(ctx),
            None => Ok(()),
        }
    }

    fn next(&mut self, ctx: &mut StrategyContext<'_>) -> Result<(), StrategyError> {
        (self.step)(ctx)
    }

    fn on_trade_closed(&mut self, trade: &barsim_core::domain::Trade) {
        self.closed.push(trade.net_pnl());
    }
}
