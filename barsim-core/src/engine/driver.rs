//! Strategy driver: the bar-by-bar loop.
//!
//! Per bar:
//! 1. Advance the window by one bar
//! 2. Match eligible orders against the bar (broker)
//! 3. Update running extremes, then let the trailing model move stops
//! 4. Mark equity at the close; liquidate and stop if it is exhausted
//! 5. Call `Strategy::next` once warm-up is over
//!
//! Orders submitted in step 5 are first matched on the next bar. After the
//! last bar, remaining trades are settled at the final close.

use super::binder::IndicatorBinder;
use super::broker::{Broker, BrokerRecord};
use super::config::EngineConfig;
use super::error::EngineError;
use super::market::MarketView;
use crate::components::TrailingModel;
use crate::data::BarSeries;
use crate::domain::Bar;
use crate::strategy::{InitContext, Strategy, StrategyContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Account state at one bar's close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
    /// Signed net units held.
    pub position: f64,
}

/// Everything a run produced, before any statistics.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub symbol: String,
    pub strategy: String,
    /// One point per bar of the series.
    pub equity_curve: Vec<EquityPoint>,
    pub record: BrokerRecord,
    /// First bar on which `next` was called.
    pub warmup: usize,
    /// Bar at which the account was liquidated, if it was.
    pub liquidated_at: Option<usize>,
}

/// Run `strategy` over the whole of `series`.
///
/// The series cursor is not touched: the driver works on its own rewound copy.
pub fn run(
    series: &BarSeries,
    strategy: &mut dyn Strategy,
    config: &EngineConfig,
) -> Result<RunOutput, EngineError> {
    let mut broker = Broker::new(config.clone())?;
    let mut series = series.clone();
    series.rewind();
    let len = series.len();

    let mut binder = IndicatorBinder::new(config.lookahead_check);
    let mut trailing: Option<Box<dyn TrailingModel>> = None;
    strategy.init(&mut InitContext::new(
        series.full(),
        &mut binder,
        &mut trailing,
    ))?;

    let warmup = binder.warmup(len);
    if warmup >= len {
        return Err(EngineError::InsufficientData { warmup, len });
    }
    info!(
        strategy = strategy.name(),
        symbol = series.symbol(),
        bars = len,
        warmup,
        indicators = binder.len(),
        "run started"
    );

    let mut equity_curve = Vec::with_capacity(len);
    let mut liquidated_at = None;

    while series.advance() {
        let t = series.visible_len() - 1;
        let bar = series.full()[t];

        broker.process_bar(t, &bar)?;
        broker.mark_extremes(bar.close);
        let market = MarketView::new(series.window(), &binder);
        if let Some(model) = trailing.as_deref() {
            broker.apply_trailing(model, &market, bar.timestamp)?;
        }
        let liquidated = broker.liquidate_if_bankrupt(t, &bar)?;
        broker.verify_accounts(t)?;
        notify_closed(&mut broker, strategy);
        equity_curve.push(equity_point(t, &bar, &broker));

        if liquidated {
            liquidated_at = Some(t);
            break;
        }
        if t >= warmup {
            strategy.next(&mut StrategyContext::new(market, &bar, &mut broker))?;
        }
    }

    match liquidated_at {
        Some(t) => {
            // Flat and out of cash: the curve holds its last value.
            let last = equity_curve[equity_curve.len() - 1];
            for (i, bar) in series.full().iter().enumerate().skip(t + 1) {
                equity_curve.push(EquityPoint {
                    bar_index: i,
                    timestamp: bar.timestamp,
                    ..last
                });
            }
        }
        None => {
            let t = len - 1;
            let bar = series.full()[t];
            broker.finish(t, &bar)?;
            broker.verify_accounts(t)?;
            notify_closed(&mut broker, strategy);
            if let Some(point) = equity_curve.last_mut() {
                *point = equity_point(t, &bar, &broker);
            }
        }
    }

    let record = broker.into_record();
    info!(
        strategy = strategy.name(),
        symbol = series.symbol(),
        trades = record.trades.len(),
        fills = record.fills.len(),
        warnings = record.warnings.len(),
        final_equity = equity_curve.last().map_or(config.cash, |p| p.equity),
        "run finished"
    );
    Ok(RunOutput {
        symbol: series.symbol().to_string(),
        strategy: strategy.name().to_string(),
        equity_curve,
        record,
        warmup,
        liquidated_at,
    })
}

fn equity_point(bar_index: usize, bar: &Bar, broker: &Broker) -> EquityPoint {
    EquityPoint {
        bar_index,
        timestamp: bar.timestamp,
        equity: broker.equity(bar.close),
        cash: broker.ledger().cash(),
        position: broker.ledger().net_size(),
    }
}

fn notify_closed(broker: &mut Broker, strategy: &mut dyn Strategy) {
    for id in broker.take_closed() {
        if let Some(trade) = broker.ledger().trade(id) {
            strategy.on_trade_closed(trade);
        }
    }
}
