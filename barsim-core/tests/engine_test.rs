//! End-to-end scenarios through the driver: fills, gaps, margin, exits,
//! netting, trailing and liquidation.

mod common;

use barsim_core::components::PercentTrailing;
use barsim_core::domain::{ExitPlan, ExitReason, OrderRequest, OrderStatus, TradeStatus};
use barsim_core::engine::{run, EngineConfig, WarningKind};
use common::{flat, scripted, series};

fn no_end_close() -> EngineConfig {
    EngineConfig {
        close_at_end: false,
        ..EngineConfig::default()
    }
}

#[test]
fn market_order_fills_at_next_open() {
    let s = series(&[
        (100.0, 101.0, 99.0, 100.0),
        (101.0, 102.0, 100.0, 101.5),
        (103.0, 104.0, 102.0, 103.0),
    ]);
    let mut strategy = scripted(|ctx| {
        if ctx.bar_index() == 0 {
            ctx.buy(OrderRequest::units(10.0))?;
        }
        Ok(())
    });
    let out = run(&s, &mut strategy, &EngineConfig::default()).unwrap();

    let fill = &out.record.fills[0];
    assert_eq!(fill.price, 101.0);
    assert_eq!(fill.bar_index, 1);
    let trade = &out.record.trades[0];
    assert_eq!(trade.entry_price, 101.0);
    assert_eq!(trade.exits[0].reason, ExitReason::EndOfData);
    assert_eq!(trade.exits[0].price, 103.0);
}

#[test]
fn limit_fills_at_boundary_only_when_touched() {
    let s = series(&[(100.0, 101.0, 99.0, 100.0), (100.0, 102.0, 98.0, 101.0)]);
    let mut strategy = scripted(|ctx| {
        if ctx.bar_index() == 0 {
            ctx.buy(OrderRequest::units(10.0).limit(99.0))?;
            ctx.buy(OrderRequest::units(10.0).limit(97.0))?;
        }
        Ok(())
    });
    let out = run(&s, &mut strategy, &no_end_close()).unwrap();

    let touched = &out.record.orders[0];
    assert_eq!(touched.status, OrderStatus::Filled);
    assert_eq!(touched.fill_price, Some(99.0));
    let missed = &out.record.orders[1];
    assert!(missed.fill_price.is_none());
    assert_eq!(missed.status, OrderStatus::Pending);
}

#[test]
fn stop_loss_gap_fills_at_open() {
    let s = series(&[flat(100.0), flat(100.0), (90.0, 91.0, 88.0, 89.0)]);
    let mut strategy = scripted(|ctx| {
        if ctx.bar_index() == 0 {
            ctx.buy(OrderRequest::units(10.0).stop_loss(95.0))?;
        }
        Ok(())
    });
    let out = run(&s, &mut strategy, &EngineConfig::default()).unwrap();

    let trade = &out.record.trades[0];
    assert_eq!(trade.status, TradeStatus::Closed);
    assert_eq!(trade.exits.len(), 1);
    assert_eq!(trade.exits[0].reason, ExitReason::StopLoss);
    assert_eq!(trade.exits[0].price, 90.0);
    assert_eq!(out.record.final_cash, 10_000.0 - 100.0);
}

#[test]
fn insufficient_margin_rejects_and_leaves_cash() {
    let s = series(&[flat(100.0), flat(100.0), flat(100.0)]);
    let mut strategy = scripted(|ctx| {
        if ctx.bar_index() == 0 {
            ctx.buy(OrderRequest::units(10.0))?;
        }
        Ok(())
    });
    let out = run(&s, &mut strategy, &EngineConfig::with_cash(100.0)).unwrap();

    assert!(out.record.trades.is_empty());
    assert!(out.record.fills.is_empty());
    assert_eq!(out.record.final_cash, 100.0);
    assert_eq!(out.record.warnings[0].kind, WarningKind::InsufficientMargin);
    assert!(matches!(
        out.record.orders[0].status,
        OrderStatus::Rejected { .. }
    ));
    assert!(out.equity_curve.iter().all(|p| p.equity == 100.0));
}

#[test]
fn stop_loss_wins_same_bar_tie() {
    let s = series(&[flat(100.0), flat(100.0), (100.0, 106.0, 94.0, 100.0)]);
    let mut strategy = scripted(|ctx| {
        if ctx.bar_index() == 0 {
            ctx.buy(OrderRequest::units(10.0).stop_loss(95.0).take_profit(105.0))?;
        }
        Ok(())
    });
    let out = run(&s, &mut strategy, &EngineConfig::default()).unwrap();

    let trade = &out.record.trades[0];
    assert_eq!(trade.exits.len(), 1);
    assert_eq!(trade.exits[0].reason, ExitReason::StopLoss);
    assert_eq!(trade.exits[0].price, 95.0);
    let filled = out
        .record
        .orders
        .iter()
        .filter(|o| o.status == OrderStatus::Filled)
        .count();
    // Entry and stop-loss only.
    assert_eq!(filled, 2);
}

#[test]
fn opposite_entry_nets_fifo() {
    let s = series(&[
        flat(100.0),
        flat(100.0),
        flat(102.0),
        flat(104.0),
        flat(104.0),
    ]);
    let mut strategy = scripted(|ctx| {
        match ctx.bar_index() {
            0 | 1 => {
                ctx.buy(OrderRequest::units(5.0))?;
            }
            2 => {
                ctx.sell(OrderRequest::units(7.0))?;
            }
            _ => {}
        }
        Ok(())
    });
    let out = run(&s, &mut strategy, &no_end_close()).unwrap();

    let trades = &out.record.trades;
    assert_eq!(trades.len(), 2);
    // Closed trades come first: the oldest was netted out completely.
    assert_eq!(trades[0].entry_price, 100.0);
    assert_eq!(trades[0].status, TradeStatus::Closed);
    assert_eq!(trades[0].exits[0].reason, ExitReason::Netting);
    assert_eq!(trades[0].exits[0].price, 104.0);
    assert_eq!(trades[1].entry_price, 102.0);
    assert_eq!(trades[1].remaining_size, 3.0);
    assert_eq!(out.equity_curve.last().unwrap().position, 3.0);
}

#[test]
fn hedging_keeps_opposite_trades_apart() {
    let s = series(&[flat(100.0), flat(100.0), flat(100.0), flat(100.0)]);
    let mut strategy = scripted(|ctx| {
        match ctx.bar_index() {
            0 => {
                ctx.buy(OrderRequest::units(5.0))?;
            }
            1 => {
                ctx.sell(OrderRequest::units(5.0))?;
            }
            _ => {}
        }
        Ok(())
    });
    let config = EngineConfig {
        hedging: true,
        ..no_end_close()
    };
    let out = run(&s, &mut strategy, &config).unwrap();
    assert_eq!(out.record.trades.len(), 2);
    assert!(out.record.trades.iter().all(|t| t.is_open()));
    assert_eq!(out.equity_curve.last().unwrap().position, 0.0);
}

#[test]
fn stop_trails_after_first_take_profit() {
    let s = series(&[
        flat(100.0),
        (100.0, 101.0, 99.0, 100.0),
        (104.0, 106.0, 103.0, 105.0),
        (106.0, 111.0, 105.0, 110.0),
        (110.0, 111.0, 108.0, 109.0),
        (105.0, 106.0, 103.0, 104.0),
        flat(104.0),
    ]);
    let mut strategy = scripted(|ctx| {
        if ctx.bar_index() == 0 {
            let plan = ExitPlan::new()
                .stop_loss(90.0, 1.0)
                .take_profit(105.0, 0.5)
                .take_profit(120.0, 0.5);
            ctx.buy(OrderRequest::units(10.0).exit_plan(plan))?;
        }
        Ok(())
    })
    .with_setup(|init| {
        init.set_trailing(Box::new(PercentTrailing::new(0.05)?));
        Ok(())
    });
    let out = run(&s, &mut strategy, &EngineConfig::default()).unwrap();

    let trade = &out.record.trades[0];
    assert_eq!(trade.status, TradeStatus::Closed);
    assert_eq!(trade.exits.len(), 2);
    assert_eq!(trade.exits[0].reason, ExitReason::TakeProfit);
    assert_eq!(trade.exits[0].price, 105.0);
    assert_eq!(trade.exits[0].size, 5.0);
    assert_eq!(trade.exits[1].reason, ExitReason::StopLoss);
    assert_eq!(trade.exits[1].bar_index, 5);
    assert!((trade.exits[1].price - 110.0 * 0.95).abs() < 1e-9);
    assert_eq!(strategy.closed.len(), 1);
}

#[test]
fn exhausted_equity_liquidates_and_stops() {
    let s = series(&[
        flat(100.0),
        flat(100.0),
        (99.0, 99.5, 84.0, 85.0),
        flat(85.0),
        flat(85.0),
    ]);
    let mut strategy = scripted(|ctx| {
        if ctx.bar_index() == 0 {
            ctx.buy(OrderRequest::units(90.0))?;
        }
        Ok(())
    });
    let config = EngineConfig {
        cash: 1_000.0,
        leverage: 10.0,
        ..EngineConfig::default()
    };
    let out = run(&s, &mut strategy, &config).unwrap();

    assert_eq!(out.liquidated_at, Some(2));
    assert_eq!(out.equity_curve.len(), 5);
    let last = out.equity_curve.last().unwrap();
    assert_eq!(last.equity, -350.0);
    assert_eq!(last.bar_index, 4);
    assert_eq!(out.record.trades[0].exits[0].reason, ExitReason::Liquidation);
    assert!(out
        .record
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::Liquidation));
}
