//! Run statistics: pure functions of the equity curve, trade list and bars.
//!
//! Nothing here touches the engine. Computing the same inputs twice gives
//! identical output. Ratios that are undefined (zero variance, no losses, no
//! trades) come out as 0.0 rather than NaN or infinity.

use crate::config::ReportConfig;
use barsim_core::domain::{Bar, Trade};
use barsim_core::engine::EquityPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profit factor reported when there are winners but no losers.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Aggregate statistics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub bars: usize,
    /// Percentage of bars with a non-zero position.
    pub exposure_pct: f64,
    pub equity_final: f64,
    pub equity_peak: f64,
    pub total_return: f64,
    pub buy_hold_return: f64,
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Negative fraction, e.g. -0.15 for a 15% drawdown.
    pub max_drawdown: f64,
    pub avg_drawdown: f64,
    /// Longest stretch of bars spent below a previous peak.
    pub max_drawdown_duration: usize,
    pub trade_count: usize,
    pub win_rate: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_trade: f64,
    pub profit_factor: f64,
    /// Mean net P&L per closed trade, in currency.
    pub expectancy: f64,
    pub sqn: f64,
    pub avg_trade_duration: f64,
    pub max_trade_duration: usize,
    pub commissions: f64,
}

impl Statistics {
    /// Reduce a finished run. Trade statistics cover closed trades only;
    /// commissions cover every trade.
    pub fn compute(
        curve: &[EquityPoint],
        trades: &[Trade],
        bars: &[Bar],
        initial_cash: f64,
        report: &ReportConfig,
    ) -> Self {
        let equity = equity_values(curve, initial_cash);
        let returns = period_returns(&equity);
        let closed: Vec<&Trade> = trades.iter().filter(|t| !t.is_open()).collect();
        let trade_returns: Vec<f64> = closed.iter().map(|t| t.return_pct()).collect();
        let pnls: Vec<f64> = closed.iter().map(|t| t.net_pnl()).collect();
        let durations: Vec<usize> = closed.iter().filter_map(|t| t.bars_held()).collect();
        let ppy = report.periods_per_year;

        let annual = annual_return(&equity, ppy);
        let max_dd = max_drawdown(&equity);

        Self {
            start: curve.first().map(|p| p.timestamp),
            end: curve.last().map(|p| p.timestamp),
            bars: curve.len(),
            exposure_pct: exposure_pct(curve),
            equity_final: equity.last().copied().unwrap_or(initial_cash),
            equity_peak: equity.iter().copied().fold(initial_cash, f64::max),
            total_return: total_return(&equity),
            buy_hold_return: buy_hold_return(bars),
            annual_return: annual,
            annual_volatility: std_dev(&returns) * ppy.sqrt(),
            sharpe: sharpe_ratio(&returns, report.risk_free_rate, ppy),
            sortino: sortino_ratio(&returns, report.risk_free_rate, ppy),
            calmar: if max_dd < 0.0 && annual > 0.0 {
                annual / max_dd.abs()
            } else {
                0.0
            },
            max_drawdown: max_dd,
            avg_drawdown: avg_drawdown(&equity),
            max_drawdown_duration: max_drawdown_duration(&equity),
            trade_count: closed.len(),
            win_rate: win_rate(&pnls),
            best_trade: trade_returns.iter().copied().fold(None, max_opt).unwrap_or(0.0),
            worst_trade: trade_returns.iter().copied().fold(None, min_opt).unwrap_or(0.0),
            avg_trade: mean_f64(&trade_returns),
            profit_factor: profit_factor(&pnls),
            expectancy: mean_f64(&pnls),
            sqn: sqn(&pnls),
            avg_trade_duration: if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<usize>() as f64 / durations.len() as f64
            },
            max_trade_duration: durations.iter().copied().max().unwrap_or(0),
            commissions: trades.iter().map(|t| t.commission()).sum(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Starting cash followed by the equity at each bar's close.
pub fn equity_values(curve: &[EquityPoint], initial_cash: f64) -> Vec<f64> {
    std::iter::once(initial_cash)
        .chain(curve.iter().map(|p| p.equity))
        .collect()
}

/// Per-bar simple returns. A non-positive base yields a zero return.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// (final - initial) / initial.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if equity.len() >= 2 && first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

/// Last close over first close, minus one.
pub fn buy_hold_return(bars: &[Bar]) -> f64 {
    match (bars.first(), bars.last()) {
        (Some(first), Some(last)) if first.close > 0.0 => last.close / first.close - 1.0,
        _ => 0.0,
    }
}

/// Geometric annualized return. An account that ends at or below zero
/// reports -1.0.
pub fn annual_return(equity: &[f64], periods_per_year: f64) -> f64 {
    let periods = equity.len().saturating_sub(1);
    let (Some(&first), Some(&last)) = (equity.first(), equity.last()) else {
        return 0.0;
    };
    if periods == 0 || first <= 0.0 {
        return 0.0;
    }
    if last <= 0.0 {
        return -1.0;
    }
    (last / first).powf(periods_per_year / periods as f64) - 1.0
}

/// Annualized Sharpe ratio. 0.0 when the returns have no variance.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&excess) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio over downside deviation.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let downside_sq: f64 = excess.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(&excess) / downside_std * periods_per_year.sqrt()
}

/// Largest peak-to-trough decline as a negative fraction.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    drawdowns(equity).into_iter().fold(0.0, f64::min)
}

/// Mean of the deepest point of each drawdown episode.
pub fn avg_drawdown(equity: &[f64]) -> f64 {
    let mut troughs = Vec::new();
    let mut current = 0.0_f64;
    for dd in drawdowns(equity) {
        if dd < 0.0 {
            current = current.min(dd);
        } else if current < 0.0 {
            troughs.push(current);
            current = 0.0;
        }
    }
    if current < 0.0 {
        troughs.push(current);
    }
    mean_f64(&troughs)
}

/// Longest run of consecutive bars below the running peak.
pub fn max_drawdown_duration(equity: &[f64]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for dd in drawdowns(equity) {
        if dd < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Percentage of bars holding a non-zero net position.
pub fn exposure_pct(curve: &[EquityPoint]) -> f64 {
    if curve.is_empty() {
        return 0.0;
    }
    let exposed = curve.iter().filter(|p| p.position.abs() > 1e-9).count();
    exposed as f64 / curve.len() as f64 * 100.0
}

pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    pnls.iter().filter(|&&p| p > 0.0).count() as f64 / pnls.len() as f64
}

/// Gross profits / gross losses, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(pnls: &[f64]) -> f64 {
    let gross_profit: f64 = pnls.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

/// System quality number: sqrt(n) * mean / std of trade P&L.
pub fn sqn(pnls: &[f64]) -> f64 {
    let std = std_dev(pnls);
    if std < 1e-15 {
        return 0.0;
    }
    (pnls.len() as f64).sqrt() * mean_f64(pnls) / std
}

// ─── Helpers ────────────────────────────────────────────────────────

fn drawdowns(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    equity
        .iter()
        .map(|&eq| {
            peak = peak.max(eq);
            if peak > 0.0 {
                (eq - peak) / peak
            } else {
                0.0
            }
        })
        .collect()
}

fn max_opt(acc: Option<f64>, x: f64) -> Option<f64> {
    Some(acc.map_or(x, |a| a.max(x)))
}

fn min_opt(acc: Option<f64>, x: f64) -> Option<f64> {
    Some(acc.map_or(x, |a| a.min(x)))
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
