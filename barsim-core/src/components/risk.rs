//! Risk models: how much currency to put at risk on the next trade.
//!
//! A risk model only answers with an amount. Turning that into units is
//! [`size_for_risk`]; the broker still validates margin at fill time.

/// What a risk model may look at.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext<'a> {
    pub equity: f64,
    /// Net P&L of closed trades, oldest first.
    pub closed_pnls: &'a [f64],
}

pub trait RiskModel: Send + Sync {
    fn name(&self) -> &str;

    /// Currency amount to risk on the next trade; 0 means do not trade.
    fn risk_per_trade(&self, ctx: &RiskContext<'_>) -> f64;

    fn update_after_win(&mut self) {}

    fn update_after_loss(&mut self) {}
}

/// Risk a fixed fraction of current equity.
#[derive(Debug, Clone)]
pub struct FixedFractionRisk {
    pub fraction: f64,
}

impl FixedFractionRisk {
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }
}

impl RiskModel for FixedFractionRisk {
    fn name(&self) -> &str {
        "fixed_fraction"
    }

    fn risk_per_trade(&self, ctx: &RiskContext<'_>) -> f64 {
        (self.fraction * ctx.equity).max(0.0)
    }
}

/// Fractional Kelly sizing over recent closed trades.
///
/// `f = W - (1 - W) / R` over the last `lookback` trades (W win rate, R average
/// win over average loss), divided by 3 and clamped to `[0, 2]`, then scaled
/// by `initial_risk * equity`. Until `warmup_trades` trades have closed the
/// plain `initial_risk` fraction is used.
#[derive(Debug, Clone)]
pub struct KellyRisk {
    pub initial_risk: f64,
    pub lookback: usize,
    pub warmup_trades: usize,
}

impl KellyRisk {
    pub fn new(initial_risk: f64) -> Self {
        Self {
            initial_risk,
            lookback: 50,
            warmup_trades: 10,
        }
    }

    pub fn kelly_fraction(pnls: &[f64]) -> f64 {
        if pnls.is_empty() {
            return 0.0;
        }
        let (wins, losses): (Vec<f64>, Vec<f64>) = pnls.iter().partition(|&&p| p > 0.0);
        let win_rate = wins.len() as f64 / pnls.len() as f64;
        let avg_win = mean(&wins);
        let avg_loss = mean(&losses).abs();
        if avg_loss == 0.0 {
            return 0.0;
        }
        let ratio = (avg_win / avg_loss).max(0.001);
        ((win_rate - (1.0 - win_rate) / ratio) / 3.0).clamp(0.0, 2.0)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl RiskModel for KellyRisk {
    fn name(&self) -> &str {
        "kelly"
    }

    fn risk_per_trade(&self, ctx: &RiskContext<'_>) -> f64 {
        if ctx.closed_pnls.len() < self.warmup_trades {
            return (self.initial_risk * ctx.equity).max(0.0);
        }
        let start = ctx.closed_pnls.len().saturating_sub(self.lookback);
        let kelly = Self::kelly_fraction(&ctx.closed_pnls[start..]);
        (kelly * self.initial_risk * ctx.equity).max(0.0)
    }
}

/// Units to trade so that a move from `entry` to `stop` loses `risk_amount`,
/// rounded up. Zero when the inputs give no usable distance.
pub fn size_for_risk(risk_amount: f64, entry: f64, stop: f64) -> f64 {
    let distance = (entry - stop).abs();
    if !(risk_amount > 0.0 && distance > 0.0 && distance.is_finite()) {
        return 0.0;
    }
    (risk_amount / distance).ceil()
}
