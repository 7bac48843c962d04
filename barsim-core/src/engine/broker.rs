//! Matching engine and account state.
//!
//! Per bar the broker expires stale orders, then matches in three phases:
//! market orders, stops (including pending stop-limits), limits (including
//! triggered stop-limits). Within a phase the candidate list is rebuilt after
//! every evaluation, so replacements created by a fill (resized exit levels)
//! are matched on the same bar. Stop-loss orders are stops and take-profit
//! orders are limits, which is what makes a stop-loss win a same-bar tie.

use super::config::EngineConfig;
use super::error::{EngineError, OrderError, RunWarning, WarningKind};
use super::execution::{
    check_trigger, evaluation_cmp, phase_of, CostModel, MatchPhase, TriggerResult,
};
use super::ledger::{Ledger, NewTrade, Position, TradeExit};
use super::market::MarketView;
use super::order_book::OrderBook;
use crate::components::trailing::TrailingModel;
use crate::domain::trade::SIZE_EPSILON;
use crate::domain::{
    Bar, Direction, ExitPlan, ExitReason, Fill, Level, LevelKind, LevelSpec, Lifetime, Order,
    OrderAuditEntry, OrderId, OrderRequest, OrderRole, OrderSide, OrderSize, OrderStatus,
    OrderType, Trade, TradeId,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Canceled,
    /// The order had already reached this final status; nothing changed.
    AlreadyFinal(OrderStatus),
}

/// Everything the broker accumulated over a run.
#[derive(Debug, Clone)]
pub struct BrokerRecord {
    pub orders: Vec<Order>,
    pub audit_trail: Vec<OrderAuditEntry>,
    pub trades: Vec<Trade>,
    pub fills: Vec<Fill>,
    pub warnings: Vec<RunWarning>,
    pub final_cash: f64,
    pub commissions: f64,
}

#[derive(Debug, Clone)]
pub struct Broker {
    config: EngineConfig,
    costs: CostModel,
    book: OrderBook,
    ledger: Ledger,
    fills: Vec<Fill>,
    warnings: Vec<RunWarning>,
    /// Stop-limits whose stop fired on the bar being matched.
    triggered_now: HashSet<OrderId>,
    /// Trades closed since the driver last asked.
    newly_closed: Vec<TradeId>,
    /// Net cash moved by fills, kept independently of the ledger.
    fill_cashflow: f64,
}

impl Broker {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Config)?;
        Ok(Self {
            costs: config.cost_model(),
            ledger: Ledger::new(config.cash),
            config,
            book: OrderBook::new(),
            fills: Vec::new(),
            warnings: Vec::new(),
            triggered_now: HashSet::new(),
            newly_closed: Vec::new(),
            fill_cashflow: 0.0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn warnings(&self) -> &[RunWarning] {
        &self.warnings
    }

    pub fn position(&self) -> Position {
        self.ledger.position()
    }

    pub fn equity(&self, mark: f64) -> f64 {
        self.ledger.equity(mark)
    }

    /// Trades closed since the last call, in closing order.
    pub fn take_closed(&mut self) -> Vec<TradeId> {
        std::mem::take(&mut self.newly_closed)
    }

    pub fn into_record(self) -> BrokerRecord {
        let final_cash = self.ledger.cash();
        let commissions = self.ledger.commissions();
        let (orders, audit_trail) = self.book.into_parts();
        BrokerRecord {
            orders,
            audit_trail,
            trades: self.ledger.into_trades(),
            fills: self.fills,
            warnings: self.warnings,
            final_cash,
            commissions,
        }
    }

    // ---- strategy requests -------------------------------------------------

    /// Queue an entry order created while `bar` (index `bar_index`) is current.
    /// It is matched from the next bar on.
    pub fn submit(
        &mut self,
        side: OrderSide,
        request: OrderRequest,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<OrderId, OrderError> {
        self.validate_size(request.size)?;
        if let Some(price) = request.limit {
            check_price("limit", price)?;
        }
        if let Some(price) = request.stop {
            check_price("stop", price)?;
        }
        let order_type = request.order_type();
        let reference = order_type.reference_price().unwrap_or(bar.close);
        let exit_plan = validate_plan(side, request.exit_plan, reference)?;

        if self.config.exclusive_orders {
            self.clear_for_exclusive(bar_index, bar.timestamp);
        }

        let id = self.book.next_id();
        self.book.insert(Order {
            id,
            side,
            order_type,
            size: request.size,
            status: OrderStatus::Pending,
            role: OrderRole::Entry,
            lifetime: request.lifetime,
            exit_plan,
            tag: request.tag,
            created_bar: bar_index,
            created_at: bar.timestamp,
            eligible_from: bar_index + 1,
            filled_size: 0.0,
            fill_price: None,
            fill_bar: None,
        });
        debug!(order = %id, %side, ?order_type, bar = bar_index, "order submitted");
        Ok(id)
    }

    pub fn cancel(&mut self, id: OrderId, bar_index: usize) -> Result<CancelOutcome, OrderError> {
        let order = self.book.get(id).ok_or(OrderError::UnknownOrder(id))?;
        if order.is_contingent() {
            return Err(OrderError::ContingentOrder(id));
        }
        if !order.is_active() {
            let status = order.status.clone();
            self.record_warning(
                bar_index,
                WarningKind::AlreadyFinal,
                format!("cancel of {id} ignored: already {status}"),
            );
            return Ok(CancelOutcome::AlreadyFinal(status));
        }
        self.book
            .cancel_if_active(id, bar_index, "canceled by strategy");
        Ok(CancelOutcome::Canceled)
    }

    /// Queue a market close for `portion` of the trade's remaining size.
    pub fn close_trade(
        &mut self,
        trade_id: TradeId,
        portion: f64,
        bar_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<OrderId, OrderError> {
        if !(portion > 0.0 && portion <= 1.0) {
            return Err(OrderError::InvalidPortion(portion));
        }
        let trade = self.open_trade(trade_id)?;
        let size = if portion >= 1.0 {
            trade.remaining_size
        } else {
            lot_floor(trade.remaining_size * portion, self.config.lot_size)
        };
        if size <= SIZE_EPSILON {
            return Err(OrderError::InvalidSize(size));
        }
        let side = trade.direction.exit_side();
        Ok(self.queue_close(trade_id, side, size, bar_index, timestamp))
    }

    /// Queue a full close of every open trade.
    pub fn close_position(&mut self, bar_index: usize, timestamp: DateTime<Utc>) -> Vec<OrderId> {
        let open: Vec<(TradeId, OrderSide, f64)> = self
            .ledger
            .open_trades()
            .map(|t| (t.id, t.direction.exit_side(), t.remaining_size))
            .collect();
        open.into_iter()
            .map(|(id, side, size)| self.queue_close(id, side, size, bar_index, timestamp))
            .collect()
    }

    pub fn set_stop_loss(
        &mut self,
        trade_id: TradeId,
        price: f64,
        bar_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.set_level(trade_id, LevelKind::StopLoss, price, bar_index, timestamp)
    }

    pub fn set_take_profit(
        &mut self,
        trade_id: TradeId,
        price: f64,
        bar_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.set_level(trade_id, LevelKind::TakeProfit, price, bar_index, timestamp)
    }

    // ---- per-bar processing -------------------------------------------------

    /// Match every eligible order against `bar`.
    pub fn process_bar(&mut self, bar_index: usize, bar: &Bar) -> Result<(), EngineError> {
        self.triggered_now.clear();
        let expired = self.book.expire_matching(bar_index, |o| {
            o.lifetime
                .last_eligible_bar(o.created_bar)
                .is_some_and(|last| bar_index > last)
        });
        if !expired.is_empty() {
            debug!(bar = bar_index, count = expired.len(), "orders expired");
        }

        for phase in [MatchPhase::Market, MatchPhase::Stop, MatchPhase::Limit] {
            self.match_phase(phase, bar_index, bar)?;
        }
        self.check_orphans(bar_index)
    }

    /// Update each open trade's running extreme with the bar's close.
    pub fn mark_extremes(&mut self, close: f64) {
        for trade in self.ledger.open_trades_mut() {
            trade.mark_extreme(close);
        }
    }

    /// Let `model` move the stop-losses of trades that banked a take-profit.
    pub fn apply_trailing(
        &mut self,
        model: &dyn TrailingModel,
        market: &MarketView<'_>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let bar_index = market.bar_index();
        let candidates: Vec<TradeId> = self
            .ledger
            .open_trades()
            .filter(|t| t.take_profits_hit() >= 1)
            .map(|t| t.id)
            .collect();

        for trade_id in candidates {
            let Some(trade) = self.ledger.trade(trade_id) else {
                continue;
            };
            let slots = level_slots(trade, LevelKind::StopLoss);
            if slots.is_empty() {
                continue;
            }
            let stops: Vec<f64> = slots.iter().map(|&i| trade.levels[i].price).collect();
            let proposed = model.trail(trade, &stops, market);
            if proposed.len() != stops.len() {
                return Err(EngineError::invariant(
                    bar_index,
                    format!(
                        "trailing model {} proposed {} stops for {} levels",
                        model.name(),
                        proposed.len(),
                        stops.len()
                    ),
                ));
            }
            let long = trade.is_long();

            let mut moved = false;
            if let Some(trade) = self.ledger.open_trade_mut(trade_id) {
                for (&slot, price) in slots.iter().zip(proposed) {
                    if !(price.is_finite() && price > 0.0) {
                        continue;
                    }
                    let level = &mut trade.levels[slot];
                    let tighter = if long {
                        price > level.price
                    } else {
                        price < level.price
                    };
                    if tighter {
                        level.price = price;
                        moved = true;
                    }
                }
            }
            if moved {
                debug!(trade = %trade_id, model = model.name(), "stop-loss trailed");
                self.rebalance_levels(trade_id, bar_index, timestamp);
            }
        }
        Ok(())
    }

    /// Close everything at the bar's close if equity is exhausted.
    /// Returns true when the account was liquidated.
    pub fn liquidate_if_bankrupt(&mut self, bar_index: usize, bar: &Bar) -> Result<bool, EngineError> {
        let equity = self.ledger.equity(bar.close);
        if equity > 0.0 {
            return Ok(false);
        }
        let open = self.ledger.open_trades().count();
        self.close_all(ExitReason::Liquidation, bar_index, bar)?;
        self.book.cancel_matching(bar_index, "liquidation", |_| true);
        info!(bar = bar_index, equity, open, "account liquidated");
        self.record_warning(
            bar_index,
            WarningKind::Liquidation,
            format!("equity {equity:.2} <= 0 at close; {open} open trades liquidated"),
        );
        Ok(true)
    }

    /// End-of-data settlement on the last processed bar.
    pub fn finish(&mut self, bar_index: usize, bar: &Bar) -> Result<(), EngineError> {
        if !self.config.close_at_end {
            return Ok(());
        }
        self.close_all(ExitReason::EndOfData, bar_index, bar)?;
        self.book.cancel_matching(bar_index, "end of data", |_| true);
        Ok(())
    }

    // ---- matching -------------------------------------------------------

    fn match_phase(
        &mut self,
        phase: MatchPhase,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<(), EngineError> {
        let mut evaluated = HashSet::new();
        loop {
            let next = self
                .book
                .active()
                .filter(|o| {
                    o.is_eligible(bar_index) && phase_of(o) == phase && !evaluated.contains(&o.id)
                })
                .min_by(|a, b| evaluation_cmp(a, b, bar))
                .map(|o| o.id);
            let Some(id) = next else {
                return Ok(());
            };
            evaluated.insert(id);
            self.evaluate(id, bar_index, bar)?;
        }
    }

    fn evaluate(&mut self, id: OrderId, bar_index: usize, bar: &Bar) -> Result<(), EngineError> {
        let Some(order) = self.book.get(id).cloned() else {
            return Ok(());
        };
        match check_trigger(&order, bar, self.config.gap_policy) {
            TriggerResult::NoTrigger => Ok(()),
            TriggerResult::StopTriggered => {
                self.book
                    .trigger(id, bar_index)
                    .map_err(|e| EngineError::from_book(bar_index, e))?;
                self.triggered_now.insert(id);
                debug!(order = %id, bar = bar_index, "stop-limit triggered");
                Ok(())
            }
            TriggerResult::Fill { price, .. } => {
                let price = if self.triggered_now.contains(&id) {
                    clamp_triggered_fill(&order, price, bar)
                } else {
                    price
                };
                self.execute(&order, price, bar_index, bar)
            }
        }
    }

    fn execute(
        &mut self,
        order: &Order,
        raw_price: f64,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<(), EngineError> {
        let slipped = matches!(order.order_type, OrderType::Market | OrderType::Stop { .. });
        let price = if slipped {
            self.costs.apply_slippage(raw_price, order.side, 1.0).0
        } else {
            raw_price
        };
        match order.role {
            OrderRole::Entry => self.fill_entry(order, raw_price, price, bar_index, bar),
            OrderRole::Close { trade } => {
                self.fill_close(order, trade, raw_price, price, bar_index, bar)
            }
            OrderRole::StopLoss { trade } | OrderRole::TakeProfit { trade } => {
                self.fill_contingent(order, trade, raw_price, price, bar_index, bar)
            }
        }
    }

    fn fill_entry(
        &mut self,
        order: &Order,
        raw_price: f64,
        price: f64,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<(), EngineError> {
        let lot = self.config.lot_size;
        let leverage = self.config.leverage;
        let mode = self.config.margin_mode;

        let size = match order.size {
            OrderSize::Units(units) => units,
            OrderSize::EquityFraction(fraction) => {
                let free = self.ledger.free_margin(price, leverage, mode).max(0.0);
                lot_floor(fraction * free * leverage / price, lot)
            }
        };
        if size <= SIZE_EPSILON {
            return self.reject(
                order.id,
                bar_index,
                WarningKind::ZeroSize,
                "order size resolved to zero",
            );
        }

        let direction = Direction::from_side(order.side);
        let mut to_net: Vec<(TradeId, f64)> = Vec::new();
        let mut left = size;
        if !self.config.hedging {
            for trade in self.ledger.open_trades().filter(|t| t.direction != direction) {
                if left <= SIZE_EPSILON {
                    break;
                }
                let take = left.min(trade.remaining_size);
                to_net.push((trade.id, take));
                left -= take;
            }
        }

        let mut fixed_fee = self.costs.commission_fixed;
        let mut commission = 0.0;
        let mut filled = 0.0;
        for &(trade_id, take) in &to_net {
            let part = self.variable_commission(price, take) + std::mem::take(&mut fixed_fee);
            self.reduce_trade(
                trade_id,
                TradeExit {
                    order_id: Some(order.id),
                    bar_index,
                    timestamp: bar.timestamp,
                    price,
                    size: take,
                    reason: ExitReason::Netting,
                    commission: part,
                },
                bar_index,
            )?;
            commission += part;
            filled += take;
        }

        let mut opened = None;
        if left > SIZE_EPSILON {
            let part = self.variable_commission(price, left) + fixed_fee;
            let free_after = self
                .ledger
                .free_margin_after_open(direction, left, price, part, leverage, mode);
            if free_after < -1e-9 {
                let reason = format!("insufficient margin to open {left} at {price:.4}");
                if filled <= SIZE_EPSILON {
                    return self.reject(
                        order.id,
                        bar_index,
                        WarningKind::InsufficientMargin,
                        &reason,
                    );
                }
                self.record_warning(
                    bar_index,
                    WarningKind::InsufficientMargin,
                    format!("{}: netted {filled}, remainder rejected: {reason}", order.id),
                );
            } else {
                let trade_id = self.ledger.open(NewTrade {
                    direction,
                    entry_order: order.id,
                    bar_index,
                    timestamp: bar.timestamp,
                    price,
                    size: left,
                    commission: part,
                    levels: plan_levels(&order.exit_plan, direction),
                    tag: order.tag.clone(),
                });
                self.rebalance_levels(trade_id, bar_index, bar.timestamp);
                commission += part;
                filled += left;
                opened = Some(trade_id);
            }
        }

        self.book
            .record_fill(order.id, filled, price, bar_index)
            .map_err(|e| EngineError::from_book(bar_index, e))?;
        self.push_fill(Fill {
            order_id: Some(order.id),
            trade_id: opened.or_else(|| to_net.first().map(|&(id, _)| id)),
            bar_index,
            timestamp: bar.timestamp,
            side: order.side,
            price,
            size: filled,
            commission,
            slippage: (price - raw_price).abs() * filled,
        });
        Ok(())
    }

    fn fill_close(
        &mut self,
        order: &Order,
        trade_id: TradeId,
        raw_price: f64,
        price: f64,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<(), EngineError> {
        let Some(remaining) = self
            .ledger
            .trade(trade_id)
            .filter(|t| t.is_open())
            .map(|t| t.remaining_size)
        else {
            self.book
                .cancel_if_active(order.id, bar_index, "trade already closed");
            return Ok(());
        };
        let size = order.size.units().unwrap_or(0.0).min(remaining);
        let commission = self.costs.commission(price, size);

        self.book
            .record_fill(order.id, size, price, bar_index)
            .map_err(|e| EngineError::from_book(bar_index, e))?;
        self.reduce_trade(
            trade_id,
            TradeExit {
                order_id: Some(order.id),
                bar_index,
                timestamp: bar.timestamp,
                price,
                size,
                reason: ExitReason::Close,
                commission,
            },
            bar_index,
        )?;
        self.push_fill(Fill {
            order_id: Some(order.id),
            trade_id: Some(trade_id),
            bar_index,
            timestamp: bar.timestamp,
            side: order.side,
            price,
            size,
            commission,
            slippage: (price - raw_price).abs() * size,
        });
        Ok(())
    }

    fn fill_contingent(
        &mut self,
        order: &Order,
        trade_id: TradeId,
        raw_price: f64,
        price: f64,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<(), EngineError> {
        let trade = self
            .ledger
            .trade(trade_id)
            .filter(|t| t.is_open())
            .ok_or_else(|| {
                EngineError::invariant(
                    bar_index,
                    format!("{} is attached to {trade_id}, which is not open", order.id),
                )
            })?;
        let slot = trade.level_for_order(order.id).ok_or_else(|| {
            EngineError::invariant(
                bar_index,
                format!("{} is not linked to a level of {trade_id}", order.id),
            )
        })?;
        let size = order.size.units().unwrap_or(0.0).min(trade.remaining_size);
        let reason = match order.role {
            OrderRole::StopLoss { .. } => ExitReason::StopLoss,
            _ => ExitReason::TakeProfit,
        };
        let commission = self.costs.commission(price, size);

        self.book
            .record_fill(order.id, size, price, bar_index)
            .map_err(|e| EngineError::from_book(bar_index, e))?;
        if let Some(trade) = self.ledger.open_trade_mut(trade_id) {
            let level = &mut trade.levels[slot];
            level.hit = true;
            level.order = None;
        }
        self.reduce_trade(
            trade_id,
            TradeExit {
                order_id: Some(order.id),
                bar_index,
                timestamp: bar.timestamp,
                price,
                size,
                reason,
                commission,
            },
            bar_index,
        )?;
        self.push_fill(Fill {
            order_id: Some(order.id),
            trade_id: Some(trade_id),
            bar_index,
            timestamp: bar.timestamp,
            side: order.side,
            price,
            size,
            commission,
            slippage: (price - raw_price).abs() * size,
        });
        Ok(())
    }

    // ---- trade bookkeeping ------------------------------------------------

    /// Book an exit; a closed trade loses all of its orders, a reduced one
    /// gets its surviving levels resized.
    fn reduce_trade(
        &mut self,
        trade_id: TradeId,
        exit: TradeExit,
        bar_index: usize,
    ) -> Result<bool, EngineError> {
        let timestamp = exit.timestamp;
        let closed = self
            .ledger
            .reduce(trade_id, exit)
            .map_err(|e| EngineError::from_ledger(bar_index, e))?;
        if closed {
            let canceled = self.book.cancel_matching(bar_index, "trade closed", |o| {
                o.role.trade() == Some(trade_id)
            });
            debug!(trade = %trade_id, bar = bar_index, canceled = canceled.len(), "trade closed");
            self.newly_closed.push(trade_id);
        } else {
            self.rebalance_levels(trade_id, bar_index, timestamp);
        }
        Ok(closed)
    }

    /// Resize every surviving level of an open trade to its weight share of
    /// the remaining size, replacing orders whose price or size changed.
    fn rebalance_levels(&mut self, trade_id: TradeId, bar_index: usize, timestamp: DateTime<Utc>) {
        let lot = self.config.lot_size;
        let Some(trade) = self.ledger.open_trade_mut(trade_id) else {
            return;
        };
        let exit_side = trade.direction.exit_side();
        let eligible_from = trade.entry_bar + 1;
        let remaining = trade.remaining_size;

        for kind in [LevelKind::StopLoss, LevelKind::TakeProfit] {
            let slots = level_slots(trade, kind);
            if slots.is_empty() {
                continue;
            }
            let total: f64 = slots.iter().map(|&i| trade.levels[i].weight).sum();
            for &i in &slots {
                trade.levels[i].weight /= total;
            }
            let weights: Vec<f64> = slots.iter().map(|&i| trade.levels[i].weight).collect();
            let sizes = allocate(remaining, &weights, lot);

            for (&slot, size) in slots.iter().zip(sizes) {
                let level = &mut trade.levels[slot];
                let live = level
                    .order
                    .and_then(|id| self.book.get(id))
                    .filter(|o| o.is_active());
                let unchanged = live.is_some_and(|o| {
                    o.order_type.reference_price() == Some(level.price)
                        && o.size.units().is_some_and(|u| (u - size).abs() <= SIZE_EPSILON)
                });
                let live_id = live.map(|o| o.id);

                if size <= SIZE_EPSILON {
                    if let Some(id) = live_id {
                        self.book
                            .cancel_if_active(id, bar_index, "level size rounded to zero");
                    }
                    level.order = None;
                    continue;
                }
                if unchanged {
                    continue;
                }

                let (order_type, role) = match kind {
                    LevelKind::StopLoss => (
                        OrderType::Stop {
                            stop_price: level.price,
                        },
                        OrderRole::StopLoss { trade: trade_id },
                    ),
                    LevelKind::TakeProfit => (
                        OrderType::Limit {
                            limit_price: level.price,
                        },
                        OrderRole::TakeProfit { trade: trade_id },
                    ),
                };
                let order = Order {
                    id: self.book.next_id(),
                    side: exit_side,
                    order_type,
                    size: OrderSize::Units(size),
                    status: OrderStatus::Pending,
                    role,
                    lifetime: Lifetime::GoodTillCanceled,
                    exit_plan: ExitPlan::default(),
                    tag: None,
                    created_bar: bar_index,
                    created_at: timestamp,
                    eligible_from,
                    filled_size: 0.0,
                    fill_price: None,
                    fill_bar: None,
                };
                level.order = Some(match live_id {
                    Some(old) => self.book.replace(old, order, bar_index),
                    None => {
                        let id = order.id;
                        self.book.insert(order);
                        id
                    }
                });
            }
        }
    }

    fn set_level(
        &mut self,
        trade_id: TradeId,
        kind: LevelKind,
        price: f64,
        bar_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let field = match kind {
            LevelKind::StopLoss => "stop-loss",
            LevelKind::TakeProfit => "take-profit",
        };
        check_price(field, price)?;
        self.open_trade(trade_id)?;
        let Some(trade) = self.ledger.open_trade_mut(trade_id) else {
            return Err(OrderError::TradeClosed(trade_id));
        };
        let slots = level_slots(trade, kind);
        match slots.as_slice() {
            [] => trade.levels.push(Level::new(kind, price, 1.0)),
            [slot] => trade.levels[*slot].price = price,
            _ => return Err(OrderError::MultiLevelPlan(trade_id)),
        }
        self.rebalance_levels(trade_id, bar_index, timestamp);
        Ok(())
    }

    fn close_all(
        &mut self,
        reason: ExitReason,
        bar_index: usize,
        bar: &Bar,
    ) -> Result<(), EngineError> {
        let open: Vec<(TradeId, OrderSide, f64)> = self
            .ledger
            .open_trades()
            .map(|t| (t.id, t.direction.exit_side(), t.remaining_size))
            .collect();
        for (trade_id, side, size) in open {
            let commission = self.costs.commission(bar.close, size);
            self.reduce_trade(
                trade_id,
                TradeExit {
                    order_id: None,
                    bar_index,
                    timestamp: bar.timestamp,
                    price: bar.close,
                    size,
                    reason,
                    commission,
                },
                bar_index,
            )?;
            self.push_fill(Fill {
                order_id: None,
                trade_id: Some(trade_id),
                bar_index,
                timestamp: bar.timestamp,
                side,
                price: bar.close,
                size,
                commission,
                slippage: 0.0,
            });
        }
        Ok(())
    }

    fn queue_close(
        &mut self,
        trade_id: TradeId,
        side: OrderSide,
        size: f64,
        bar_index: usize,
        timestamp: DateTime<Utc>,
    ) -> OrderId {
        let id = self.book.next_id();
        self.book.insert(Order {
            id,
            side,
            order_type: OrderType::Market,
            size: OrderSize::Units(size),
            status: OrderStatus::Pending,
            role: OrderRole::Close { trade: trade_id },
            lifetime: Lifetime::GoodTillCanceled,
            exit_plan: ExitPlan::default(),
            tag: None,
            created_bar: bar_index,
            created_at: timestamp,
            eligible_from: bar_index + 1,
            filled_size: 0.0,
            fill_price: None,
            fill_bar: None,
        });
        debug!(order = %id, trade = %trade_id, size, "close queued");
        id
    }

    /// Exclusive mode: drop other pending entries and closes, then queue a
    /// full close of every open trade ahead of the new entry.
    fn clear_for_exclusive(&mut self, bar_index: usize, timestamp: DateTime<Utc>) {
        self.book.cancel_matching(bar_index, "superseded by exclusive order", |o| {
            matches!(o.role, OrderRole::Entry | OrderRole::Close { .. })
        });
        self.close_position(bar_index, timestamp);
    }

    fn check_orphans(&self, bar_index: usize) -> Result<(), EngineError> {
        let orphan = self.book.active().find(|o| {
            o.is_contingent()
                && !o
                    .role
                    .trade()
                    .and_then(|id| self.ledger.trade(id))
                    .is_some_and(Trade::is_open)
        });
        match orphan {
            Some(order) => Err(EngineError::invariant(
                bar_index,
                format!("{} is an orphaned contingent order", order.id),
            )),
            None => Ok(()),
        }
    }

    /// Ledger cash must equal starting cash plus the cash moved by every fill.
    pub fn verify_accounts(&self, bar_index: usize) -> Result<(), EngineError> {
        let expected = self.config.cash + self.fill_cashflow;
        let cash = self.ledger.cash();
        let tolerance = 1e-6 * expected.abs().max(1.0);
        if (cash - expected).abs() > tolerance {
            return Err(EngineError::invariant(
                bar_index,
                format!("ledger cash {cash} does not reconcile with fills ({expected})"),
            ));
        }
        Ok(())
    }

    // ---- helpers ----------------------------------------------------------

    fn open_trade(&self, trade_id: TradeId) -> Result<&Trade, OrderError> {
        let trade = self
            .ledger
            .trade(trade_id)
            .ok_or(OrderError::UnknownTrade(trade_id))?;
        if !trade.is_open() {
            return Err(OrderError::TradeClosed(trade_id));
        }
        Ok(trade)
    }

    fn validate_size(&self, size: OrderSize) -> Result<(), OrderError> {
        match size {
            OrderSize::Units(units) => {
                if !(units.is_finite() && units > 0.0) {
                    return Err(OrderError::InvalidSize(units));
                }
                if !is_lot_multiple(units, self.config.lot_size) {
                    return Err(OrderError::OddLot {
                        size: units,
                        lot: self.config.lot_size,
                    });
                }
                Ok(())
            }
            OrderSize::EquityFraction(fraction) => {
                if fraction > 0.0 && fraction < 1.0 {
                    Ok(())
                } else {
                    Err(OrderError::InvalidFraction(fraction))
                }
            }
        }
    }

    fn variable_commission(&self, price: f64, size: f64) -> f64 {
        price * size * self.costs.commission_bps / 10_000.0
    }

    fn reject(
        &mut self,
        id: OrderId,
        bar_index: usize,
        kind: WarningKind,
        reason: &str,
    ) -> Result<(), EngineError> {
        self.book
            .reject(id, bar_index, reason)
            .map_err(|e| EngineError::from_book(bar_index, e))?;
        self.record_warning(bar_index, kind, format!("{id} rejected: {reason}"));
        Ok(())
    }

    fn record_warning(&mut self, bar_index: usize, kind: WarningKind, message: String) {
        warn!(bar = bar_index, ?kind, "{message}");
        self.warnings.push(RunWarning {
            bar_index,
            kind,
            message,
        });
    }

    fn push_fill(&mut self, fill: Fill) {
        debug!(
            order = ?fill.order_id,
            trade = ?fill.trade_id,
            side = %fill.side,
            price = fill.price,
            size = fill.size,
            bar = fill.bar_index,
            "fill"
        );
        self.fill_cashflow -= fill.side.sign() * fill.price * fill.size + fill.commission;
        self.fills.push(fill);
    }
}

fn check_price(field: &'static str, value: f64) -> Result<f64, OrderError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(OrderError::InvalidPrice { field, value })
    }
}

/// Largest multiple of `lot` not above `size`.
pub(crate) fn lot_floor(size: f64, lot: f64) -> f64 {
    (size / lot + 1e-9).floor() * lot
}

fn is_lot_multiple(size: f64, lot: f64) -> bool {
    let lots = size / lot;
    (lots - lots.round()).abs() <= 1e-9 * lots.abs().max(1.0)
}

/// Split `remaining` by `weights` in whole lots; the rounding remainder goes
/// to the first (nearest) level so the sizes sum to `remaining`.
fn allocate(remaining: f64, weights: &[f64], lot: f64) -> Vec<f64> {
    let mut sizes: Vec<f64> = weights
        .iter()
        .map(|w| lot_floor(remaining * w, lot))
        .collect();
    let assigned: f64 = sizes.iter().sum();
    if let Some(first) = sizes.first_mut() {
        *first += (remaining - assigned).max(0.0);
    }
    sizes
}

/// Indices of the trade's surviving levels of `kind`.
fn level_slots(trade: &Trade, kind: LevelKind) -> Vec<usize> {
    trade
        .levels
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == kind && !l.hit)
        .map(|(i, _)| i)
        .collect()
}

/// Reject bad prices and weights, check that every stop-loss sits on the
/// losing side of `reference` and every take-profit on the winning side, and
/// normalize weights per kind.
fn validate_plan(side: OrderSide, plan: ExitPlan, reference: f64) -> Result<ExitPlan, OrderError> {
    for level in &plan.stop_losses {
        check_price("stop-loss", level.price)?;
    }
    for level in &plan.take_profits {
        check_price("take-profit", level.price)?;
    }
    for level in plan.levels() {
        if !(level.weight.is_finite() && level.weight > 0.0) {
            return Err(OrderError::InvalidWeight(level.weight));
        }
    }

    let below = |p: f64| p < reference;
    let above = |p: f64| p > reference;
    let (sl_ok, tp_ok): (&dyn Fn(f64) -> bool, &dyn Fn(f64) -> bool) = match side {
        OrderSide::Buy => (&below, &above),
        OrderSide::Sell => (&above, &below),
    };
    let checks = [
        (LevelKind::StopLoss, &plan.stop_losses, sl_ok),
        (LevelKind::TakeProfit, &plan.take_profits, tp_ok),
    ];
    for (kind, levels, ok) in checks {
        if let Some(bad) = levels.iter().find(|l| !ok(l.price)) {
            return Err(OrderError::InvalidExitGeometry {
                side,
                reference,
                level: bad.price,
                kind,
            });
        }
    }

    Ok(ExitPlan {
        stop_losses: normalized(plan.stop_losses),
        take_profits: normalized(plan.take_profits),
    })
}

fn normalized(levels: Vec<LevelSpec>) -> Vec<LevelSpec> {
    let total: f64 = levels.iter().map(|l| l.weight).sum();
    levels
        .into_iter()
        .map(|l| LevelSpec {
            price: l.price,
            weight: l.weight / total,
        })
        .collect()
}

/// Trade levels from an exit plan, nearest to entry first within each kind.
fn plan_levels(plan: &ExitPlan, direction: Direction) -> Vec<Level> {
    let mut stops: Vec<Level> = plan
        .stop_losses
        .iter()
        .map(|l| Level::new(LevelKind::StopLoss, l.price, l.weight))
        .collect();
    let mut targets: Vec<Level> = plan
        .take_profits
        .iter()
        .map(|l| Level::new(LevelKind::TakeProfit, l.price, l.weight))
        .collect();
    match direction {
        Direction::Long => {
            stops.sort_by(|a, b| b.price.total_cmp(&a.price));
            targets.sort_by(|a, b| a.price.total_cmp(&b.price));
        }
        Direction::Short => {
            stops.sort_by(|a, b| a.price.total_cmp(&b.price));
            targets.sort_by(|a, b| b.price.total_cmp(&a.price));
        }
    }
    stops.extend(targets);
    stops
}

/// A stop-limit triggered on this bar cannot fill better than its stop:
/// buys fill at `min(limit, max(open, stop))`, sells at `max(limit, min(open, stop))`.
fn clamp_triggered_fill(order: &Order, price: f64, bar: &Bar) -> f64 {
    match order.order_type {
        OrderType::StopLimit {
            stop_price,
            limit_price,
        } => match order.side {
            OrderSide::Buy => limit_price.min(bar.open.max(stop_price)),
            OrderSide::Sell => limit_price.max(bar.open.min(stop_price)),
        },
        _ => price,
    }
}
