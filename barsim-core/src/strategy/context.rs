//! What a strategy can see and do.

use crate::components::{Indicator, TrailingModel};
use crate::data::Window;
use crate::domain::{Bar, Order, OrderId, OrderRequest, OrderSide, Trade, TradeId};
use crate::engine::{
    BinderError, Broker, CancelOutcome, IndicatorBinder, IndicatorHandle, IndicatorView,
    MarketView, OrderError, Position,
};

/// Setup-time access: indicator registration and the trailing model slot.
///
/// Indicators see the full history here; the binder only ever hands the
/// strategy the prefix up to the current bar.
pub struct InitContext<'a> {
    bars: &'a [Bar],
    binder: &'a mut IndicatorBinder,
    trailing: &'a mut Option<Box<dyn TrailingModel>>,
}

impl<'a> InitContext<'a> {
    pub(crate) fn new(
        bars: &'a [Bar],
        binder: &'a mut IndicatorBinder,
        trailing: &'a mut Option<Box<dyn TrailingModel>>,
    ) -> Self {
        Self {
            bars,
            binder,
            trailing,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        compute: F,
    ) -> Result<IndicatorHandle, BinderError>
    where
        F: Fn(&[Bar]) -> Vec<f64>,
    {
        self.binder.register(self.bars, name, compute)
    }

    pub fn register_indicator(
        &mut self,
        indicator: &dyn Indicator,
    ) -> Result<IndicatorHandle, BinderError> {
        self.binder.register_indicator(self.bars, indicator)
    }

    /// Trailing model applied to every trade after its first take-profit.
    pub fn set_trailing(&mut self, model: Box<dyn TrailingModel>) {
        *self.trailing = Some(model);
    }
}

/// Per-bar access to the market and the broker.
///
/// Orders submitted here are matched from the next bar on.
pub struct StrategyContext<'a> {
    market: MarketView<'a>,
    bar: &'a Bar,
    broker: &'a mut Broker,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(market: MarketView<'a>, bar: &'a Bar, broker: &'a mut Broker) -> Self {
        Self {
            market,
            bar,
            broker,
        }
    }

    pub fn market(&self) -> MarketView<'a> {
        self.market
    }

    pub fn data(&self) -> Window<'a> {
        self.market.data()
    }

    pub fn bar_index(&self) -> usize {
        self.market.bar_index()
    }

    pub fn bar(&self) -> &'a Bar {
        self.bar
    }

    pub fn indicator(&self, handle: IndicatorHandle) -> Result<IndicatorView<'a>, BinderError> {
        self.market.indicator(handle)
    }

    pub fn buy(&mut self, request: OrderRequest) -> Result<OrderId, OrderError> {
        self.broker
            .submit(OrderSide::Buy, request, self.bar_index(), self.bar)
    }

    pub fn sell(&mut self, request: OrderRequest) -> Result<OrderId, OrderError> {
        self.broker
            .submit(OrderSide::Sell, request, self.bar_index(), self.bar)
    }

    pub fn cancel(&mut self, id: OrderId) -> Result<CancelOutcome, OrderError> {
        self.broker.cancel(id, self.bar_index())
    }

    pub fn position(&self) -> Position {
        self.broker.position()
    }

    /// Queue market closes for every open trade.
    pub fn close_position(&mut self) -> Vec<OrderId> {
        self.broker
            .close_position(self.bar_index(), self.bar.timestamp)
    }

    /// Queue a market close of `portion` in (0, 1] of the trade's remaining size.
    pub fn close_trade(&mut self, trade: TradeId, portion: f64) -> Result<OrderId, OrderError> {
        self.broker
            .close_trade(trade, portion, self.bar_index(), self.bar.timestamp)
    }

    pub fn set_stop_loss(&mut self, trade: TradeId, price: f64) -> Result<(), OrderError> {
        self.broker
            .set_stop_loss(trade, price, self.bar_index(), self.bar.timestamp)
    }

    pub fn set_take_profit(&mut self, trade: TradeId, price: f64) -> Result<(), OrderError> {
        self.broker
            .set_take_profit(trade, price, self.bar_index(), self.bar.timestamp)
    }

    /// Open trades, oldest first.
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.broker.ledger().open_trades()
    }

    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.broker.ledger().closed_trades()
    }

    pub fn trade(&self, id: TradeId) -> Option<&Trade> {
        self.broker.ledger().trade(id)
    }

    /// Active (pending or triggered) orders.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.broker.book().active()
    }

    /// Equity marked at the current close.
    pub fn equity(&self) -> f64 {
        self.broker.equity(self.bar.close)
    }

    pub fn cash(&self) -> f64 {
        self.broker.ledger().cash()
    }

    /// Unit sizes must be multiples of this.
    pub fn lot_size(&self) -> f64 {
        self.broker.config().lot_size
    }
}
