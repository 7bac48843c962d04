//! Does a bar trigger a given order, and at what raw price?
//!
//! Raw prices exclude slippage and commission; the broker applies those.
//! Eligibility (`eligible_from`) is also the caller's concern.

use super::GapPolicy;
use crate::domain::{Bar, Order, OrderSide, OrderStatus, OrderType};

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerResult {
    NoTrigger,
    Fill { price: f64, gap_through: bool },
    /// Stop-limit whose stop fired; it now rests as a limit.
    StopTriggered,
}

pub fn check_trigger(order: &Order, bar: &Bar, gap_policy: GapPolicy) -> TriggerResult {
    match order.order_type {
        OrderType::Market => TriggerResult::Fill {
            price: bar.open,
            gap_through: false,
        },
        OrderType::Stop { stop_price } => check_stop(order.side, stop_price, bar, gap_policy),
        OrderType::Limit { limit_price } => check_limit(order.side, limit_price, bar),
        OrderType::StopLimit {
            stop_price,
            limit_price,
        } => match order.status {
            OrderStatus::Pending if stop_crossed(order.side, stop_price, bar) => {
                TriggerResult::StopTriggered
            }
            OrderStatus::Triggered => check_limit(order.side, limit_price, bar),
            _ => TriggerResult::NoTrigger,
        },
    }
}

fn stop_crossed(side: OrderSide, stop: f64, bar: &Bar) -> bool {
    match side {
        OrderSide::Buy => bar.high >= stop,
        OrderSide::Sell => bar.low <= stop,
    }
}

/// Buy stop: high >= stop. Sell stop: low <= stop.
fn check_stop(side: OrderSide, stop: f64, bar: &Bar, policy: GapPolicy) -> TriggerResult {
    if !stop_crossed(side, stop, bar) {
        return TriggerResult::NoTrigger;
    }
    let gap_through = match side {
        OrderSide::Buy => bar.open >= stop,
        OrderSide::Sell => bar.open <= stop,
    };
    let price = if gap_through {
        resolve_gap(side, bar.open, stop, policy)
    } else {
        stop
    };
    TriggerResult::Fill { price, gap_through }
}

/// Buy limit: low <= limit. Sell limit: high >= limit. Fills at the limit, or
/// at the open when the bar opens on the favorable side of it.
fn check_limit(side: OrderSide, limit: f64, bar: &Bar) -> TriggerResult {
    let (touched, opened_better) = match side {
        OrderSide::Buy => (bar.low <= limit, bar.open <= limit),
        OrderSide::Sell => (bar.high >= limit, bar.open >= limit),
    };
    if !touched {
        return TriggerResult::NoTrigger;
    }
    TriggerResult::Fill {
        price: if opened_better { bar.open } else { limit },
        gap_through: opened_better,
    }
}

fn resolve_gap(side: OrderSide, open: f64, stop: f64, policy: GapPolicy) -> f64 {
    match (policy, side) {
        (GapPolicy::FillAtOpen, _) => open,
        (GapPolicy::FillAtTrigger, _) => stop,
        (GapPolicy::FillAtWorst, OrderSide::Buy) => open.max(stop),
        (GapPolicy::FillAtWorst, OrderSide::Sell) => open.min(stop),
    }
}
