//! Which matching phase an order belongs to, and the order of evaluation
//! within a phase.

use crate::domain::{Bar, Order, OrderStatus, OrderType};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchPhase {
    Market,
    Stop,
    Limit,
}

pub fn phase_of(order: &Order) -> MatchPhase {
    match (order.order_type, &order.status) {
        (OrderType::Market, _) => MatchPhase::Market,
        (OrderType::Stop { .. }, _) => MatchPhase::Stop,
        (OrderType::StopLimit { .. }, OrderStatus::Pending) => MatchPhase::Stop,
        (OrderType::Limit { .. }, _) | (OrderType::StopLimit { .. }, _) => MatchPhase::Limit,
    }
}

/// Price the phase compares against the open.
fn phase_price(order: &Order) -> Option<f64> {
    match (order.order_type, &order.status) {
        (OrderType::Market, _) => None,
        (OrderType::Stop { stop_price }, _) => Some(stop_price),
        (OrderType::StopLimit { stop_price, .. }, OrderStatus::Pending) => Some(stop_price),
        (OrderType::Limit { limit_price }, _) | (OrderType::StopLimit { limit_price, .. }, _) => {
            Some(limit_price)
        }
    }
}

/// Market orders in submission order; priced orders nearest to the open first,
/// ties broken by submission order.
pub fn evaluation_cmp(a: &Order, b: &Order, bar: &Bar) -> Ordering {
    let distance = |o: &Order| phase_price(o).map_or(0.0, |p| (p - bar.open).abs());
    distance(a)
        .partial_cmp(&distance(b))
        .unwrap_or(Ordering::Equal)
        .then(a.id.cmp(&b.id))
}
