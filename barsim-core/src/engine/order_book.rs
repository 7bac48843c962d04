//! Order book state machine: order storage, lifecycle transitions and the
//! audit trail.
//!
//! Transitions: Pending -> Triggered (stop-limits) -> Filled / Canceled /
//! Expired / Rejected. Final states never change again, so an order fills at
//! most once. The book does not price fills and knows nothing about trades;
//! the broker drives it.

use crate::domain::{Order, OrderAuditEntry, OrderId, OrderStatus, OrderType};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OrderBookError {
    #[error("{0} not found")]
    NotFound(OrderId),

    #[error("{id} is not active (status: {status})")]
    NotActive { id: OrderId, status: OrderStatus },

    #[error("{0} is not a pending stop-limit")]
    NotTriggerable(OrderId),
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// Every order ever submitted, in id (= submission) order.
    orders: BTreeMap<OrderId, Order>,
    next_id: u64,
    audit_trail: Vec<OrderAuditEntry>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next order id.
    pub fn next_id(&mut self) -> OrderId {
        self.next_id += 1;
        OrderId(self.next_id)
    }

    pub fn insert(&mut self, order: Order) {
        debug_assert!(order.status == OrderStatus::Pending, "new orders start Pending");
        self.orders.insert(order.id, order);
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Active orders in submission order.
    pub fn active(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.is_active())
    }

    pub fn active_ids(&self) -> Vec<OrderId> {
        self.active().map(|o| o.id).collect()
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }

    /// Stop-limit: Pending -> Triggered.
    pub fn trigger(&mut self, id: OrderId, bar_index: usize) -> Result<(), OrderBookError> {
        let order = self.active_order(id)?;
        if order.status != OrderStatus::Pending
            || !matches!(order.order_type, OrderType::StopLimit { .. })
        {
            return Err(OrderBookError::NotTriggerable(id));
        }
        self.transition(id, OrderStatus::Triggered, bar_index)
    }

    pub fn record_fill(
        &mut self,
        id: OrderId,
        size: f64,
        price: f64,
        bar_index: usize,
    ) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Filled, bar_index)?;
        if let Some(order) = self.orders.get_mut(&id) {
            order.filled_size = size;
            order.fill_price = Some(price);
            order.fill_bar = Some(bar_index);
        }
        Ok(())
    }

    pub fn cancel(
        &mut self,
        id: OrderId,
        bar_index: usize,
        reason: &str,
    ) -> Result<(), OrderBookError> {
        self.transition(id, Self::canceled(reason), bar_index)
    }

    pub fn expire(&mut self, id: OrderId, bar_index: usize) -> Result<(), OrderBookError> {
        self.transition(id, OrderStatus::Expired, bar_index)
    }

    pub fn reject(
        &mut self,
        id: OrderId,
        bar_index: usize,
        reason: &str,
    ) -> Result<(), OrderBookError> {
        self.transition(
            id,
            OrderStatus::Rejected {
                reason: reason.to_string(),
            },
            bar_index,
        )
    }

    /// Atomic cancel/replace: the old order is canceled and the new one
    /// inserted in one step, inheriting the old order's eligibility so the
    /// replacement can still match on the current bar. If `old_id` is no
    /// longer active the replacement is inserted unchanged.
    pub fn replace(
        &mut self,
        old_id: OrderId,
        mut replacement: Order,
        bar_index: usize,
    ) -> OrderId {
        let inherited = self.active_order(old_id).ok().map(|o| o.eligible_from);
        if let Some(eligible_from) = inherited {
            replacement.eligible_from = eligible_from;
            self.set_status(old_id, Self::canceled("replaced"), bar_index);
        }
        let new_id = replacement.id;
        self.insert(replacement);
        new_id
    }

    /// Cancel `id` if it is still active. Returns whether it was.
    pub fn cancel_if_active(&mut self, id: OrderId, bar_index: usize, reason: &str) -> bool {
        !self
            .cancel_matching(bar_index, reason, |o| o.id == id)
            .is_empty()
    }

    /// Cancel every active order matching `pred`, returning their ids.
    pub fn cancel_matching<P>(&mut self, bar_index: usize, reason: &str, pred: P) -> Vec<OrderId>
    where
        P: Fn(&Order) -> bool,
    {
        self.transition_matching(bar_index, Self::canceled(reason), pred)
    }

    /// Expire every active order matching `pred`, returning their ids.
    pub fn expire_matching<P>(&mut self, bar_index: usize, pred: P) -> Vec<OrderId>
    where
        P: Fn(&Order) -> bool,
    {
        self.transition_matching(bar_index, OrderStatus::Expired, pred)
    }

    pub fn into_parts(self) -> (Vec<Order>, Vec<OrderAuditEntry>) {
        (self.orders.into_values().collect(), self.audit_trail)
    }

    fn canceled(reason: &str) -> OrderStatus {
        OrderStatus::Canceled {
            reason: reason.to_string(),
        }
    }

    fn transition_matching<P>(&mut self, bar_index: usize, to: OrderStatus, pred: P) -> Vec<OrderId>
    where
        P: Fn(&Order) -> bool,
    {
        let ids: Vec<OrderId> = self
            .active()
            .filter(|o| pred(*o))
            .map(|o| o.id)
            .collect();
        for &id in &ids {
            self.set_status(id, to.clone(), bar_index);
        }
        ids
    }

    fn active_order(&self, id: OrderId) -> Result<&Order, OrderBookError> {
        let order = self.orders.get(&id).ok_or(OrderBookError::NotFound(id))?;
        if !order.is_active() {
            return Err(OrderBookError::NotActive {
                id,
                status: order.status.clone(),
            });
        }
        Ok(order)
    }

    fn transition(
        &mut self,
        id: OrderId,
        to: OrderStatus,
        bar_index: usize,
    ) -> Result<(), OrderBookError> {
        self.active_order(id)?;
        self.set_status(id, to, bar_index);
        Ok(())
    }

    fn set_status(&mut self, id: OrderId, to: OrderStatus, bar_index: usize) {
        if let Some(order) = self.orders.get_mut(&id) {
            let from = std::mem::replace(&mut order.status, to.clone());
            self.audit_trail.push(OrderAuditEntry {
                order_id: id,
                bar_index,
                from_status: from,
                to_status: to,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitPlan, Lifetime, OrderRole, OrderSide, OrderSize};
    use chrono::TimeZone;

    fn order(book: &mut OrderBook, order_type: OrderType) -> Order {
        Order {
            id: book.next_id(),
            side: OrderSide::Buy,
            order_type,
            size: OrderSize::Units(10.0),
            status: OrderStatus::Pending,
            role: OrderRole::Entry,
            lifetime: Lifetime::GoodTillCanceled,
            exit_plan: ExitPlan::default(),
            tag: None,
            created_bar: 0,
            created_at: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            eligible_from: 1,
            filled_size: 0.0,
            fill_price: None,
            fill_bar: None,
        }
    }

    #[test]
    fn ids_are_sequential() {
        let mut book = OrderBook::new();
        assert_eq!(book.next_id(), OrderId(1));
        assert_eq!(book.next_id(), OrderId(2));
    }

    #[test]
    fn fill_is_final() {
        let mut book = OrderBook::new();
        let o = order(&mut book, OrderType::Market);
        let id = o.id;
        book.insert(o);
        book.record_fill(id, 10.0, 101.0, 1).unwrap();
        assert_eq!(book.get(id).unwrap().fill_price, Some(101.0));
        assert!(matches!(
            book.record_fill(id, 10.0, 101.0, 2),
            Err(OrderBookError::NotActive { .. })
        ));
        assert!(book.cancel(id, 2, "late").is_err());
        assert_eq!(book.audit_trail().len(), 1);
    }

    #[test]
    fn stop_limit_triggers_once() {
        let mut book = OrderBook::new();
        let o = order(
            &mut book,
            OrderType::StopLimit {
                stop_price: 105.0,
                limit_price: 106.0,
            },
        );
        let id = o.id;
        book.insert(o);
        book.trigger(id, 1).unwrap();
        assert_eq!(book.get(id).unwrap().status, OrderStatus::Triggered);
        assert_eq!(book.trigger(id, 1), Err(OrderBookError::NotTriggerable(id)));

        let plain = order(&mut book, OrderType::Limit { limit_price: 99.0 });
        let plain_id = plain.id;
        book.insert(plain);
        assert_eq!(
            book.trigger(plain_id, 1),
            Err(OrderBookError::NotTriggerable(plain_id))
        );
    }

    #[test]
    fn replace_inherits_eligibility() {
        let mut book = OrderBook::new();
        let mut old = order(&mut book, OrderType::Stop { stop_price: 95.0 });
        old.eligible_from = 3;
        let old_id = old.id;
        book.insert(old);

        let mut new = order(&mut book, OrderType::Stop { stop_price: 97.0 });
        new.eligible_from = 99;
        let new_id = book.replace(old_id, new, 5);

        assert_eq!(
            book.get(old_id).unwrap().status,
            OrderStatus::Canceled {
                reason: "replaced".into()
            }
        );
        assert_eq!(book.get(new_id).unwrap().eligible_from, 3);
        assert_eq!(book.active_ids(), vec![new_id]);
    }

    #[test]
    fn bulk_cancel_and_expire_skip_final_orders() {
        let mut book = OrderBook::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let o = order(&mut book, OrderType::Market);
            ids.push(o.id);
            book.insert(o);
        }
        book.record_fill(ids[0], 10.0, 100.0, 1).unwrap();

        let expired = book.expire_matching(2, |o| o.id == ids[1]);
        assert_eq!(expired, vec![ids[1]]);
        let canceled = book.cancel_matching(2, "done", |_| true);
        assert_eq!(canceled, vec![ids[2]]);
        assert!(!book.cancel_if_active(ids[0], 2, "again"));
        assert_eq!(book.active().count(), 0);
        assert_eq!(book.audit_trail().len(), 3);
    }

    #[test]
    fn replace_of_final_order_inserts_as_is() {
        let mut book = OrderBook::new();
        let old = order(&mut book, OrderType::Limit { limit_price: 99.0 });
        let old_id = old.id;
        book.insert(old);
        book.cancel(old_id, 1, "gone").unwrap();

        let mut new = order(&mut book, OrderType::Limit { limit_price: 98.0 });
        new.eligible_from = 7;
        let new_id = book.replace(old_id, new, 2);
        assert_eq!(book.get(new_id).unwrap().eligible_from, 7);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let mut book = OrderBook::new();
        assert_eq!(
            book.expire(OrderId(42), 0),
            Err(OrderBookError::NotFound(OrderId(42)))
        );
    }
}
