use serde::{Deserialize, Serialize};
use std::fmt;

/// Order identifier, assigned sequentially by the order book.
///
/// Ids are monotonic within a run, so ordering by id is submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order#{}", self.0)
    }
}

/// Trade identifier, assigned sequentially by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        assert_eq!(OrderId(7).to_string(), "order#7");
        assert_eq!(TradeId(3).to_string(), "trade#3");
    }

    #[test]
    fn order_ids_sort_by_submission() {
        let mut ids = vec![OrderId(3), OrderId(1), OrderId(2)];
        ids.sort();
        assert_eq!(ids, vec![OrderId(1), OrderId(2), OrderId(3)]);
    }
}
