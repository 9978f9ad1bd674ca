//! OrderBook payload
//!
//! One global `OrderBook` contract per trading pair, owned by the operator
//! and observable by the public party. Mutations archive the current
//! contract and create a successor, so a cached contract id can always be
//! stale; callers tolerate `Conflict` and refresh.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradingPair;

/// Payload of the on-ledger `OrderBook` template.
///
/// `buy_orders` / `sell_orders` hold Order contract ids in ledger insertion
/// order; priority ordering is computed from the referenced Order payloads,
/// not from list position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBook {
    pub pair: TradingPair,
    pub buy_orders: Vec<String>,
    pub sell_orders: Vec<String>,
    #[serde(
        default,
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_price: Option<Decimal>,
    pub operator: String,
}

impl OrderBook {
    pub fn contains_order(&self, contract_id: &str) -> bool {
        self.buy_orders.iter().any(|c| c == contract_id)
            || self.sell_orders.iter().any(|c| c == contract_id)
    }

    pub fn depth(&self) -> (usize, usize) {
        (self.buy_orders.len(), self.sell_orders.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook {
            pair: TradingPair::parse("BTC/USDT").unwrap(),
            buy_orders: vec!["#b1".into(), "#b2".into()],
            sell_orders: vec!["#s1".into()],
            last_price: None,
            operator: "operator".into(),
        }
    }

    #[test]
    fn contains_checks_both_sides() {
        let book = book();
        assert!(book.contains_order("#b2"));
        assert!(book.contains_order("#s1"));
        assert!(!book.contains_order("#s2"));
    }

    #[test]
    fn absent_last_price_is_omitted() {
        let json = serde_json::to_value(book()).unwrap();
        assert!(json.get("lastPrice").is_none());
        assert_eq!(json["buyOrders"][0], "#b1");
    }
}
