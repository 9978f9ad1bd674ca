//! Holding payload and derived balance view
//!
//! Holdings are owned by the external token layer; the exchange consumes
//! two of its choices (`Lock`, and transfer-and-split under settlement) and
//! otherwise only reads payloads to derive balances.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payload of the external `Holding` template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub owner: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Order id this holding is locked against; absent for free holdings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_for_order: Option<String>,
    pub operator: String,
}

impl Holding {
    pub fn is_locked(&self) -> bool {
        self.locked_for_order.is_some()
    }
}

/// Per-party balance view derived by summing unlocked holdings per symbol.
/// Never persisted; recomputed from active contracts on each read.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BalanceView {
    pub available: BTreeMap<String, Decimal>,
}

impl BalanceView {
    pub fn from_holdings<'a>(holdings: impl IntoIterator<Item = &'a Holding>) -> Self {
        let mut available: BTreeMap<String, Decimal> = BTreeMap::new();
        for holding in holdings {
            if !holding.is_locked() {
                *available.entry(holding.symbol.clone()).or_default() += holding.amount;
            }
        }
        BalanceView { available }
    }

    pub fn available_for(&self, symbol: &str) -> Decimal {
        self.available.get(symbol).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn holding(symbol: &str, amount: Decimal, locked_for: Option<&str>) -> Holding {
        Holding {
            owner: "alice".into(),
            symbol: symbol.into(),
            amount,
            locked_for_order: locked_for.map(String::from),
            operator: "operator".into(),
        }
    }

    #[test]
    fn balance_sums_unlocked_per_symbol() {
        let holdings = vec![
            holding("USDT", dec!(100), None),
            holding("USDT", dec!(50), None),
            holding("USDT", dec!(25), Some("o-1")),
            holding("BTC", dec!(2), None),
        ];

        let view = BalanceView::from_holdings(&holdings);
        assert_eq!(view.available_for("USDT"), dec!(150));
        assert_eq!(view.available_for("BTC"), dec!(2));
        assert_eq!(view.available_for("ETH"), dec!(0));
    }
}
