//! Order, Trade and TradingPair payloads
//!
//! These mirror the on-ledger `Order` and `Trade` templates. The ledger is
//! the source of truth; everything here is a typed view of its payloads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Trading Pair
// ============================================================================

/// Canonical `"BASE/QUOTE"` trading pair identifier, always uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair(String);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid trading pair {0:?}: expected BASE/QUOTE")]
pub struct TradingPairError(pub String);

impl TradingPair {
    pub fn parse(raw: &str) -> Result<Self, TradingPairError> {
        let canonical = raw.trim().to_uppercase();
        match canonical.split_once('/') {
            Some((base, quote))
                if !base.is_empty()
                    && !quote.is_empty()
                    && base.chars().all(|c| c.is_ascii_alphanumeric())
                    && quote.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Ok(TradingPair(canonical))
            }
            _ => Err(TradingPairError(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Token symbol being bought and sold.
    pub fn base(&self) -> &str {
        self.0.split_once('/').map(|(b, _)| b).unwrap_or(&self.0)
    }

    /// Token symbol prices are quoted in.
    pub fn quote(&self) -> &str {
        self.0.split_once('/').map(|(_, q)| q).unwrap_or(&self.0)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TradingPair {
    type Error = TradingPairError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        TradingPair::parse(&raw)
    }
}

impl From<TradingPair> for String {
    fn from(pair: TradingPair) -> String {
        pair.0
    }
}

// ============================================================================
// Order enums
// ============================================================================

/// Order side, `BUY`/`SELL` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order mode, `LIMIT`/`MARKET` on the wire. MARKET orders carry no price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderMode {
    Limit,
    Market,
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderMode::Limit => write!(f, "LIMIT"),
            OrderMode::Market => write!(f, "MARKET"),
        }
    }
}

/// Order lifecycle status. FILLED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "OPEN"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ============================================================================
// Order payload
// ============================================================================

/// Payload of the on-ledger `Order` template.
///
/// Invariants enforced by the ledger choices, asserted here defensively:
/// `0 <= filled <= quantity`, `filled == quantity <=> status == FILLED`,
/// price present iff mode is LIMIT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub owner: String,
    pub side: Side,
    pub mode: OrderMode,
    pub pair: TradingPair,
    #[serde(
        default,
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled: Decimal,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub locked_holding_ref: String,
    pub operator: String,
}

impl Order {
    /// Unexecuted portion of the order.
    pub fn remaining(&self) -> Decimal {
        self.quantity - self.filled
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// Derive the id of the remainder order synthesised for the unexecuted
/// portion of `order_id`. `"abc"` -> `"abc-R1"`, `"abc-R1"` -> `"abc-R2"`.
pub fn remainder_id(order_id: &str) -> String {
    match split_remainder(order_id) {
        Some((root, seq)) => format!("{}-R{}", root, seq + 1),
        None => format!("{}-R1", order_id),
    }
}

/// Strip any `-R<seq>` suffix, returning the id of the original order a
/// remainder chain descends from.
pub fn root_order_id(order_id: &str) -> &str {
    match split_remainder(order_id) {
        Some((root, _)) => root,
        None => order_id,
    }
}

fn split_remainder(order_id: &str) -> Option<(&str, u32)> {
    let (root, suffix) = order_id.rsplit_once("-R")?;
    if root.is_empty() || suffix.is_empty() {
        return None;
    }
    let seq = suffix.parse().ok()?;
    Some((root, seq))
}

// ============================================================================
// Trade payload
// ============================================================================

/// Payload of the on-ledger `Trade` template. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub trade_id: String,
    pub buyer: String,
    pub seller: String,
    pub pair: TradingPair,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pair_parses_and_canonicalises() {
        let pair = TradingPair::parse("btc/usdt").unwrap();
        assert_eq!(pair.as_str(), "BTC/USDT");
        assert_eq!(pair.base(), "BTC");
        assert_eq!(pair.quote(), "USDT");
    }

    #[test]
    fn pair_rejects_malformed() {
        assert!(TradingPair::parse("BTCUSDT").is_err());
        assert!(TradingPair::parse("/USDT").is_err());
        assert!(TradingPair::parse("BTC/").is_err());
        assert!(TradingPair::parse("BTC/US DT").is_err());
    }

    #[test]
    fn remainder_id_sequence() {
        assert_eq!(remainder_id("abc"), "abc-R1");
        assert_eq!(remainder_id("abc-R1"), "abc-R2");
        assert_eq!(remainder_id("abc-R9"), "abc-R10");
    }

    #[test]
    fn root_id_strips_remainder_chain() {
        assert_eq!(root_order_id("abc"), "abc");
        assert_eq!(root_order_id("abc-R1"), "abc");
        assert_eq!(root_order_id("abc-R12"), "abc");
        // A non-numeric suffix is part of the id, not a remainder marker.
        assert_eq!(root_order_id("abc-Rx"), "abc-Rx");
    }

    #[test]
    fn order_serialises_decimals_as_strings() {
        let order = Order {
            order_id: "o-1".into(),
            owner: "alice".into(),
            side: Side::Sell,
            mode: OrderMode::Limit,
            pair: TradingPair::parse("BTC/USDT").unwrap(),
            price: Some(dec!(50000)),
            quantity: dec!(1.5),
            filled: dec!(0.5),
            status: OrderStatus::Open,
            timestamp: Utc::now(),
            locked_holding_ref: "#h-1".into(),
            operator: "operator".into(),
        };

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["price"], "50000");
        assert_eq!(json["quantity"], "1.5");
        assert_eq!(json["side"], "SELL");
        assert_eq!(json["status"], "OPEN");
    }

    #[test]
    fn market_order_omits_price() {
        let order = Order {
            order_id: "o-2".into(),
            owner: "bob".into(),
            side: Side::Buy,
            mode: OrderMode::Market,
            pair: TradingPair::parse("BTC/USDT").unwrap(),
            price: None,
            quantity: dec!(1),
            filled: dec!(0),
            status: OrderStatus::Open,
            timestamp: Utc::now(),
            locked_holding_ref: "#h-2".into(),
            operator: "operator".into(),
        };

        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("price").is_none());
        assert_eq!(json["mode"], "MARKET");
    }

    #[test]
    fn order_remaining() {
        let order = Order {
            order_id: "o-3".into(),
            owner: "bob".into(),
            side: Side::Buy,
            mode: OrderMode::Limit,
            pair: TradingPair::parse("ETH/USDT").unwrap(),
            price: Some(dec!(3000)),
            quantity: dec!(10),
            filled: dec!(4),
            status: OrderStatus::Open,
            timestamp: Utc::now(),
            locked_holding_ref: "#h-3".into(),
            operator: "operator".into(),
        };
        assert_eq!(order.remaining(), dec!(6));
    }
}
