//! Domain Models
//!
//! Ledger-facing payload types shared by the gateway, the matching engine
//! and the API layer. Decimals cross every process boundary as strings;
//! optional fields are omitted when absent, never serialised as null.

mod book;
mod holding;
mod order;

pub use book::OrderBook;
pub use holding::{BalanceView, Holding};
pub use order::{
    remainder_id, root_order_id, Order, OrderMode, OrderStatus, Side, Trade, TradingPair,
    TradingPairError,
};
