//! Service-level error taxonomy
//!
//! Returned by the lifecycle and admin services; the API layer maps these
//! onto HTTP statuses. Ledger errors pass through with their own kinds.

use rust_decimal::Decimal;

use crate::ledger::LedgerError;
use crate::models::{OrderStatus, TradingPair};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Input failed preconditions; no side effect happened.
    #[error("{0}")]
    Validation(String),

    #[error("no order book exists for pair {0}")]
    BookNotFound(TradingPair),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {order_id} is already {status}")]
    AlreadyTerminal {
        order_id: String,
        status: OrderStatus,
    },

    #[error("insufficient unlocked {symbol} holdings: need {needed}")]
    InsufficientHoldings { symbol: String, needed: Decimal },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
