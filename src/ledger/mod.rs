//! Ledger Gateway
//!
//! Typed access to the ledger's submit/query/stream APIs. Commands carry
//! caller-chosen command ids for idempotency, queries are always
//! party-scoped, and the update stream is strictly monotone in offset.

mod client;
mod error;
mod packages;
mod stream;
mod types;

pub use client::{
    LedgerClient, EXCHANGE_MODULE, HOLDING_ENTITY, ORDER_BOOK_ENTITY, ORDER_ENTITY, TOKEN_MODULE,
    TRADE_ENTITY,
};
pub use error::LedgerError;
pub use stream::spawn_update_stream;
pub use types::{
    ActiveContract, ArchivedEvent, Command, CreatedEvent, ExercisedEvent, LedgerEvent,
    LedgerUpdate, QueryRequest, SubmitResult, TemplateId,
};
