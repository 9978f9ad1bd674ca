//! Order Matching
//!
//! Price-time priority matching, split into a pure candidate-selection
//! core and the per-pair sweeper workers that execute its plans against
//! the ledger.

mod candidate;
mod engine;

pub use candidate::{select, sort_buys, sort_sells, BookOrder, MatchPlan, Selection};
pub use engine::{EngineConfig, MatchingEngine};
