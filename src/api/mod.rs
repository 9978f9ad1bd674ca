//! Public HTTP API
//!
//! Read endpoints compute from the repository and party-scoped queries;
//! write endpoints delegate to the lifecycle service. No handler issues a
//! ledger command directly.

pub mod handlers;
pub mod routes;
pub mod views;
