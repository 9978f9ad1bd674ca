//! Admin Surface
//!
//! Operator-scoped management: per-pair order book creation, bulk pair
//! seeding at startup, and the health report.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::events::EventHub;
use crate::ledger::{Command, LedgerClient, LedgerError, ORDER_BOOK_ENTITY};
use crate::models::TradingPair;
use crate::repository::{BookRepository, OrderBookContract};
use crate::services::matching::MatchingEngine;

use super::error::ServiceError;

/// Heartbeats older than this mark the report degraded.
const STALE_HEARTBEAT_SECS: i64 = 30;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookArgs<'a> {
    pair: &'a TradingPair,
    buy_orders: Vec<String>,
    sell_orders: Vec<String>,
    operator: &'a str,
    /// Observer party that makes the book visible to every user.
    public: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub gateway_connected: bool,
    pub stream_offset: u64,
    /// Seconds since each matching worker's last sweep.
    pub matching_heartbeats: HashMap<String, i64>,
}

pub struct AdminService {
    ledger: Arc<LedgerClient>,
    repository: Arc<BookRepository>,
    engine: Arc<MatchingEngine>,
    hub: Arc<EventHub>,
    public_party: String,
}

impl AdminService {
    pub fn new(
        ledger: Arc<LedgerClient>,
        repository: Arc<BookRepository>,
        engine: Arc<MatchingEngine>,
        hub: Arc<EventHub>,
        public_party: &str,
    ) -> Self {
        Self {
            ledger,
            repository,
            engine,
            hub,
            public_party: public_party.to_string(),
        }
    }

    /// Create the order book for `pair`, or return the existing one.
    /// Always ensures a matching worker is running for the pair.
    pub async fn create_order_book(
        &self,
        pair: &TradingPair,
    ) -> Result<OrderBookContract, ServiceError> {
        if let Some(existing) = self.repository.current(pair).await? {
            self.engine.ensure_worker(pair.clone());
            return Ok(existing);
        }

        let operator = self.ledger.operator_party().to_string();
        let command = Command::Create {
            template_id: self.ledger.order_book_template().await?,
            payload: serde_json::to_value(CreateBookArgs {
                pair,
                buy_orders: Vec::new(),
                sell_orders: Vec::new(),
                operator: &operator,
                public: &self.public_party,
            })
            .map_err(|e| LedgerError::Internal(e.to_string()))?,
        };

        let command_id = format!("create-book:{}", pair);
        let result = self
            .ledger
            .submit(vec![command], &[operator], &command_id)
            .await?;

        let created = result.find_created(ORDER_BOOK_ENTITY).ok_or_else(|| {
            LedgerError::Internal("book creation produced no OrderBook event".to_string())
        })?;
        let contract = OrderBookContract {
            contract_id: created.contract_id.clone(),
            book: created.decode()?,
        };

        self.repository
            .apply_event(contract.clone(), result.update_offset);
        self.engine.ensure_worker(pair.clone());

        tracing::info!(pair = %pair, contract_id = contract.contract_id, "Order book created");
        Ok(contract)
    }

    /// Bulk creation for startup bootstrap. Failures are logged per pair
    /// so one bad entry cannot block the rest.
    pub async fn seed_pairs(&self, pairs: &[TradingPair]) -> usize {
        let mut seeded = 0;
        for pair in pairs {
            match self.create_order_book(pair).await {
                Ok(_) => seeded += 1,
                Err(e) => {
                    tracing::error!(pair = %pair, "Failed to seed order book: {}", e);
                }
            }
        }
        seeded
    }

    pub async fn health(&self) -> HealthReport {
        let gateway_connected = self.ledger.probe().await.is_ok();
        let matching_heartbeats = self.engine.heartbeat_ages();

        let workers_healthy = matching_heartbeats
            .values()
            .all(|age| *age <= STALE_HEARTBEAT_SECS);
        let status = if gateway_connected && workers_healthy {
            "ok"
        } else {
            "degraded"
        };

        HealthReport {
            status,
            gateway_connected,
            stream_offset: self.hub.last_offset(),
            matching_heartbeats,
        }
    }
}
