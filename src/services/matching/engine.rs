//! Matching Engine
//!
//! One cooperative worker per trading pair. Each worker loops: fetch the
//! current book, pick the best buy/sell candidate under price-time
//! priority, exercise the settlement choice; on progress it sweeps again
//! immediately, otherwise it sleeps for the configured interval. A pair
//! never has two concurrent match attempts because the worker task is the
//! only writer for its pair.
//!
//! The engine is the sole producer of Trade contracts. It never surfaces
//! errors to API callers; it logs, retries and moves on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::ledger::{Command, LedgerClient, LedgerError};
use crate::metrics::{
    MATCHING_CONFLICTS_TOTAL, MATCHING_STALLED, MATCHING_SWEEPS_TOTAL, MATCHING_TRADES_TOTAL,
};
use crate::models::{remainder_id, Order, OrderStatus, TradingPair};
use crate::repository::{BookRepository, OrderBookContract};

use super::candidate::{self, BookOrder, MatchPlan, Selection};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sweep_interval: Duration,
    pub max_conflict_retries: u32,
    pub stall_warn_after: Duration,
}

/// Arguments of the composite `OrderBook.Match` choice. The ledger performs
/// trade creation, holding transfers, fill accounting, remainder synthesis
/// and the lastPrice update atomically. Remainder ids are supplied for any
/// partially filled side so successor orders get deterministic identifiers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchArgs<'a> {
    buy_order_cid: &'a str,
    sell_order_cid: &'a str,
    trade_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    quantity: Decimal,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buy_remainder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sell_remainder_id: Option<String>,
}

enum SweepOutcome {
    /// A trade settled; sweep again immediately.
    Progress,
    /// Conflict on the settlement; book refreshed, sweep again.
    Retry,
    /// Nothing to do. `both_sides` reports whether both sides were
    /// populated, which feeds stall detection.
    Idle { both_sides: bool },
}

pub struct MatchingEngine {
    ledger: Arc<LedgerClient>,
    repository: Arc<BookRepository>,
    config: EngineConfig,
    /// Worker liveness stamps, read by the admin health report.
    heartbeats: DashMap<TradingPair, DateTime<Utc>>,
    /// Pairs with a running worker; guards against double-spawning.
    workers: DashMap<TradingPair, ()>,
}

impl MatchingEngine {
    pub fn new(
        ledger: Arc<LedgerClient>,
        repository: Arc<BookRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            repository,
            config,
            heartbeats: DashMap::new(),
            workers: DashMap::new(),
        }
    }

    /// Start the sweeper for `pair` unless one is already running.
    pub fn ensure_worker(self: &Arc<Self>, pair: TradingPair) {
        if self.workers.insert(pair.clone(), ()).is_some() {
            return;
        }
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(pair = %pair, "Matching worker started");
            engine.run_worker(pair).await;
        });
    }

    /// Heartbeat age per pair in seconds, for the health report.
    pub fn heartbeat_ages(&self) -> HashMap<String, i64> {
        let now = Utc::now();
        self.heartbeats
            .iter()
            .map(|entry| {
                (
                    entry.key().to_string(),
                    (now - *entry.value()).num_seconds(),
                )
            })
            .collect()
    }

    async fn run_worker(self: Arc<Self>, pair: TradingPair) {
        let mut conflict_streak: u32 = 0;
        let mut stalled_since: Option<Instant> = None;

        loop {
            self.heartbeats.insert(pair.clone(), Utc::now());
            metrics::counter!(MATCHING_SWEEPS_TOTAL, "pair" => pair.to_string())
                .increment(1);

            match self.sweep(&pair).await {
                Ok(SweepOutcome::Progress) => {
                    conflict_streak = 0;
                    stalled_since = None;
                    metrics::gauge!(MATCHING_STALLED, "pair" => pair.to_string()).set(0.0);
                    continue;
                }
                Ok(SweepOutcome::Retry) => {
                    conflict_streak += 1;
                    metrics::counter!(MATCHING_CONFLICTS_TOTAL, "pair" => pair.to_string())
                        .increment(1);
                    if conflict_streak >= self.config.max_conflict_retries {
                        // Liveness guard: stop hammering a contended book.
                        tracing::error!(
                            pair = %pair,
                            conflicts = conflict_streak,
                            "Giving up on contended candidate until next sweep"
                        );
                        conflict_streak = 0;
                    } else {
                        continue;
                    }
                }
                Ok(SweepOutcome::Idle { both_sides }) => {
                    conflict_streak = 0;
                    if both_sides {
                        let since = stalled_since.get_or_insert_with(Instant::now);
                        if since.elapsed() >= self.config.stall_warn_after {
                            tracing::warn!(
                                pair = %pair,
                                stalled_secs = since.elapsed().as_secs(),
                                "Both book sides populated but unmatchable; cached book may be stale"
                            );
                            metrics::gauge!(MATCHING_STALLED, "pair" => pair.to_string())
                                .set(1.0);
                            stalled_since = Some(Instant::now());
                        }
                    } else {
                        stalled_since = None;
                        metrics::gauge!(MATCHING_STALLED, "pair" => pair.to_string())
                            .set(0.0);
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(pair = %pair, "Sweep failed, retrying next interval: {}", e);
                    self.repository.invalidate(&pair);
                }
                Err(e) => {
                    tracing::error!(pair = %pair, "Sweep failed: {}", e);
                }
            }

            tokio::time::sleep(self.config.sweep_interval).await;
        }
    }

    async fn sweep(&self, pair: &TradingPair) -> Result<SweepOutcome, LedgerError> {
        let Some(contract) = self.repository.current(pair).await? else {
            tracing::debug!(pair = %pair, "No order book on ledger");
            return Ok(SweepOutcome::Idle { both_sides: false });
        };

        let (mut buys, mut sells) = self.load_sides(&contract).await?;
        candidate::sort_buys(&mut buys);
        candidate::sort_sells(&mut sells);
        let both_sides = !buys.is_empty() && !sells.is_empty();

        match candidate::select(&buys, &sells, contract.book.last_price) {
            Selection::NoMatch => Ok(SweepOutcome::Idle { both_sides }),
            Selection::PriceUnavailable { buy_id, sell_id } => {
                tracing::error!(
                    pair = %pair,
                    buy_id,
                    sell_id,
                    "No trade price derivable for crossed MARKET orders and no last price"
                );
                Ok(SweepOutcome::Idle { both_sides })
            }
            Selection::Match(plan) => self.settle(pair, &contract, &plan).await,
        }
    }

    /// Resolve the book's order references into payloads.
    async fn load_sides(
        &self,
        contract: &OrderBookContract,
    ) -> Result<(Vec<BookOrder>, Vec<BookOrder>), LedgerError> {
        let template = self.ledger.order_template().await?;
        let active = self
            .ledger
            .query_active(&[template], self.ledger.operator_party())
            .await?;

        let mut by_cid: HashMap<String, Order> = HashMap::new();
        for entry in active {
            by_cid.insert(entry.contract_id.clone(), entry.decode()?);
        }

        let resolve = |cids: &[String]| -> Vec<BookOrder> {
            cids.iter()
                .filter_map(|cid| match by_cid.get(cid) {
                    Some(order) if order.status == OrderStatus::Open => Some(BookOrder {
                        contract_id: cid.clone(),
                        order: order.clone(),
                    }),
                    Some(order) => {
                        tracing::warn!(
                            order_id = order.order_id,
                            status = %order.status,
                            "Book references a non-open order"
                        );
                        None
                    }
                    None => {
                        // The book and the order query raced; the next sweep
                        // sees a consistent view.
                        tracing::debug!(contract_id = cid, "Book references unknown order contract");
                        None
                    }
                })
                .collect()
        };

        Ok((
            resolve(&contract.book.buy_orders),
            resolve(&contract.book.sell_orders),
        ))
    }

    async fn settle(
        &self,
        pair: &TradingPair,
        contract: &OrderBookContract,
        plan: &MatchPlan,
    ) -> Result<SweepOutcome, LedgerError> {
        let remainder = |order: &Order| {
            (order.remaining() > plan.quantity).then(|| remainder_id(&order.order_id))
        };
        let args = MatchArgs {
            buy_order_cid: &plan.buy.contract_id,
            sell_order_cid: &plan.sell.contract_id,
            trade_id: Uuid::new_v4().to_string(),
            price: plan.price,
            quantity: plan.quantity,
            timestamp: Utc::now(),
            buy_remainder_id: remainder(&plan.buy.order),
            sell_remainder_id: remainder(&plan.sell.order),
        };
        // The command id pins this settlement intent to the book version it
        // was computed against; a refreshed book gets a fresh id.
        let command_id = format!(
            "match:{}:{}:{}",
            plan.buy.order.order_id, plan.sell.order.order_id, contract.contract_id
        );

        let template = self.ledger.order_book_template().await?;
        let command = Command::Exercise {
            template_id: template,
            contract_id: contract.contract_id.clone(),
            choice: "Match".to_string(),
            argument: serde_json::to_value(&args)
                .map_err(|e| LedgerError::Internal(e.to_string()))?,
        };

        let act_as = vec![self.ledger.operator_party().to_string()];
        match self.ledger.submit(vec![command], &act_as, &command_id).await {
            Ok(result) => {
                metrics::counter!(MATCHING_TRADES_TOTAL, "pair" => pair.to_string())
                    .increment(1);
                tracing::info!(
                    pair = %pair,
                    buy = plan.buy.order.order_id,
                    sell = plan.sell.order.order_id,
                    price = %plan.price,
                    quantity = %plan.quantity,
                    offset = result.update_offset,
                    "Trade settled"
                );
                Ok(SweepOutcome::Progress)
            }
            Err(LedgerError::Conflict(reason)) => {
                tracing::debug!(pair = %pair, "Book changed underfoot: {}", reason);
                self.repository.invalidate(pair);
                Ok(SweepOutcome::Retry)
            }
            Err(LedgerError::Rejected(reason)) => {
                // Holding contention or similar; back off until next sweep.
                tracing::warn!(
                    pair = %pair,
                    buy = plan.buy.order.order_id,
                    sell = plan.sell.order.order_id,
                    "Settlement rejected by ledger: {}",
                    reason
                );
                Ok(SweepOutcome::Idle { both_sides: true })
            }
            Err(e) => Err(e),
        }
    }
}
