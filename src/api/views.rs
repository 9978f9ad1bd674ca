//! Read-side view builders
//!
//! Computes API response shapes from the repository and party-scoped
//! ledger queries. No ledger commands are issued here. Shared between the
//! HTTP handlers and the WebSocket snapshot-on-subscribe path.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Holding, Order, OrderStatus, Trade, TradingPair};
use crate::repository::OrderBookContract;
use crate::services::matching::BookOrder;
use crate::services::ServiceError;
use crate::AppState;

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub pair: TradingPair,
    pub contract_id: String,
    pub buy_depth: usize,
    pub sell_depth: usize,
    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLevel {
    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub remaining: Decimal,
    pub owner: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub pair: TradingPair,
    pub buy_orders: Vec<BookLevel>,
    pub sell_orders: Vec<BookLevel>,
    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
    pub order_id: String,
    pub contract_id: String,
    pub pair: TradingPair,
    pub side: crate::models::Side,
    pub mode: crate::models::OrderMode,
    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub remaining: Decimal,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub resting: bool,
    /// Root order id when this is a synthesised remainder, so clients can
    /// render fill progress across the chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remainder_of: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRow {
    pub contract_id: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// Unlocked amount per symbol, as decimal strings.
    pub available: BTreeMap<String, String>,
    pub holdings: Vec<HoldingRow>,
}

// ============================================================================
// Builders
// ============================================================================

/// Summaries of every order book on the ledger.
pub async fn book_summaries(state: &AppState) -> Result<Vec<BookSummary>, ServiceError> {
    let template = state.ledger.order_book_template().await?;
    let contracts = state
        .ledger
        .query_active(&[template], state.ledger.operator_party())
        .await?;

    let mut summaries = Vec::with_capacity(contracts.len());
    for active in contracts {
        let book: crate::models::OrderBook = active.decode()?;
        let (buy_depth, sell_depth) = book.depth();
        summaries.push(BookSummary {
            pair: book.pair,
            contract_id: active.contract_id,
            buy_depth,
            sell_depth,
            last_price: book.last_price,
        });
    }
    summaries.sort_by(|a, b| a.pair.as_str().cmp(b.pair.as_str()));
    Ok(summaries)
}

/// Full snapshot of one pair's book, both sides in priority order.
pub async fn book_snapshot(
    state: &AppState,
    pair: &TradingPair,
) -> Result<BookSnapshot, ServiceError> {
    let contract = state
        .repository
        .current(pair)
        .await?
        .ok_or_else(|| ServiceError::BookNotFound(pair.clone()))?;

    let (mut buys, mut sells) = resolve_book_orders(state, &contract).await?;
    crate::services::matching::sort_buys(&mut buys);
    crate::services::matching::sort_sells(&mut sells);

    let level = |entry: &BookOrder| BookLevel {
        price: entry.order.price,
        quantity: entry.order.quantity,
        remaining: entry.order.remaining(),
        owner: entry.order.owner.clone(),
        timestamp: entry.order.timestamp,
    };

    Ok(BookSnapshot {
        pair: pair.clone(),
        buy_orders: buys.iter().map(level).collect(),
        sell_orders: sells.iter().map(level).collect(),
        last_price: contract.book.last_price,
    })
}

/// Resolve a book's order references against the operator's active view.
pub async fn resolve_book_orders(
    state: &AppState,
    contract: &OrderBookContract,
) -> Result<(Vec<BookOrder>, Vec<BookOrder>), ServiceError> {
    let template = state.ledger.order_template().await?;
    let active = state
        .ledger
        .query_active(&[template], state.ledger.operator_party())
        .await?;

    let mut by_cid: HashMap<String, Order> = HashMap::new();
    for entry in active {
        by_cid.insert(entry.contract_id.clone(), entry.decode()?);
    }

    let resolve = |cids: &[String]| -> Vec<BookOrder> {
        cids.iter()
            .filter_map(|cid| {
                by_cid.get(cid).map(|order| BookOrder {
                    contract_id: cid.clone(),
                    order: order.clone(),
                })
            })
            .filter(|entry| entry.order.is_open())
            .collect()
    };

    Ok((
        resolve(&contract.book.buy_orders),
        resolve(&contract.book.sell_orders),
    ))
}

/// A party's orders, newest first, optionally filtered by status.
pub async fn user_orders(
    state: &AppState,
    party: &str,
    status: Option<OrderStatus>,
    limit: usize,
) -> Result<Vec<OrderRow>, ServiceError> {
    let mut views = state.lifecycle.reconcile(party).await?;
    views.sort_by(|a, b| b.order.timestamp.cmp(&a.order.timestamp));

    Ok(views
        .into_iter()
        .filter(|view| status.map_or(true, |wanted| view.order.status == wanted))
        .take(limit)
        .map(|view| {
            let root = crate::models::root_order_id(&view.order.order_id);
            let remainder_of =
                (root != view.order.order_id).then(|| root.to_string());
            OrderRow {
                order_id: view.order.order_id.clone(),
                contract_id: view.contract_id,
                pair: view.order.pair.clone(),
                side: view.order.side,
                mode: view.order.mode,
                price: view.order.price,
                quantity: view.order.quantity,
                filled: view.order.filled,
                remaining: view.order.remaining(),
                status: view.order.status,
                timestamp: view.order.timestamp,
                resting: view.resting,
                remainder_of,
            }
        })
        .collect())
}

/// Balance view for a party: unlocked sums plus the backing holdings.
pub async fn balances(state: &AppState, party: &str) -> Result<BalanceResponse, ServiceError> {
    let template = state.ledger.holding_template().await?;
    let contracts = state.ledger.query_active(&[template], party).await?;

    let mut rows = Vec::new();
    let mut decoded: Vec<Holding> = Vec::new();
    for active in contracts {
        let holding: Holding = active.decode()?;
        if holding.owner != party {
            continue;
        }
        if !holding.is_locked() {
            rows.push(HoldingRow {
                contract_id: active.contract_id,
                symbol: holding.symbol.clone(),
                amount: holding.amount,
            });
        }
        decoded.push(holding);
    }

    let view = crate::models::BalanceView::from_holdings(&decoded);
    Ok(BalanceResponse {
        available: view
            .available
            .into_iter()
            .map(|(symbol, amount)| (symbol, amount.to_string()))
            .collect(),
        holdings: rows,
    })
}

/// Recent trades, newest first, optionally filtered by pair.
pub async fn recent_trades(
    state: &AppState,
    pair: Option<&TradingPair>,
    limit: usize,
) -> Result<Vec<Trade>, ServiceError> {
    let template = state.ledger.trade_template().await?;
    let contracts = state
        .ledger
        .query_active(&[template], state.ledger.operator_party())
        .await?;

    let mut trades: Vec<Trade> = Vec::with_capacity(contracts.len());
    for active in contracts {
        let trade: Trade = active.decode()?;
        if pair.map_or(true, |p| &trade.pair == p) {
            trades.push(trade);
        }
    }
    trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    trades.truncate(limit);
    Ok(trades)
}
