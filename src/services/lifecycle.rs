//! Order Lifecycle Service
//!
//! Places, cancels and reconciles orders. Every write locks assets before
//! touching the book, carries a stable command id per intent, and retries
//! `Conflict` against a refreshed book a bounded number of times. Matching
//! is never attempted here; the engine owns settlement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::ledger::{Command, LedgerClient, LedgerError, HOLDING_ENTITY};
use crate::models::{Holding, Order, OrderMode, OrderStatus, Side, TradingPair};
use crate::repository::BookRepository;
use crate::utils::backoff;

use super::error::ServiceError;

/// Conflict retries per write before surfacing 409.
const MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct PlaceOrderCommand {
    pub owner: String,
    pub pair: TradingPair,
    pub side: Side,
    pub mode: OrderMode,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    /// Quote amount to lock for a MARKET BUY, where no limit price bounds
    /// the spend. Required there, rejected elsewhere.
    pub quote_cap: Option<Decimal>,
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderResult {
    pub order_id: String,
    pub command_id: String,
    pub update_offset: u64,
}

#[derive(Debug, Clone)]
pub struct CancelOrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub update_offset: Option<u64>,
}

/// An order joined with its containing book, as `reconcile` returns it.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub contract_id: String,
    pub order: Order,
    /// Whether the current book still references this order.
    pub resting: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddOrderArgs<'a> {
    order_id: &'a str,
    owner: &'a str,
    side: Side,
    mode: OrderMode,
    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    quantity: Decimal,
    locked_holding_ref: &'a str,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_order_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LockArgs<'a> {
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
    order_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelArgs<'a> {
    order_id: &'a str,
}

pub struct OrderLifecycleService {
    ledger: Arc<LedgerClient>,
    repository: Arc<BookRepository>,
}

impl OrderLifecycleService {
    pub fn new(ledger: Arc<LedgerClient>, repository: Arc<BookRepository>) -> Self {
        Self { ledger, repository }
    }

    // ========================================================================
    // Place
    // ========================================================================

    pub async fn place_order(
        &self,
        cmd: PlaceOrderCommand,
    ) -> Result<PlaceOrderResult, ServiceError> {
        validate_place(&cmd)?;

        let book = self
            .repository
            .current(&cmd.pair)
            .await?
            .ok_or_else(|| ServiceError::BookNotFound(cmd.pair.clone()))?;

        let order_id = Uuid::new_v4().to_string();
        let (lock_symbol, lock_amount) = lock_requirement(&cmd);

        // Reserve assets first; an order must never sit on the book without
        // its backing holding locked.
        let locked_ref = self
            .lock_holding(&cmd.owner, &lock_symbol, lock_amount, &order_id)
            .await?;

        let timestamp = Utc::now();
        let mut book_cid = book.contract_id;
        let mut attempt: u32 = 0;

        loop {
            let command_id = format!("place-order:{}:{}", order_id, attempt);
            let args = AddOrderArgs {
                order_id: &order_id,
                owner: &cmd.owner,
                side: cmd.side,
                mode: cmd.mode,
                price: cmd.price,
                quantity: cmd.quantity,
                locked_holding_ref: &locked_ref,
                timestamp,
                client_order_id: cmd.client_order_id.as_deref(),
            };
            let command = Command::Exercise {
                template_id: self.ledger.order_book_template().await?,
                contract_id: book_cid.clone(),
                choice: "AddOrder".to_string(),
                argument: serde_json::to_value(&args)
                    .map_err(|e| LedgerError::Internal(e.to_string()))?,
            };
            let act_as = vec![
                cmd.owner.clone(),
                self.ledger.operator_party().to_string(),
            ];

            match self.ledger.submit(vec![command], &act_as, &command_id).await {
                Ok(result) => {
                    tracing::info!(
                        order_id,
                        owner = cmd.owner,
                        pair = %cmd.pair,
                        side = %cmd.side,
                        mode = %cmd.mode,
                        quantity = %cmd.quantity,
                        offset = result.update_offset,
                        "Order placed"
                    );
                    return Ok(PlaceOrderResult {
                        order_id,
                        command_id,
                        update_offset: result.update_offset,
                    });
                }
                Err(LedgerError::Conflict(reason)) if attempt < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(order_id, attempt, "AddOrder hit stale book: {}", reason);
                    self.repository.invalidate(&cmd.pair);
                    tokio::time::sleep(backoff::retry_delay(attempt)).await;
                    book_cid = self
                        .repository
                        .refresh(&cmd.pair)
                        .await?
                        .ok_or_else(|| ServiceError::BookNotFound(cmd.pair.clone()))?
                        .contract_id;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ========================================================================
    // Cancel
    // ========================================================================

    pub async fn cancel_order(
        &self,
        owner: &str,
        order_id: &str,
    ) -> Result<CancelOrderResult, ServiceError> {
        let view = self
            .find_order_as(owner, order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        match view.order.status {
            // Cancelling a cancelled order is an idempotent no-op.
            OrderStatus::Cancelled => {
                return Ok(CancelOrderResult {
                    order_id: order_id.to_string(),
                    status: OrderStatus::Cancelled,
                    update_offset: None,
                })
            }
            OrderStatus::Filled => {
                return Err(ServiceError::AlreadyTerminal {
                    order_id: order_id.to_string(),
                    status: OrderStatus::Filled,
                })
            }
            OrderStatus::Open => {}
        }

        let pair = view.order.pair.clone();
        let mut book_cid = self
            .repository
            .current(&pair)
            .await?
            .ok_or_else(|| ServiceError::BookNotFound(pair.clone()))?
            .contract_id;
        let mut attempt: u32 = 0;

        loop {
            let command_id = format!("cancel-order:{}:{}", order_id, attempt);
            let command = Command::Exercise {
                template_id: self.ledger.order_book_template().await?,
                contract_id: book_cid.clone(),
                choice: "CancelOrderFromBook".to_string(),
                argument: serde_json::to_value(CancelArgs { order_id })
                    .map_err(|e| LedgerError::Internal(e.to_string()))?,
            };
            let act_as = vec![owner.to_string(), self.ledger.operator_party().to_string()];

            match self.ledger.submit(vec![command], &act_as, &command_id).await {
                Ok(result) => {
                    tracing::info!(order_id, owner, offset = result.update_offset, "Order cancelled");
                    return Ok(CancelOrderResult {
                        order_id: order_id.to_string(),
                        status: OrderStatus::Cancelled,
                        update_offset: Some(result.update_offset),
                    });
                }
                Err(LedgerError::Conflict(reason)) if attempt < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(order_id, attempt, "Cancel hit stale book: {}", reason);
                    self.repository.invalidate(&pair);
                    tokio::time::sleep(backoff::retry_delay(attempt)).await;
                    book_cid = self
                        .repository
                        .refresh(&pair)
                        .await?
                        .ok_or_else(|| ServiceError::BookNotFound(pair.clone()))?
                        .contract_id;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The owner's active orders, joined with the books containing them.
    pub async fn reconcile(&self, owner: &str) -> Result<Vec<OrderView>, ServiceError> {
        let template = self.ledger.order_template().await?;
        let contracts = self.ledger.query_active(&[template], owner).await?;

        let mut views = Vec::with_capacity(contracts.len());
        for active in contracts {
            let order: Order = active.decode()?;
            if order.owner != owner {
                continue;
            }
            let resting = match self.repository.current(&order.pair).await {
                Ok(Some(book)) => book.book.contains_order(&active.contract_id),
                _ => false,
            };
            views.push(OrderView {
                contract_id: active.contract_id,
                order,
                resting,
            });
        }
        Ok(views)
    }

    /// Look up one order by id, reading the ledger as `reader`. The
    /// operator sees every order; a user only their own.
    pub async fn find_order_as(
        &self,
        reader: &str,
        order_id: &str,
    ) -> Result<Option<OrderView>, ServiceError> {
        let template = self.ledger.order_template().await?;
        let contracts = self.ledger.query_active(&[template], reader).await?;

        for active in contracts {
            let order: Order = active.decode()?;
            if order.order_id != order_id {
                continue;
            }
            let resting = match self.repository.current(&order.pair).await {
                Ok(Some(book)) => book.book.contains_order(&active.contract_id),
                _ => false,
            };
            return Ok(Some(OrderView {
                contract_id: active.contract_id,
                order,
                resting,
            }));
        }
        Ok(None)
    }

    // ========================================================================
    // Holdings
    // ========================================================================

    /// Lock `amount` of `symbol` against `order_id`, returning the locked
    /// holding's contract id.
    async fn lock_holding(
        &self,
        owner: &str,
        symbol: &str,
        amount: Decimal,
        order_id: &str,
    ) -> Result<String, ServiceError> {
        let template = self.ledger.holding_template().await?;
        let contracts = self.ledger.query_active(&[template.clone()], owner).await?;

        let mut candidates: Vec<(String, Holding)> = Vec::new();
        for active in contracts {
            let holding: Holding = active.decode()?;
            if holding.owner == owner
                && holding.symbol == symbol
                && !holding.is_locked()
                && holding.amount >= amount
            {
                candidates.push((active.contract_id, holding));
            }
        }
        // Smallest sufficient holding keeps large ones intact for later
        // orders and makes selection deterministic.
        candidates.sort_by(|a, b| a.1.amount.cmp(&b.1.amount).then(a.0.cmp(&b.0)));

        let Some((holding_cid, _)) = candidates.into_iter().next() else {
            return Err(ServiceError::InsufficientHoldings {
                symbol: symbol.to_string(),
                needed: amount,
            });
        };

        let command = Command::Exercise {
            template_id: template,
            contract_id: holding_cid,
            choice: "Lock".to_string(),
            argument: serde_json::to_value(LockArgs { amount, order_id })
                .map_err(|e| LedgerError::Internal(e.to_string()))?,
        };
        let command_id = format!("lock-holding:{}", order_id);
        let result = self
            .ledger
            .submit(vec![command], &[owner.to_string()], &command_id)
            .await?;

        let locked = result
            .events
            .iter()
            .find_map(|event| match event {
                crate::ledger::LedgerEvent::Created(created)
                    if created.entity() == HOLDING_ENTITY =>
                {
                    let holding: Holding = created.decode().ok()?;
                    (holding.locked_for_order.as_deref() == Some(order_id))
                        .then(|| created.contract_id.clone())
                }
                _ => None,
            })
            .ok_or_else(|| {
                LedgerError::Internal("Lock produced no locked holding event".to_string())
            })?;

        tracing::debug!(owner, symbol, %amount, order_id, "Holding locked");
        Ok(locked)
    }
}

// ============================================================================
// Pure preconditions
// ============================================================================

fn validate_place(cmd: &PlaceOrderCommand) -> Result<(), ServiceError> {
    if cmd.quantity <= Decimal::ZERO {
        return Err(ServiceError::Validation("quantity must be positive".into()));
    }
    match cmd.mode {
        OrderMode::Limit => {
            match cmd.price {
                Some(price) if price > Decimal::ZERO => {}
                Some(_) => {
                    return Err(ServiceError::Validation("price must be positive".into()));
                }
                None => {
                    return Err(ServiceError::Validation(
                        "LIMIT orders require a price".into(),
                    ));
                }
            }
            if cmd.quote_cap.is_some() {
                return Err(ServiceError::Validation(
                    "quoteCap only applies to MARKET BUY orders".into(),
                ));
            }
        }
        OrderMode::Market => {
            if cmd.price.is_some() {
                return Err(ServiceError::Validation(
                    "MARKET orders must not carry a price".into(),
                ));
            }
            match (cmd.side, cmd.quote_cap) {
                (Side::Buy, Some(cap)) if cap > Decimal::ZERO => {}
                (Side::Buy, Some(_)) => {
                    return Err(ServiceError::Validation("quoteCap must be positive".into()));
                }
                (Side::Buy, None) => {
                    return Err(ServiceError::Validation(
                        "MARKET BUY orders require quoteCap to bound the quote lock".into(),
                    ));
                }
                (Side::Sell, Some(_)) => {
                    return Err(ServiceError::Validation(
                        "quoteCap only applies to MARKET BUY orders".into(),
                    ));
                }
                (Side::Sell, None) => {}
            }
        }
    }
    Ok(())
}

/// Symbol and amount to lock: BUY locks quote (price*qty, or the cap for
/// MARKET), SELL locks base (qty).
fn lock_requirement(cmd: &PlaceOrderCommand) -> (String, Decimal) {
    match cmd.side {
        Side::Buy => {
            let amount = match (cmd.mode, cmd.price) {
                (OrderMode::Limit, Some(price)) => cmd.quantity * price,
                _ => cmd.quote_cap.unwrap_or_default(),
            };
            (cmd.pair.quote().to_string(), amount)
        }
        Side::Sell => (cmd.pair.base().to_string(), cmd.quantity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cmd(side: Side, mode: OrderMode, price: Option<Decimal>) -> PlaceOrderCommand {
        PlaceOrderCommand {
            owner: "bob".into(),
            pair: TradingPair::parse("BTC/USDT").unwrap(),
            side,
            mode,
            price,
            quantity: dec!(1),
            quote_cap: None,
            client_order_id: None,
        }
    }

    #[test]
    fn limit_requires_positive_price() {
        assert!(validate_place(&cmd(Side::Buy, OrderMode::Limit, Some(dec!(100)))).is_ok());
        assert!(validate_place(&cmd(Side::Buy, OrderMode::Limit, None)).is_err());
        assert!(validate_place(&cmd(Side::Buy, OrderMode::Limit, Some(dec!(0)))).is_err());
        assert!(validate_place(&cmd(Side::Buy, OrderMode::Limit, Some(dec!(-1)))).is_err());
    }

    #[test]
    fn market_rejects_price() {
        let mut market = cmd(Side::Sell, OrderMode::Market, Some(dec!(100)));
        assert!(validate_place(&market).is_err());
        market.price = None;
        assert!(validate_place(&market).is_ok());
    }

    #[test]
    fn market_buy_requires_quote_cap() {
        let mut market_buy = cmd(Side::Buy, OrderMode::Market, None);
        assert!(validate_place(&market_buy).is_err());
        market_buy.quote_cap = Some(dec!(50000));
        assert!(validate_place(&market_buy).is_ok());
        market_buy.quote_cap = Some(dec!(0));
        assert!(validate_place(&market_buy).is_err());
    }

    #[test]
    fn quote_cap_rejected_outside_market_buy() {
        let mut limit = cmd(Side::Buy, OrderMode::Limit, Some(dec!(100)));
        limit.quote_cap = Some(dec!(1));
        assert!(validate_place(&limit).is_err());

        let mut market_sell = cmd(Side::Sell, OrderMode::Market, None);
        market_sell.quote_cap = Some(dec!(1));
        assert!(validate_place(&market_sell).is_err());
    }

    #[test]
    fn quantity_must_be_positive() {
        let mut order = cmd(Side::Buy, OrderMode::Limit, Some(dec!(100)));
        order.quantity = dec!(0);
        assert!(validate_place(&order).is_err());
    }

    #[test]
    fn lock_requirement_by_side_and_mode() {
        let limit_buy = cmd(Side::Buy, OrderMode::Limit, Some(dec!(50000)));
        assert_eq!(lock_requirement(&limit_buy), ("USDT".into(), dec!(50000)));

        let mut market_buy = cmd(Side::Buy, OrderMode::Market, None);
        market_buy.quote_cap = Some(dec!(12345));
        assert_eq!(lock_requirement(&market_buy), ("USDT".into(), dec!(12345)));

        let sell = cmd(Side::Sell, OrderMode::Limit, Some(dec!(50000)));
        assert_eq!(lock_requirement(&sell), ("BTC".into(), dec!(1)));
    }
}
