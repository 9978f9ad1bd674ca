//! Order endpoints
//!
//! Writes delegate to the lifecycle service; reads come from party-scoped
//! queries. Every write response carries the update offset so clients can
//! read their own writes through the stream.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::api::views;
use crate::auth::AuthParty;
use crate::models::{OrderMode, OrderStatus, Side, TradingPair};
use crate::services::lifecycle::PlaceOrderCommand;
use crate::utils::response::AppError;
use crate::AppState;

const DEFAULT_ORDERS_LIMIT: usize = 100;
const MAX_ORDERS_LIMIT: usize = 500;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1))]
    pub owner: String,
    #[validate(length(min = 1))]
    pub pair: String,
    pub side: Side,
    pub mode: OrderMode,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Quote lock for MARKET BUY orders.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub quote_cap: Option<Decimal>,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub command_id: String,
    pub update_offset: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_offset: Option<u64>,
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthParty>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::validation(&e.to_string()))?;

    if !auth.can_act_as(&req.owner) {
        return Err(AppError::forbidden("token may not act as the claimed owner"));
    }

    let pair = TradingPair::parse(&req.pair)?;
    let result = state
        .lifecycle
        .place_order(PlaceOrderCommand {
            owner: req.owner,
            pair,
            side: req.side,
            mode: req.mode,
            price: req.price,
            quantity: req.quantity,
            quote_cap: req.quote_cap,
            client_order_id: req.client_order_id,
        })
        .await?;

    Ok(Json(CreateOrderResponse {
        order_id: result.order_id,
        command_id: result.command_id,
        update_offset: result.update_offset,
    }))
}

/// DELETE /api/orders/{orderId}
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthParty>,
    Path(order_id): Path<String>,
) -> Result<Json<CancelOrderResponse>, AppError> {
    // Look up through the operator so a foreign order yields 403, not 404.
    let view = state
        .lifecycle
        .find_order_as(state.ledger.operator_party(), &order_id)
        .await?
        .ok_or_else(|| AppError::not_found(&format!("order {} not found", order_id)))?;

    if !auth.can_act_as(&view.order.owner) {
        return Err(AppError::forbidden("only the order owner may cancel"));
    }

    let result = state
        .lifecycle
        .cancel_order(&view.order.owner, &order_id)
        .await?;

    Ok(Json(CancelOrderResponse {
        order_id: result.order_id,
        status: result.status,
        update_offset: result.update_offset,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UserOrdersQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/orders/user/{party}
pub async fn user_orders(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthParty>,
    Path(party): Path<String>,
    Query(query): Query<UserOrdersQuery>,
) -> Result<Json<Vec<views::OrderRow>>, AppError> {
    let operator = state.ledger.operator_party();
    if !auth.can_act_as(&party) && !auth.is_operator(operator) {
        return Err(AppError::forbidden("orders are only visible to their owner"));
    }

    let status = match query.status.as_deref() {
        None | Some("ALL") => None,
        Some("OPEN") => Some(OrderStatus::Open),
        Some("FILLED") => Some(OrderStatus::Filled),
        Some("CANCELLED") => Some(OrderStatus::Cancelled),
        Some(other) => {
            return Err(AppError::validation(&format!(
                "unknown status filter {:?}; expected OPEN, FILLED, CANCELLED or ALL",
                other
            )))
        }
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ORDERS_LIMIT)
        .min(MAX_ORDERS_LIMIT)
        .max(1);

    let rows = views::user_orders(&state, &party, status, limit).await?;
    Ok(Json(rows))
}
