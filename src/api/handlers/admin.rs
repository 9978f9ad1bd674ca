//! Admin endpoints (operator-only)

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::api::views::BookSummary;
use crate::auth::AuthParty;
use crate::models::TradingPair;
use crate::services::admin::HealthReport;
use crate::utils::response::AppError;
use crate::AppState;

/// POST /api/admin/orderbooks/{pair}
///
/// Idempotent: an existing book for the pair is returned unchanged.
pub async fn create_order_book(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthParty>,
    Path(pair): Path<String>,
) -> Result<Json<BookSummary>, AppError> {
    if !auth.is_operator(state.ledger.operator_party()) {
        return Err(AppError::forbidden("order book creation is operator-only"));
    }

    let pair = TradingPair::parse(&pair)?;
    let contract = state.admin.create_order_book(&pair).await?;
    let (buy_depth, sell_depth) = contract.book.depth();

    Ok(Json(BookSummary {
        pair: contract.book.pair,
        contract_id: contract.contract_id,
        buy_depth,
        sell_depth,
        last_price: contract.book.last_price,
    }))
}

/// GET /api/admin/health
pub async fn health(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthParty>,
) -> Result<Json<HealthReport>, AppError> {
    if !auth.is_operator(state.ledger.operator_party()) {
        return Err(AppError::forbidden("health report is operator-only"));
    }
    Ok(Json(state.admin.health().await))
}
