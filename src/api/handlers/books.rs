//! Orderbook read endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::views;
use crate::models::TradingPair;
use crate::utils::response::AppError;
use crate::AppState;

/// GET /api/orderbooks
pub async fn list_books(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<views::BookSummary>>, AppError> {
    let summaries = views::book_summaries(&state).await?;
    Ok(Json(summaries))
}

/// GET /api/orderbooks/{pair}
///
/// The pair path segment is URL-encoded (`BTC%2FUSDT`); axum hands it to
/// us decoded.
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(pair): Path<String>,
) -> Result<Json<views::BookSnapshot>, AppError> {
    let pair = TradingPair::parse(&pair)?;
    let snapshot = views::book_snapshot(&state, &pair).await?;
    Ok(Json(snapshot))
}
