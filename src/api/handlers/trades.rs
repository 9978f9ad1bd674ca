//! Trade history endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::views;
use crate::models::{Trade, TradingPair};
use crate::utils::response::AppError;
use crate::AppState;

const DEFAULT_TRADES_LIMIT: usize = 50;
const MAX_TRADES_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub pair: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/trades?pair=&limit=
pub async fn list_trades(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Vec<Trade>>, AppError> {
    let pair = query
        .pair
        .as_deref()
        .map(TradingPair::parse)
        .transpose()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRADES_LIMIT)
        .min(MAX_TRADES_LIMIT)
        .max(1);

    let trades = views::recent_trades(&state, pair.as_ref(), limit).await?;
    Ok(Json(trades))
}
