//! Balance endpoint

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::api::views;
use crate::auth::AuthParty;
use crate::utils::response::AppError;
use crate::AppState;

/// GET /api/balance/{party}
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthParty>,
    Path(party): Path<String>,
) -> Result<Json<views::BalanceResponse>, AppError> {
    let operator = state.ledger.operator_party();
    if !auth.can_act_as(&party) && !auth.is_operator(operator) {
        return Err(AppError::forbidden("balances are only visible to their owner"));
    }

    let balance = views::balances(&state, &party).await?;
    Ok(Json(balance))
}
