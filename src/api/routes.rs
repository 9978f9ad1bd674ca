use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::auth::auth_middleware;
use crate::AppState;

/// All `/api` routes sit behind bearer auth; admin handlers additionally
/// check the operator party themselves.
pub fn create_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        // Orders
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:order_id", delete(handlers::orders::cancel_order))
        .route("/orders/user/:party", get(handlers::orders::user_orders))
        // Orderbooks
        .route("/orderbooks", get(handlers::books::list_books))
        .route("/orderbooks/:pair", get(handlers::books::get_book))
        // Balances & trades
        .route("/balance/:party", get(handlers::balances::get_balance))
        .route("/trades", get(handlers::trades::list_trades))
        // Admin
        .route(
            "/admin/orderbooks/:pair",
            post(handlers::admin::create_order_book),
        )
        .route("/admin/health", get(handlers::admin::health))
        .layer(axum_middleware::from_fn_with_state(state, auth_middleware))
}
