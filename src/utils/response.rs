//! HTTP error mapping
//!
//! Every error surfaced to a client is `{ code, message, details? }` with
//! the status implied by the error taxonomy. Success bodies are the plain
//! endpoint shapes; there is no envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::ledger::LedgerError;
use crate::models::TradingPairError;
use crate::services::ServiceError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION", message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    pub fn forbidden(message: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TradingPairError> for AppError {
    fn from(err: TradingPairError) -> Self {
        AppError::validation(&err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::Unauthenticated(_) => {
                AppError::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", &err.to_string())
            }
            LedgerError::PermissionDenied(_) => {
                AppError::new(StatusCode::FORBIDDEN, "PERMISSION_DENIED", &err.to_string())
            }
            LedgerError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "NOT_FOUND", &err.to_string())
            }
            LedgerError::Conflict(_) => {
                AppError::new(StatusCode::CONFLICT, "CONFLICT", &err.to_string())
            }
            LedgerError::TransientNetwork(_) | LedgerError::Timeout(_) => AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "LEDGER_UNAVAILABLE",
                &err.to_string(),
            ),
            LedgerError::ValidationError(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "INVALID_COMMAND", &err.to_string())
            }
            LedgerError::Rejected(reason) => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "LEDGER_REJECTED",
                // The ledger's reason passes through verbatim.
                reason,
            ),
            LedgerError::Internal(_) => AppError::internal(&err.to_string()),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => AppError::validation(&message),
            ServiceError::BookNotFound(pair) => AppError::new(
                StatusCode::NOT_FOUND,
                "BOOK_NOT_FOUND",
                &format!("no order book exists for pair {}", pair),
            ),
            ServiceError::OrderNotFound(order_id) => AppError::new(
                StatusCode::NOT_FOUND,
                "ORDER_NOT_FOUND",
                &format!("order {} not found", order_id),
            ),
            ServiceError::AlreadyTerminal { order_id, status } => AppError::new(
                StatusCode::CONFLICT,
                "ORDER_TERMINAL",
                &format!("order {} is already {}", order_id, status),
            ),
            ServiceError::InsufficientHoldings { symbol, needed } => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_HOLDINGS",
                &format!("insufficient unlocked {} holdings", symbol),
            )
            .with_details(json!({ "symbol": symbol, "needed": needed.to_string() })),
            ServiceError::Ledger(ledger) => ledger.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ledger_taxonomy_maps_to_statuses() {
        let cases = [
            (
                LedgerError::Unauthenticated("x".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                LedgerError::PermissionDenied("x".into()),
                StatusCode::FORBIDDEN,
            ),
            (LedgerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LedgerError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                LedgerError::TransientNetwork("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (LedgerError::Timeout(30_000), StatusCode::SERVICE_UNAVAILABLE),
            (
                LedgerError::ValidationError("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                LedgerError::Rejected("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LedgerError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn rejected_reason_passes_verbatim() {
        let app: AppError = LedgerError::Rejected("insufficient locked holding".into()).into();
        assert_eq!(app.message, "insufficient locked holding");
        assert_eq!(app.code, "LEDGER_REJECTED");
    }

    #[test]
    fn insufficient_holdings_carries_details() {
        let app: AppError = ServiceError::InsufficientHoldings {
            symbol: "USDT".into(),
            needed: dec!(50000),
        }
        .into();
        assert_eq!(app.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(app.details.unwrap()["needed"], "50000");
    }
}
