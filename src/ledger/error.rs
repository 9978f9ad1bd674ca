//! Ledger error taxonomy
//!
//! Every failure crossing the gateway boundary is translated into one of
//! these kinds. `Conflict`, `TransientNetwork` and `Timeout` are retryable;
//! everything else is terminal for the caller.

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Token invalid or expired.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Party lacks actAs/readAs rights for the command.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Referenced contract or resource is gone.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic contention: the contract was archived concurrently.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("ledger call timed out after {0}ms")]
    Timeout(u64),

    /// Malformed command; the ledger never saw a well-formed submission.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The ledger rejected the choice body for a semantic reason
    /// (e.g. insufficient locked holding). Reason is passed on verbatim.
    #[error("ledger rejected command: {0}")]
    Rejected(String),

    #[error("internal ledger gateway error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict(_) | LedgerError::TransientNetwork(_) | LedgerError::Timeout(_)
        )
    }

    /// Map an HTTP error status plus response body to the taxonomy.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        use reqwest::StatusCode;
        match status {
            StatusCode::UNAUTHORIZED => LedgerError::Unauthenticated(body),
            StatusCode::FORBIDDEN => LedgerError::PermissionDenied(body),
            StatusCode::NOT_FOUND => LedgerError::NotFound(body),
            StatusCode::CONFLICT => LedgerError::Conflict(body),
            StatusCode::BAD_REQUEST => LedgerError::ValidationError(body),
            StatusCode::UNPROCESSABLE_ENTITY => LedgerError::Rejected(body),
            s if s.is_server_error() => LedgerError::TransientNetwork(format!("{}: {}", s, body)),
            s => LedgerError::Internal(format!("unexpected status {}: {}", s, body)),
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            LedgerError::TransientNetwork(err.to_string())
        } else {
            LedgerError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn retryable_kinds() {
        assert!(LedgerError::Conflict("book archived".into()).is_retryable());
        assert!(LedgerError::TransientNetwork("reset".into()).is_retryable());
        assert!(LedgerError::Timeout(30_000).is_retryable());
        assert!(!LedgerError::NotFound("gone".into()).is_retryable());
        assert!(!LedgerError::Rejected("insufficient holding".into()).is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            LedgerError::from_status(StatusCode::CONFLICT, String::new()),
            LedgerError::Conflict(_)
        ));
        assert!(matches!(
            LedgerError::from_status(StatusCode::BAD_GATEWAY, String::new()),
            LedgerError::TransientNetwork(_)
        ));
        assert!(matches!(
            LedgerError::from_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            LedgerError::Rejected(_)
        ));
    }
}
