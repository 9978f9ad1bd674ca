//! Token Provider
//!
//! Acquires OAuth tokens for the operator party via the client-credentials
//! grant. One token is cached per provider; it is refreshed once the
//! remaining lifetime drops below 30 seconds, and concurrent refreshes
//! coalesce behind a single in-flight fetch. An expired cached token is
//! never served: repeated refresh failure surfaces `Unauthenticated`.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::ledger::LedgerError;

/// Refresh once less than this much lifetime remains.
const REFRESH_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

pub struct TokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
    /// Serialises refreshes so concurrent callers await one fetch.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl TokenProvider {
    pub fn new(token_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cached: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current bearer token, refreshing if the cached one is near expiry.
    pub async fn bearer(&self) -> Result<String, LedgerError> {
        let now = Utc::now();
        if let Some(token) = self.cached.lock().as_ref() {
            if token.is_fresh(now) {
                return Ok(token.access_token.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited on the lock.
        let now = Utc::now();
        if let Some(token) = self.cached.lock().as_ref() {
            if token.is_fresh(now) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.fetch().await?;
        let bearer = token.access_token.clone();
        *self.cached.lock() = Some(token);
        Ok(bearer)
    }

    async fn fetch(&self) -> Result<CachedToken, LedgerError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| LedgerError::Unauthenticated(format!("token endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Token refresh failed: {} {}", status, body);
            return Err(LedgerError::Unauthenticated(format!(
                "token refresh failed with {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unauthenticated(format!("malformed token response: {}", e)))?;

        tracing::debug!("Operator token refreshed, valid for {}s", token.expires_in);

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_fresh_until_refresh_margin() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: now + Duration::seconds(120),
        };
        assert!(token.is_fresh(now));
        assert!(token.is_fresh(now + Duration::seconds(89)));
        // Inside the 30s margin the token counts as stale.
        assert!(!token.is_fresh(now + Duration::seconds(91)));
        assert!(!token.is_fresh(now + Duration::seconds(300)));
    }
}
