//! Ledger Gateway client
//!
//! Typed client over the ledger JSON API. All submissions carry a
//! caller-supplied command id for idempotency; the ledger deduplicates
//! repeats within its window, so retrying after a network error of unknown
//! outcome is safe as long as the same command id is reused.

use std::sync::Arc;
use std::time::Duration;

use crate::metrics::LEDGER_SUBMITS_TOTAL;
use crate::token::TokenProvider;

use super::error::LedgerError;
use super::packages::PackageCache;
use super::types::{
    ActiveContract, Command, PackageListResponse, QueryRequest, QueryResponse, SubmitRequest,
    SubmitResult, TemplateId,
};

pub const EXCHANGE_MODULE: &str = "Exchange";
pub const ORDER_BOOK_ENTITY: &str = "OrderBook";
pub const ORDER_ENTITY: &str = "Order";
pub const TRADE_ENTITY: &str = "Trade";
pub const TOKEN_MODULE: &str = "Token";
pub const HOLDING_ENTITY: &str = "Holding";

pub struct LedgerClient {
    http: reqwest::Client,
    base_url: String,
    operator_party: String,
    tokens: Arc<TokenProvider>,
    packages: PackageCache,
    submit_timeout: Duration,
}

impl LedgerClient {
    pub fn new(
        base_url: &str,
        operator_party: &str,
        tokens: Arc<TokenProvider>,
        submit_timeout_ms: u64,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            operator_party: operator_party.to_string(),
            tokens,
            packages: PackageCache::new(),
            submit_timeout: Duration::from_millis(submit_timeout_ms),
        }
    }

    pub fn operator_party(&self) -> &str {
        &self.operator_party
    }

    /// WebSocket endpoint of the update stream.
    pub fn stream_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/v1/stream", ws_base)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Submit a command batch and wait for the resulting transaction.
    ///
    /// The batch is atomic on the ledger. `command_id` must be stable per
    /// intent; callers retrying after `Timeout`/`TransientNetwork` reuse it.
    pub async fn submit(
        &self,
        commands: Vec<Command>,
        act_as: &[String],
        command_id: &str,
    ) -> Result<SubmitResult, LedgerError> {
        let request = SubmitRequest {
            command_id: command_id.to_string(),
            act_as: act_as.to_vec(),
            commands,
        };

        let send = self.post_json("/v1/commands/submit-and-wait", &request);
        let response = match tokio::time::timeout(self.submit_timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                metrics::counter!(LEDGER_SUBMITS_TOTAL, "outcome" => "error").increment(1);
                return Err(e);
            }
            Err(_) => {
                metrics::counter!(LEDGER_SUBMITS_TOTAL, "outcome" => "timeout").increment(1);
                return Err(LedgerError::Timeout(self.submit_timeout.as_millis() as u64));
            }
        };

        let result: SubmitResult = response
            .json()
            .await
            .map_err(|e| LedgerError::Internal(format!("malformed submit response: {}", e)))?;
        metrics::counter!(LEDGER_SUBMITS_TOTAL, "outcome" => "accepted").increment(1);

        tracing::debug!(
            command_id,
            offset = result.update_offset,
            events = result.events.len(),
            "Ledger command accepted"
        );
        Ok(result)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Active contracts of the given templates visible to `party`.
    ///
    /// The filter is always party-scoped; admin-wide filters are forbidden
    /// for non-operator callers.
    pub async fn query_active(
        &self,
        template_ids: &[TemplateId],
        party: &str,
    ) -> Result<Vec<ActiveContract>, LedgerError> {
        let request = QueryRequest {
            template_ids: template_ids.to_vec(),
            readers: vec![party.to_string()],
        };

        let response = self.post_json("/v1/query", &request).await?;
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Internal(format!("malformed query response: {}", e)))?;
        Ok(body.result)
    }

    // ========================================================================
    // Package discovery
    // ========================================================================

    /// Resolve the package hosting `module:entity`, probing the package
    /// list on first use and caching the answer for the process lifetime.
    pub async fn lookup_package_id(
        &self,
        module: &str,
        entity: &str,
    ) -> Result<String, LedgerError> {
        if let Some(package_id) = self.packages.get(module, entity) {
            return Ok(package_id);
        }

        let packages = self.list_packages().await?;
        for package_id in packages {
            let candidate = TemplateId::new(&package_id, module, entity);
            match self.query_active(&[candidate], &self.operator_party).await {
                Ok(_) => {
                    tracing::info!("Resolved template {}:{} to package {}", module, entity, package_id);
                    self.packages.insert(module, entity, package_id.clone());
                    return Ok(package_id);
                }
                // An unknown-template rejection just means "not this
                // package"; anything retryable is surfaced.
                Err(e) if e.is_retryable() => return Err(e),
                Err(_) => continue,
            }
        }

        Err(LedgerError::NotFound(format!(
            "no package hosts template {}:{}",
            module, entity
        )))
    }

    pub async fn template(&self, module: &str, entity: &str) -> Result<TemplateId, LedgerError> {
        let package_id = self.lookup_package_id(module, entity).await?;
        Ok(TemplateId::new(&package_id, module, entity))
    }

    pub async fn order_book_template(&self) -> Result<TemplateId, LedgerError> {
        self.template(EXCHANGE_MODULE, ORDER_BOOK_ENTITY).await
    }

    pub async fn order_template(&self) -> Result<TemplateId, LedgerError> {
        self.template(EXCHANGE_MODULE, ORDER_ENTITY).await
    }

    pub async fn trade_template(&self) -> Result<TemplateId, LedgerError> {
        self.template(EXCHANGE_MODULE, TRADE_ENTITY).await
    }

    pub async fn holding_template(&self) -> Result<TemplateId, LedgerError> {
        self.template(TOKEN_MODULE, HOLDING_ENTITY).await
    }

    /// Cheap connectivity probe used at startup and by the health report.
    pub async fn probe(&self) -> Result<(), LedgerError> {
        self.list_packages().await.map(|_| ())
    }

    async fn list_packages(&self) -> Result<Vec<String>, LedgerError> {
        let bearer = self.tokens.bearer().await?;
        let response = self
            .http
            .get(format!("{}/v1/packages", self.base_url))
            .bearer_auth(bearer)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::from_status(status, body));
        }

        let body: PackageListResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Internal(format!("malformed package list: {}", e)))?;
        Ok(body.result)
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, LedgerError> {
        let bearer = self.tokens.bearer().await?;
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::from_status(status, body));
        }
        Ok(response)
    }
}
