//! Application configuration
//!
//! Loaded from the process environment (after `dotenvy`). Required keys
//! fail startup with exit code 1; tunables carry the documented defaults.

use serde::Deserialize;
use std::time::Duration;

use crate::models::TradingPair;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the ledger JSON API.
    pub ledger_api_base: String,

    // Operator credentials (client-credentials grant).
    pub oauth_token_url: String,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,

    /// Fully qualified operator party.
    pub operator_party_id: String,
    /// Observer party added to order books so all users can see them.
    pub public_party_id: String,

    /// HS256 secret for API bearer tokens.
    pub jwt_secret: String,

    #[serde(default = "default_sweep_interval_ms")]
    pub matching_sweep_interval_ms: u64,
    #[serde(default = "default_max_conflict_retries")]
    pub matching_max_conflict_retries: u32,
    #[serde(default = "default_submit_timeout_ms")]
    pub ledger_submit_timeout_ms: u64,
    #[serde(default = "default_ws_buffer_size")]
    pub ws_buffer_size: usize,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Optional CSV of pairs to seed order books for at startup.
    #[serde(default)]
    pub trading_pairs_bootstrap: Option<String>,
}

fn default_sweep_interval_ms() -> u64 {
    2_000
}

fn default_max_conflict_retries() -> u32 {
    5
}

fn default_submit_timeout_ms() -> u64 {
    30_000
}

fn default_ws_buffer_size() -> usize {
    1_024
}

fn default_http_port() -> u16 {
    3_001
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.matching_sweep_interval_ms)
    }

    /// Bootstrap pairs, with invalid entries logged and skipped.
    pub fn bootstrap_pairs(&self) -> Vec<TradingPair> {
        let Some(csv) = &self.trading_pairs_bootstrap else {
            return Vec::new();
        };
        csv.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match TradingPair::parse(entry) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    tracing::warn!("Skipping invalid bootstrap pair: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "ledger_api_base": "http://localhost:7575",
            "oauth_token_url": "http://localhost:8080/token",
            "oauth_client_id": "exchange",
            "oauth_client_secret": "secret",
            "operator_party_id": "operator::ledger",
            "public_party_id": "public::ledger",
            "jwt_secret": "jwt-secret"
        })
    }

    #[test]
    fn defaults_apply_for_tunables() {
        let config: AppConfig = serde_json::from_value(minimal()).unwrap();
        assert_eq!(config.matching_sweep_interval_ms, 2_000);
        assert_eq!(config.matching_max_conflict_retries, 5);
        assert_eq!(config.ledger_submit_timeout_ms, 30_000);
        assert_eq!(config.ws_buffer_size, 1_024);
        assert_eq!(config.http_port, 3_001);
        assert_eq!(config.ws_path, "/ws");
        assert!(config.bootstrap_pairs().is_empty());
    }

    #[test]
    fn bootstrap_pairs_parse_and_skip_invalid() {
        let mut raw = minimal();
        raw["trading_pairs_bootstrap"] = json!("BTC/USDT, eth/usdt ,BAD,,SOL/USDC");
        let config: AppConfig = serde_json::from_value(raw).unwrap();

        let pairs: Vec<String> = config
            .bootstrap_pairs()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(pairs, vec!["BTC/USDT", "ETH/USDT", "SOL/USDC"]);
    }

    #[test]
    fn missing_required_key_fails() {
        let mut raw = minimal();
        raw.as_object_mut().unwrap().remove("ledger_api_base");
        assert!(serde_json::from_value::<AppConfig>(raw).is_err());
    }
}
