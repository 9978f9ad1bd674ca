//! WebSocket protocol messages and topic grammar

use serde::{Deserialize, Serialize};

use crate::models::TradingPair;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
    Ping,
    Pong,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Snapshot {
        topic: String,
        data: serde_json::Value,
        update_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Event {
        topic: String,
        update_id: String,
        payload: serde_json::Value,
    },
    Subscribed {
        topics: Vec<String>,
    },
    Unsubscribed {
        topics: Vec<String>,
    },
    Ping,
    Pong,
    Error {
        code: String,
        message: String,
    },
    Close {
        reason: String,
    },
}

/// A subscription topic: `{pair}:orderbook`, `{pair}:trades`,
/// `{party}:orders` or `{party}:balances`. Party identifiers may contain
/// colons, so the channel is split off the right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Orderbook(TradingPair),
    Trades(TradingPair),
    Orders(String),
    Balances(String),
}

impl Topic {
    pub fn parse(raw: &str) -> Option<Topic> {
        let (key, channel) = raw.rsplit_once(':')?;
        if key.is_empty() {
            return None;
        }
        match channel {
            "orderbook" => TradingPair::parse(key).ok().map(Topic::Orderbook),
            "trades" => TradingPair::parse(key).ok().map(Topic::Trades),
            "orders" => Some(Topic::Orders(key.to_string())),
            "balances" => Some(Topic::Balances(key.to_string())),
            _ => None,
        }
    }

    /// Private topics require the token to act as the keyed party.
    pub fn required_party(&self) -> Option<&str> {
        match self {
            Topic::Orders(party) | Topic::Balances(party) => Some(party),
            _ => None,
        }
    }

    /// The canonical topic string events are published under.
    pub fn canonical(&self) -> String {
        match self {
            Topic::Orderbook(pair) => format!("{}:orderbook", pair),
            Topic::Trades(pair) => format!("{}:trades", pair),
            Topic::Orders(party) => format!("{}:orders", party),
            Topic::Balances(party) => format!("{}:balances", party),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pair_topics_case_insensitively() {
        let topic = Topic::parse("btc/usdt:orderbook").unwrap();
        assert_eq!(topic.canonical(), "BTC/USDT:orderbook");
        assert!(topic.required_party().is_none());

        let trades = Topic::parse("BTC/USDT:trades").unwrap();
        assert_eq!(trades.canonical(), "BTC/USDT:trades");
    }

    #[test]
    fn party_topics_keep_colons_in_key() {
        let topic = Topic::parse("alice::12ab:orders").unwrap();
        assert_eq!(topic.required_party(), Some("alice::12ab"));
        assert_eq!(topic.canonical(), "alice::12ab:orders");

        let balances = Topic::parse("bob::34cd:balances").unwrap();
        assert_eq!(balances.required_party(), Some("bob::34cd"));
    }

    #[test]
    fn rejects_unknown_channels_and_bad_pairs() {
        assert!(Topic::parse("BTC/USDT:candles").is_none());
        assert!(Topic::parse("not-a-pair:orderbook").is_none());
        assert!(Topic::parse(":orders").is_none());
        assert!(Topic::parse("orders").is_none());
    }
}
