//! Event classification
//!
//! Turns raw ledger transactions into exchange events keyed by topic.
//! Within one transaction, events keep the ledger's order; the update id
//! embeds `(offset, event index)` so subscribers can deduplicate across
//! reconnects.

use serde::Serialize;

use crate::ledger::{LedgerEvent, LedgerUpdate};
use crate::models::{Holding, Order, OrderBook, OrderStatus, Trade};

/// A classified event addressed to a single `(key, channel)` topic,
/// e.g. `BTC/USDT:trades` or `alice::orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeEvent {
    pub update_id: String,
    pub offset: u64,
    pub topic: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum EventPayload {
    /// A new OPEN order entered a book (including synthesised remainders).
    #[serde(rename = "order:new", rename_all = "camelCase")]
    OrderNew { contract_id: String, order: Order },
    /// An order reached a terminal version (fill or cancel): its previous
    /// contract was archived and a successor created in the same
    /// transaction.
    #[serde(rename = "order:update", rename_all = "camelCase")]
    OrderUpdate { contract_id: String, order: Order },
    #[serde(rename = "trade", rename_all = "camelCase")]
    Trade { contract_id: String, trade: Trade },
    /// A book was replaced; also drives repository invalidation.
    #[serde(rename = "book:snapshot", rename_all = "camelCase")]
    BookSnapshot { contract_id: String, book: OrderBook },
    /// A holding changed hands or lock state; balance views recompute.
    #[serde(rename = "balance", rename_all = "camelCase")]
    Balance { party: String, holding: Holding },
}

pub fn update_id(offset: u64, index: usize) -> String {
    format!("{:012}-{:04}", offset, index)
}

/// Classify one ledger transaction into exchange events.
///
/// Undecodable payloads are logged and skipped; a single foreign template
/// on the stream must not stall the fan-out.
pub fn classify(update: &LedgerUpdate) -> Vec<ExchangeEvent> {
    let archived_order_in_tx = update.events.iter().any(|event| {
        matches!(event, LedgerEvent::Archived(archived) if archived.entity() == "Order")
    });

    let mut out = Vec::new();
    for (index, event) in update.events.iter().enumerate() {
        let LedgerEvent::Created(created) = event else {
            continue;
        };

        let classified = match created.entity() {
            "Order" => match created.decode::<Order>() {
                Ok(order) => {
                    let topic = format!("{}:orders", order.owner);
                    let payload = if order.status == OrderStatus::Open {
                        EventPayload::OrderNew {
                            contract_id: created.contract_id.clone(),
                            order,
                        }
                    } else {
                        if !archived_order_in_tx {
                            tracing::warn!(
                                contract_id = created.contract_id,
                                "Terminal order version without archived predecessor"
                            );
                        }
                        EventPayload::OrderUpdate {
                            contract_id: created.contract_id.clone(),
                            order,
                        }
                    };
                    Some((topic, payload))
                }
                Err(e) => {
                    tracing::warn!("Skipping undecodable Order event: {}", e);
                    None
                }
            },
            "Trade" => match created.decode::<Trade>() {
                Ok(trade) => Some((
                    format!("{}:trades", trade.pair),
                    EventPayload::Trade {
                        contract_id: created.contract_id.clone(),
                        trade,
                    },
                )),
                Err(e) => {
                    tracing::warn!("Skipping undecodable Trade event: {}", e);
                    None
                }
            },
            "OrderBook" => match created.decode::<OrderBook>() {
                Ok(book) => Some((
                    format!("{}:orderbook", book.pair),
                    EventPayload::BookSnapshot {
                        contract_id: created.contract_id.clone(),
                        book,
                    },
                )),
                Err(e) => {
                    tracing::warn!("Skipping undecodable OrderBook event: {}", e);
                    None
                }
            },
            "Holding" => match created.decode::<Holding>() {
                Ok(holding) => Some((
                    format!("{}:balances", holding.owner),
                    EventPayload::Balance {
                        party: holding.owner.clone(),
                        holding,
                    },
                )),
                Err(e) => {
                    tracing::warn!("Skipping undecodable Holding event: {}", e);
                    None
                }
            },
            _ => None,
        };

        if let Some((topic, payload)) = classified {
            out.push(ExchangeEvent {
                update_id: update_id(update.offset, index),
                offset: update.offset,
                topic,
                payload,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_json(order_id: &str, status: &str) -> serde_json::Value {
        json!({
            "orderId": order_id,
            "owner": "bob",
            "side": "BUY",
            "mode": "LIMIT",
            "pair": "BTC/USDT",
            "price": "50000",
            "quantity": "1",
            "filled": if status == "FILLED" { "1" } else { "0" },
            "status": status,
            "timestamp": "2026-08-01T12:00:00Z",
            "lockedHoldingRef": "#h-1",
            "operator": "operator"
        })
    }

    fn update(events: serde_json::Value) -> LedgerUpdate {
        serde_json::from_value(json!({ "offset": 7, "events": events })).unwrap()
    }

    #[test]
    fn open_order_classifies_as_new() {
        let update = update(json!([
            {"created": {"contractId": "#o-1", "templateId": "p:Exchange:Order",
                         "payload": order_json("o-1", "OPEN")}}
        ]));

        let events = classify(&update);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "bob:orders");
        assert_eq!(events[0].update_id, "000000000007-0000");
        assert!(matches!(events[0].payload, EventPayload::OrderNew { .. }));
    }

    #[test]
    fn archived_plus_terminal_successor_is_update() {
        let update = update(json!([
            {"archived": {"contractId": "#o-1", "templateId": "p:Exchange:Order"}},
            {"created": {"contractId": "#o-1b", "templateId": "p:Exchange:Order",
                         "payload": order_json("o-1", "FILLED")}}
        ]));

        let events = classify(&update);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::OrderUpdate { .. }));
        // The created event sits at index 1 of the transaction.
        assert_eq!(events[0].update_id, "000000000007-0001");
    }

    #[test]
    fn trade_and_book_events_route_to_pair_topics() {
        let update = update(json!([
            {"created": {"contractId": "#t-1", "templateId": "p:Exchange:Trade",
                         "payload": {
                             "tradeId": "t-1", "buyer": "bob", "seller": "alice",
                             "pair": "BTC/USDT", "price": "50000", "quantity": "1",
                             "timestamp": "2026-08-01T12:00:00Z"
                         }}},
            {"created": {"contractId": "#b-2", "templateId": "p:Exchange:OrderBook",
                         "payload": {
                             "pair": "BTC/USDT", "buyOrders": [], "sellOrders": [],
                             "lastPrice": "50000", "operator": "operator"
                         }}}
        ]));

        let events = classify(&update);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].topic, "BTC/USDT:trades");
        assert_eq!(events[1].topic, "BTC/USDT:orderbook");
    }

    #[test]
    fn holding_event_routes_to_owner_balances() {
        let update = update(json!([
            {"created": {"contractId": "#h-9", "templateId": "p:Token:Holding",
                         "payload": {
                             "owner": "alice", "symbol": "USDT", "amount": "50000",
                             "operator": "operator"
                         }}}
        ]));

        let events = classify(&update);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic, "alice:balances");
    }

    #[test]
    fn foreign_templates_are_ignored() {
        let update = update(json!([
            {"created": {"contractId": "#x", "templateId": "p:Other:Thing", "payload": {}}},
            {"exercised": {"contractId": "#b-1", "templateId": "p:Exchange:OrderBook",
                           "choice": "Match", "argument": {}, "consuming": true}}
        ]));
        assert!(classify(&update).is_empty());
    }

    #[test]
    fn event_envelope_serialises_with_tag() {
        let update = update(json!([
            {"created": {"contractId": "#o-1", "templateId": "p:Exchange:Order",
                         "payload": order_json("o-1", "OPEN")}}
        ]));
        let events = classify(&update);
        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["event"], "order:new");
        assert_eq!(json["topic"], "bob:orders");
        assert_eq!(json["order"]["quantity"], "1");
    }
}
