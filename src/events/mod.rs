//! Event Fan-out
//!
//! Ingests the ledger update stream, classifies each transaction into
//! exchange events and publishes them to subscribers through the hub.
//! Ordering within a topic is strictly increasing by ledger offset; within
//! one offset events keep the transaction's order.

mod classifier;
mod hub;

pub use classifier::{classify, update_id, EventPayload, ExchangeEvent};
pub use hub::{EventHub, SubscriberHandle};

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::ledger::LedgerUpdate;
use crate::metrics::STREAM_OFFSET;
use crate::repository::{BookRepository, OrderBookContract};

/// Spawn the ingest worker bridging the gateway stream into the hub.
/// Book snapshots also refresh the repository before being fanned out, so
/// repository readers never trail subscribers.
pub fn spawn_ingest(
    hub: Arc<EventHub>,
    repository: Arc<BookRepository>,
    mut updates: mpsc::Receiver<LedgerUpdate>,
) {
    tokio::spawn(async move {
        tracing::info!("Event ingest worker started");

        while let Some(update) = updates.recv().await {
            metrics::gauge!(STREAM_OFFSET).set(update.offset as f64);

            for event in classify(&update) {
                if let EventPayload::BookSnapshot { contract_id, book } = &event.payload {
                    repository.apply_event(
                        OrderBookContract {
                            contract_id: contract_id.clone(),
                            book: book.clone(),
                        },
                        update.offset,
                    );
                }
                hub.publish(event);
            }
        }

        tracing::warn!("Event ingest worker stopped: update stream closed");
    });
}
