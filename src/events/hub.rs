//! Event Hub
//!
//! Pub-sub fan-out over classified exchange events. Each subscriber owns a
//! bounded mpsc channel; a subscriber that cannot keep up is dropped with
//! its lagged flag set and must reconnect and replay from a recent offset.
//! A bounded replay ring serves offset-based catch-up; no deduplication is
//! promised across reconnects, so consumers key on `update_id`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::metrics::{EVENTS_PUBLISHED_TOTAL, WS_SUBSCRIBERS, WS_SUBSCRIBERS_LAGGED_TOTAL};

use super::classifier::ExchangeEvent;

struct Subscriber {
    topics: HashSet<String>,
    sender: mpsc::Sender<ExchangeEvent>,
    lagged: Arc<AtomicBool>,
}

/// Handed to a WebSocket connection at registration.
pub struct SubscriberHandle {
    pub id: u64,
    pub receiver: mpsc::Receiver<ExchangeEvent>,
    /// Set by the hub just before it drops a subscriber for falling
    /// behind; lets the connection distinguish `lagged` from shutdown.
    pub lagged: Arc<AtomicBool>,
}

pub struct EventHub {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    replay: RwLock<VecDeque<ExchangeEvent>>,
    next_id: AtomicU64,
    last_offset: AtomicU64,
    buffer_size: usize,
    replay_capacity: usize,
}

impl EventHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            replay: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            last_offset: AtomicU64::new(0),
            buffer_size,
            replay_capacity: (buffer_size * 4).max(4096),
        }
    }

    /// Last ledger offset published, for health reporting and
    /// read-your-writes hints.
    pub fn last_offset(&self) -> u64 {
        self.last_offset.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    // ========================================================================
    // Subscriber lifecycle
    // ========================================================================

    pub fn register(&self) -> SubscriberHandle {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let lagged = Arc::new(AtomicBool::new(false));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers.write().insert(
            id,
            Subscriber {
                topics: HashSet::new(),
                sender,
                lagged: Arc::clone(&lagged),
            },
        );
        metrics::gauge!(WS_SUBSCRIBERS).set(self.subscriber_count() as f64);

        SubscriberHandle {
            id,
            receiver,
            lagged,
        }
    }

    pub fn unregister(&self, id: u64) {
        self.subscribers.write().remove(&id);
        metrics::gauge!(WS_SUBSCRIBERS).set(self.subscriber_count() as f64);
    }

    /// Add topics to a subscription and return the replay backlog for them:
    /// every retained event on those topics with offset greater than
    /// `since`, oldest first. The live tail follows on the channel.
    pub fn add_topics(&self, id: u64, topics: &[String], since: Option<u64>) -> Vec<ExchangeEvent> {
        {
            let mut subscribers = self.subscribers.write();
            let Some(subscriber) = subscribers.get_mut(&id) else {
                return Vec::new();
            };
            subscriber.topics.extend(topics.iter().cloned());
        }

        let floor = since.unwrap_or(u64::MAX);
        self.replay
            .read()
            .iter()
            .filter(|event| event.offset > floor && topics.contains(&event.topic))
            .cloned()
            .collect()
    }

    pub fn remove_topics(&self, id: u64, topics: &[String]) {
        if let Some(subscriber) = self.subscribers.write().get_mut(&id) {
            for topic in topics {
                subscriber.topics.remove(topic);
            }
        }
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    pub fn publish(&self, event: ExchangeEvent) {
        self.last_offset.store(event.offset, Ordering::Release);

        {
            let mut replay = self.replay.write();
            if replay.len() == self.replay_capacity {
                replay.pop_front();
            }
            replay.push_back(event.clone());
        }

        let mut dropped: Vec<u64> = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for (id, subscriber) in subscribers.iter() {
                if !subscriber.topics.contains(&event.topic) {
                    continue;
                }
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        subscriber.lagged.store(true, Ordering::Release);
                        dropped.push(*id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        dropped.push(*id);
                    }
                }
            }
        }

        if !dropped.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in dropped {
                if let Some(subscriber) = subscribers.remove(&id) {
                    if subscriber.lagged.load(Ordering::Acquire) {
                        tracing::warn!(subscriber = id, "Dropping lagged subscriber");
                        metrics::counter!(WS_SUBSCRIBERS_LAGGED_TOTAL).increment(1);
                    }
                }
            }
            metrics::gauge!(WS_SUBSCRIBERS).set(self.subscriber_count() as f64);
        }

        metrics::counter!(EVENTS_PUBLISHED_TOTAL).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::classifier::EventPayload;
    use crate::models::{Trade, TradingPair};
    use rust_decimal_macros::dec;

    fn event(offset: u64, topic: &str) -> ExchangeEvent {
        ExchangeEvent {
            update_id: super::super::classifier::update_id(offset, 0),
            offset,
            topic: topic.to_string(),
            payload: EventPayload::Trade {
                contract_id: format!("#t-{}", offset),
                trade: Trade {
                    trade_id: format!("t-{}", offset),
                    buyer: "bob".into(),
                    seller: "alice".into(),
                    pair: TradingPair::parse("BTC/USDT").unwrap(),
                    price: dec!(50000),
                    quantity: dec!(1),
                    timestamp: chrono::Utc::now(),
                },
            },
        }
    }

    #[tokio::test]
    async fn events_route_by_topic() {
        let hub = EventHub::new(8);
        let mut handle = hub.register();
        hub.add_topics(handle.id, &["BTC/USDT:trades".to_string()], None);

        hub.publish(event(1, "BTC/USDT:trades"));
        hub.publish(event(2, "ETH/USDT:trades"));
        hub.publish(event(3, "BTC/USDT:trades"));

        let first = handle.receiver.recv().await.unwrap();
        assert_eq!(first.offset, 1);
        let second = handle.receiver.recv().await.unwrap();
        assert_eq!(second.offset, 3);
        assert_eq!(hub.last_offset(), 3);
    }

    #[tokio::test]
    async fn replay_returns_events_after_since() {
        let hub = EventHub::new(8);
        for offset in 1..=5 {
            hub.publish(event(offset, "BTC/USDT:trades"));
        }

        let handle = hub.register();
        let backlog = hub.add_topics(handle.id, &["BTC/USDT:trades".to_string()], Some(2));
        let offsets: Vec<u64> = backlog.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![3, 4, 5]);

        // Without `since` there is no backlog, only the live tail.
        let handle2 = hub.register();
        let backlog2 = hub.add_topics(handle2.id, &["BTC/USDT:trades".to_string()], None);
        assert!(backlog2.is_empty());
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_as_lagged() {
        let hub = EventHub::new(2);
        let mut handle = hub.register();
        hub.add_topics(handle.id, &["BTC/USDT:trades".to_string()], None);

        // Buffer of 2: the third send overflows and drops the subscriber.
        hub.publish(event(1, "BTC/USDT:trades"));
        hub.publish(event(2, "BTC/USDT:trades"));
        hub.publish(event(3, "BTC/USDT:trades"));

        assert!(handle.lagged.load(Ordering::Acquire));
        assert_eq!(hub.subscriber_count(), 0);

        // The buffered events are still readable, then the channel closes.
        assert_eq!(handle.receiver.recv().await.unwrap().offset, 1);
        assert_eq!(handle.receiver.recv().await.unwrap().offset, 2);
        assert!(handle.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribed_topics_stop_flowing() {
        let hub = EventHub::new(8);
        let mut handle = hub.register();
        let topics = vec!["BTC/USDT:trades".to_string()];
        hub.add_topics(handle.id, &topics, None);
        hub.publish(event(1, "BTC/USDT:trades"));
        hub.remove_topics(handle.id, &topics);
        hub.publish(event(2, "BTC/USDT:trades"));

        assert_eq!(handle.receiver.recv().await.unwrap().offset, 1);
        assert!(handle.receiver.try_recv().is_err());
    }
}
