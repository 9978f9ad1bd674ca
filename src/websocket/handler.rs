//! WebSocket endpoint
//!
//! One connection multiplexes any number of topic subscriptions. Each
//! subscribe is answered with a snapshot, then the replay backlog for the
//! connection's `since` offset, then the live tail. The server pings every
//! 15 seconds and closes idle connections; a subscriber that falls behind
//! its buffer is closed with reason `lagged`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;

use crate::api::views;
use crate::auth::jwt::{validate_token, Claims};
use crate::events::update_id;
use crate::utils::response::AppError;
use crate::AppState;

use super::messages::{ClientMessage, ServerMessage, Topic};

const PING_INTERVAL: Duration = Duration::from_secs(15);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const SNAPSHOT_TRADES: usize = 50;
const SNAPSHOT_ORDERS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Last ledger offset the client has seen; replay starts above it.
    pub since: Option<u64>,
}

/// GET /ws?since=<offset>
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    let claims = validate_token(bearer.token(), &state.config.jwt_secret)
        .map_err(|_| AppError::unauthorized("invalid or expired token"))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims, query.since)))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    claims: Claims,
    since: Option<u64>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut handle = state.hub.register();
    tracing::debug!(party = claims.sub, subscriber = handle.id, "WebSocket connected");

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        handle_client_message(
                            &text,
                            &state,
                            &claims,
                            handle.id,
                            since,
                            &mut sender,
                        )
                        .await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_seen = Instant::now();
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        // Reset without a close handshake is normal client
                        // behaviour (browser tab closed, network switch).
                        tracing::warn!("WebSocket disconnected: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            event = handle.receiver.recv() => {
                match event {
                    Some(event) => {
                        let payload = match serde_json::to_value(&event.payload) {
                            Ok(value) => value,
                            Err(e) => {
                                tracing::error!("Unserialisable event payload: {}", e);
                                continue;
                            }
                        };
                        let msg = ServerMessage::Event {
                            topic: event.topic,
                            update_id: event.update_id,
                            payload,
                        };
                        if send_json(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        // The hub closed our channel: either we lagged past
                        // the buffer or the process is shutting down.
                        if handle.lagged.load(Ordering::Acquire) {
                            let _ = send_json(
                                &mut sender,
                                &ServerMessage::Close { reason: "lagged".into() },
                            )
                            .await;
                        }
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if last_seen.elapsed() > IDLE_TIMEOUT {
                    tracing::info!(subscriber = handle.id, "Closing idle WebSocket");
                    break;
                }
                if send_json(&mut sender, &ServerMessage::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.unregister(handle.id);
    tracing::debug!(party = claims.sub, subscriber = handle.id, "WebSocket closed");
}

async fn handle_client_message(
    text: &str,
    state: &Arc<AppState>,
    claims: &Claims,
    subscriber_id: u64,
    since: Option<u64>,
    sender: &mut SplitSink<WebSocket, Message>,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let _ = send_json(
                sender,
                &ServerMessage::Error {
                    code: "INVALID_MESSAGE".into(),
                    message: format!("failed to parse message: {}", e),
                },
            )
            .await;
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { topics } => {
            let mut accepted: Vec<Topic> = Vec::new();
            for raw in &topics {
                let Some(topic) = Topic::parse(raw) else {
                    let _ = send_json(
                        sender,
                        &ServerMessage::Error {
                            code: "INVALID_TOPIC".into(),
                            message: format!("unknown topic {:?}", raw),
                        },
                    )
                    .await;
                    continue;
                };
                if let Some(party) = topic.required_party() {
                    if !claims.can_act_as(party) {
                        let _ = send_json(
                            sender,
                            &ServerMessage::Error {
                                code: "FORBIDDEN".into(),
                                message: format!("token may not subscribe for {}", party),
                            },
                        )
                        .await;
                        continue;
                    }
                }
                accepted.push(topic);
            }

            if accepted.is_empty() {
                return;
            }

            let canonical: Vec<String> = accepted.iter().map(Topic::canonical).collect();
            let backlog = state.hub.add_topics(subscriber_id, &canonical, since);

            let _ = send_json(
                sender,
                &ServerMessage::Subscribed {
                    topics: canonical.clone(),
                },
            )
            .await;

            // Snapshot per topic, then replayed events, then the live tail
            // through the hub channel. Replay may overlap the snapshot;
            // clients deduplicate on updateId.
            let snapshot_update_id = update_id(state.hub.last_offset(), 0);
            for topic in &accepted {
                match snapshot_for(state, topic).await {
                    Ok(data) => {
                        let _ = send_json(
                            sender,
                            &ServerMessage::Snapshot {
                                topic: topic.canonical(),
                                data,
                                update_id: snapshot_update_id.clone(),
                            },
                        )
                        .await;
                    }
                    Err(e) => {
                        let _ = send_json(
                            sender,
                            &ServerMessage::Error {
                                code: e.code,
                                message: e.message,
                            },
                        )
                        .await;
                    }
                }
            }

            for event in backlog {
                let Ok(payload) = serde_json::to_value(&event.payload) else {
                    continue;
                };
                let _ = send_json(
                    sender,
                    &ServerMessage::Event {
                        topic: event.topic,
                        update_id: event.update_id,
                        payload,
                    },
                )
                .await;
            }
        }

        ClientMessage::Unsubscribe { topics } => {
            let canonical: Vec<String> = topics
                .iter()
                .filter_map(|raw| Topic::parse(raw))
                .map(|topic| topic.canonical())
                .collect();
            state.hub.remove_topics(subscriber_id, &canonical);
            let _ = send_json(sender, &ServerMessage::Unsubscribed { topics: canonical }).await;
        }

        ClientMessage::Ping => {
            let _ = send_json(sender, &ServerMessage::Pong).await;
        }

        // Liveness is tracked by the caller on any inbound frame.
        ClientMessage::Pong => {}
    }
}

async fn snapshot_for(state: &AppState, topic: &Topic) -> Result<serde_json::Value, AppError> {
    let data = match topic {
        Topic::Orderbook(pair) => serde_json::to_value(views::book_snapshot(state, pair).await?),
        Topic::Trades(pair) => {
            serde_json::to_value(views::recent_trades(state, Some(pair), SNAPSHOT_TRADES).await?)
        }
        Topic::Orders(party) => {
            serde_json::to_value(views::user_orders(state, party, None, SNAPSHOT_ORDERS).await?)
        }
        Topic::Balances(party) => serde_json::to_value(views::balances(state, party).await?),
    };
    data.map_err(|e| AppError::internal(&e.to_string()))
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).expect("server messages serialise");
    sender.send(Message::Text(text)).await
}
