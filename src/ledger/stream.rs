//! Ledger update stream
//!
//! Maintains a WebSocket subscription to the ledger's update stream and
//! forwards parsed transactions through a bounded channel. The stream is
//! strictly monotone in offset: frames at or below the last delivered
//! offset are dropped, and reconnects resume from the last delivered
//! offset, so a flaky connection can duplicate ledger reads but never
//! reorder or regress what consumers see.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;

use crate::token::TokenProvider;

use super::types::LedgerUpdate;

const RECONNECT_BASE_MS: u64 = 1_000;
const RECONNECT_MAX_MS: u64 = 30_000;

/// Spawn the ingest task. Dropping the receiver terminates it.
pub fn spawn_update_stream(
    stream_url: String,
    tokens: Arc<TokenProvider>,
    from_offset: u64,
) -> mpsc::Receiver<LedgerUpdate> {
    let (sender, receiver) = mpsc::channel(256);
    tokio::spawn(run_stream(stream_url, tokens, from_offset, sender));
    receiver
}

async fn run_stream(
    stream_url: String,
    tokens: Arc<TokenProvider>,
    from_offset: u64,
    sender: mpsc::Sender<LedgerUpdate>,
) {
    let mut last_offset = from_offset;
    let mut backoff_ms = RECONNECT_BASE_MS;

    loop {
        match connect(&stream_url, &tokens, last_offset).await {
            Ok(mut ws) => {
                tracing::info!(offset = last_offset, "Ledger update stream connected");
                backoff_ms = RECONNECT_BASE_MS;

                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            let update: LedgerUpdate = match serde_json::from_str(&text) {
                                Ok(update) => update,
                                Err(e) => {
                                    tracing::warn!("Skipping undecodable stream frame: {}", e);
                                    continue;
                                }
                            };
                            if update.offset <= last_offset {
                                tracing::debug!(
                                    offset = update.offset,
                                    last = last_offset,
                                    "Dropping stale stream frame"
                                );
                                continue;
                            }
                            last_offset = update.offset;
                            if sender.send(update).await.is_err() {
                                tracing::info!("Update stream consumer gone, stopping ingest");
                                return;
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            let _ = ws.send(Message::Pong(data)).await;
                        }
                        Ok(Message::Close(_)) => {
                            tracing::warn!("Ledger closed the update stream");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("Ledger update stream error: {}", e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to connect ledger update stream: {}", e);
            }
        }

        if sender.is_closed() {
            return;
        }
        tracing::info!(
            "Reconnecting ledger update stream in {}ms from offset {}",
            backoff_ms,
            last_offset
        );
        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(RECONNECT_MAX_MS);
    }
}

async fn connect(
    stream_url: &str,
    tokens: &TokenProvider,
    after_offset: u64,
) -> anyhow::Result<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
> {
    let bearer = tokens.bearer().await?;
    let mut request = stream_url.into_client_request()?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {}", bearer).parse()?);

    let (mut ws, _) = connect_async(request).await?;
    ws.send(Message::Text(json!({ "after": after_offset }).to_string()))
        .await?;
    Ok(ws)
}
