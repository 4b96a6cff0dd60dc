//! Exchange feed session.
//!
//! Opens a TLS WebSocket to the exchange, subscribes to the configured
//! instruments' `book.<symbol>.100ms` channels, and hands every book frame to
//! the engine's ingestion queue. The arrival timestamp is captured before any
//! JSON parsing so queueing and processing delays are measured from the wire.
//!
//! On any disconnect the session reconnects with exponential backoff and
//! resubscribes; the fresh snapshot the exchange sends after a resubscribe
//! overwrites whatever the book held before the gap.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::market::MarketData;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub ws_url: String,
    pub symbols: Vec<String>,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://test.deribit.com/ws/api/v2".to_string(),
            symbols: vec!["BTC-PERPETUAL".to_string()],
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Default)]
pub struct FeedStats {
    pub messages_received: AtomicU64,
    pub book_updates: AtomicU64,
    pub parse_errors: AtomicU64,
    pub reconnects: AtomicU64,
    pub subscriptions: AtomicU64,
}

impl FeedStats {
    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            book_updates: self.book_updates.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeedStatsSnapshot {
    pub messages_received: u64,
    pub book_updates: u64,
    pub parse_errors: u64,
    pub reconnects: u64,
    pub subscriptions: u64,
}

pub struct FeedSession {
    config: FeedConfig,
    engine: Arc<MarketData>,
    running: AtomicBool,
    request_id: AtomicU64,
    stats: FeedStats,
}

impl FeedSession {
    pub fn new(config: FeedConfig, engine: Arc<MarketData>) -> Arc<Self> {
        Arc::new(Self {
            config,
            engine,
            running: AtomicBool::new(false),
            request_id: AtomicU64::new(1),
            stats: FeedStats::default(),
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    /// Connect-and-stream until stopped, reconnecting on any failure.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);

        let base_delay = Duration::from_millis(self.config.reconnect_base_delay_ms);
        let max_delay = Duration::from_millis(self.config.reconnect_max_delay_ms);
        let mut reconnect_delay = base_delay;

        while self.running.load(Ordering::Relaxed) {
            match self.connect_and_stream().await {
                Ok(()) => {
                    reconnect_delay = base_delay;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        delay_ms = reconnect_delay.as_millis() as u64,
                        "feed disconnected, reconnecting"
                    );
                }
            }

            if !self.running.load(Ordering::Relaxed) {
                break;
            }

            self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
            sleep(reconnect_delay).await;
            reconnect_delay = (reconnect_delay * 2).min(max_delay);
        }

        info!("feed session stopped");
    }

    async fn connect_and_stream(&self) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.config.ws_url)
            .await
            .context("failed to connect to exchange feed")?;
        info!(url = %self.config.ws_url, "connected to exchange feed");

        let (mut write, mut read) = ws_stream.split();

        // One subscribe request covering every configured instrument; the
        // exchange answers with a snapshot per channel.
        let channels: Vec<String> = self
            .config
            .symbols
            .iter()
            .map(|s| format!("book.{s}.100ms"))
            .collect();
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": "public/subscribe",
            "params": { "channels": channels },
        });
        write
            .send(Message::Text(request.to_string()))
            .await
            .context("failed to send subscription request")?;
        self.stats
            .subscriptions
            .fetch_add(self.config.symbols.len() as u64, Ordering::Relaxed);
        info!(count = self.config.symbols.len(), "subscribed to book channels");

        while self.running.load(Ordering::Relaxed) {
            let Some(msg) = read.next().await else {
                return Err(anyhow!("feed stream ended"));
            };
            // Arrival stamp before any parsing.
            let arrival_ns = self.engine.now_ns();

            match msg {
                Ok(Message::Text(text)) => {
                    self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
                    self.handle_frame(&text, arrival_ns);
                }
                Ok(Message::Ping(payload)) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .context("failed to answer ping")?;
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "feed closed by server");
                    return Err(anyhow!("feed closed by server"));
                }
                Ok(_) => {}
                Err(e) => return Err(anyhow!("feed websocket error: {e}")),
            }
        }

        Ok(())
    }

    fn handle_frame(&self, text: &str, arrival_ns: u64) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "failed to parse feed frame");
                return;
            }
        };

        // JSON-RPC responses to our own requests.
        if frame.get("result").is_some() && frame.get("id").is_some() {
            debug!(id = ?frame.get("id"), "subscription confirmed");
            return;
        }
        if let Some(error) = frame.get("error") {
            warn!(%error, "exchange error frame");
            return;
        }

        let Some(channel) = frame.pointer("/params/channel").and_then(Value::as_str) else {
            return;
        };
        if !channel.starts_with("book.") {
            return;
        }

        // Channel format: book.<SYMBOL>.100ms
        let mut parts = channel.split('.');
        let (Some(_), Some(symbol), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
            debug!(channel, "malformed book channel");
            return;
        };
        if symbol.is_empty() {
            return;
        }

        self.stats.book_updates.fetch_add(1, Ordering::Relaxed);
        self.engine.enqueue_at(symbol.to_string(), frame, arrival_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::EngineConfig;

    fn session() -> Arc<FeedSession> {
        let engine = MarketData::new(EngineConfig::default());
        FeedSession::new(FeedConfig::default(), engine)
    }

    #[test]
    fn book_frame_enqueued_with_extracted_symbol() {
        let feed = session();
        let frame = r#"{
            "params": {
                "channel": "book.BTC-PERPETUAL.100ms",
                "data": {"type": "snapshot", "timestamp": 100, "change_id": 1,
                         "bids": [[100.0, 1.0]], "asks": []}
            }
        }"#;
        feed.handle_frame(frame, 0);

        assert_eq!(feed.stats().snapshot().book_updates, 1);
        assert_eq!(feed.engine.queue_len(), 1);
    }

    #[test]
    fn confirmation_and_error_frames_ignored() {
        let feed = session();
        feed.handle_frame(r#"{"jsonrpc": "2.0", "id": 1, "result": ["book.BTC-PERPETUAL.100ms"]}"#, 0);
        feed.handle_frame(r#"{"error": {"code": 10000, "message": "bad request"}}"#, 0);

        assert_eq!(feed.stats().snapshot().book_updates, 0);
        assert_eq!(feed.engine.queue_len(), 0);
    }

    #[test]
    fn unparseable_frame_counted() {
        let feed = session();
        feed.handle_frame("not json at all", 0);

        assert_eq!(feed.stats().snapshot().parse_errors, 1);
        assert_eq!(feed.engine.queue_len(), 0);
    }

    #[test]
    fn non_book_channel_ignored() {
        let feed = session();
        feed.handle_frame(
            r#"{"params": {"channel": "ticker.BTC-PERPETUAL.100ms", "data": {}}}"#,
            0,
        );
        assert_eq!(feed.engine.queue_len(), 0);
    }
}
