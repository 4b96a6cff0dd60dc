//! Local fan-out WebSocket server.
//!
//! Downstream consumers connect on a plain (non-TLS) socket and manage their
//! subscriptions with `{"operation": "subscribe"|"unsubscribe", "symbol":
//! ...}` messages. One callback registered with the engine forwards every
//! applied update's top of book into a bounded channel; a distributor task
//! relays it to each subscribed connection. Both hops use `try_send`, so a
//! slow consumer drops messages instead of backing up the book workers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::market::{MarketData, Orderbook};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Engine-to-distributor channel capacity.
    pub update_buffer: usize,
    /// Per-connection outbound channel capacity.
    pub client_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            update_buffer: 1024,
            client_buffer: 64,
        }
    }
}

struct ClientHandle {
    symbols: HashSet<String>,
    tx: mpsc::Sender<String>,
}

#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections: AtomicU64,
    pub updates_forwarded: AtomicU64,
    pub updates_dropped: AtomicU64,
    pub client_drops: AtomicU64,
}

impl ServerStats {
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            updates_forwarded: self.updates_forwarded.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            client_drops: self.client_drops.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServerStatsSnapshot {
    pub connections: u64,
    pub updates_forwarded: u64,
    pub updates_dropped: u64,
    pub client_drops: u64,
}

pub struct FanoutServer {
    config: ServerConfig,
    clients: RwLock<HashMap<u64, ClientHandle>>,
    next_client_id: AtomicU64,
    stats: ServerStats,
}

impl FanoutServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            stats: ServerStats::default(),
        })
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Register the forwarding callback with the engine and serve until the
    /// listener fails.
    pub async fn run(self: Arc<Self>, engine: Arc<MarketData>) -> Result<()> {
        let (update_tx, mut update_rx) =
            mpsc::channel::<(String, String)>(self.config.update_buffer);

        // Book workers call this on their own threads; try_send keeps them
        // non-blocking under a slow distributor.
        {
            let server = Arc::clone(&self);
            engine.register_callback(move |symbol, book| {
                let message = top_of_book_message(symbol, book).to_string();
                if update_tx.try_send((symbol.to_string(), message)).is_err() {
                    server.stats.updates_dropped.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        let distributor = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some((symbol, message)) = update_rx.recv().await {
                distributor.broadcast(&symbol, &message);
            }
        });

        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind fan-out server on {addr}"))?;
        info!(%addr, "fan-out server listening");

        loop {
            let (stream, peer) = listener.accept().await.context("accept failed")?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    debug!(%peer, error = %e, "fan-out connection ended");
                }
            });
        }
    }

    /// Deliver one update to every connection subscribed to `symbol`.
    fn broadcast(&self, symbol: &str, message: &str) {
        let clients = self.clients.read();
        for client in clients.values() {
            if !client.symbols.contains(symbol) {
                continue;
            }
            if client.tx.try_send(message.to_string()).is_ok() {
                self.stats.updates_forwarded.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.client_drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let ws = accept_async(stream)
            .await
            .context("websocket handshake failed")?;
        let (mut write, mut read) = ws.split();

        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<String>(self.config.client_buffer);
        self.clients.write().insert(
            client_id,
            ClientHandle {
                symbols: HashSet::new(),
                tx,
            },
        );
        self.stats.connections.fetch_add(1, Ordering::Relaxed);
        debug!(client_id, "fan-out client connected");

        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    let Some(message) = outbound else { break };
                    if write.send(Message::Text(message)).await.is_err() {
                        break;
                    }
                }
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => self.handle_client_message(client_id, &text),
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(client_id, error = %e, "fan-out client error");
                            break;
                        }
                    }
                }
            }
        }

        self.clients.write().remove(&client_id);
        debug!(client_id, "fan-out client disconnected");
        Ok(())
    }

    fn handle_client_message(&self, client_id: u64, text: &str) {
        let Ok(request) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let operation = request.get("operation").and_then(Value::as_str).unwrap_or("");
        let Some(symbol) = request.get("symbol").and_then(Value::as_str) else {
            return;
        };

        let mut clients = self.clients.write();
        let Some(client) = clients.get_mut(&client_id) else {
            return;
        };
        match operation {
            "subscribe" => {
                client.symbols.insert(symbol.to_string());
                debug!(client_id, symbol, "client subscribed");
            }
            "unsubscribe" => {
                client.symbols.remove(symbol);
                debug!(client_id, symbol, "client unsubscribed");
            }
            other => debug!(client_id, operation = other, "unknown fan-out operation"),
        }
    }
}

/// JSON pushed to subscribers on every applied update.
fn top_of_book_message(symbol: &str, book: &Orderbook) -> Value {
    json!({
        "symbol": symbol,
        "timestamp": book.timestamp,
        "change_id": book.change_id,
        "best_bid": book.best_bid_price,
        "best_bid_amount": book.best_bid_amount,
        "best_ask": book.best_ask_price,
        "best_ask_amount": book.best_ask_amount,
    })
}
