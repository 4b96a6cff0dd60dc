//! Order routing over the exchange's HTTPS RPC surface.
//!
//! Synchronous callers await the request directly; fire-and-forget callers
//! push into a bounded queue drained by a small worker pool, the same
//! drop-on-full discipline the market-data path uses. Completion is reported
//! through an optional oneshot channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::market::RingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct OrderParams {
    pub instrument_name: String,
    pub amount: f64,
    /// Only sent for limit orders.
    pub price: f64,
    /// "limit" or "market".
    pub order_type: String,
    pub side: OrderSide,
}

struct OrderRequest {
    params: OrderParams,
    notify: Option<oneshot::Sender<Option<String>>>,
}

#[derive(Debug, Clone)]
pub struct OrderManagerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Default)]
pub struct OrderStats {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub rejected_full: AtomicU64,
}

impl OrderStats {
    pub fn snapshot(&self) -> OrderStatsSnapshot {
        OrderStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejected_full: u64,
}

pub struct OrderManager {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<Authenticator>,
    config: OrderManagerConfig,
    queue: RingBuffer<OrderRequest>,
    running: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: OrderStats,
}

impl OrderManager {
    pub fn new(base_url: String, auth: Arc<Authenticator>, config: OrderManagerConfig) -> Arc<Self> {
        let queue = RingBuffer::new(config.queue_capacity);
        Arc::new(Self {
            http: reqwest::Client::new(),
            base_url,
            auth,
            config,
            queue,
            running: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            stats: OrderStats::default(),
        })
    }

    /// Spawn the async-submission workers. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            warn!("order workers already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        for _ in 0..self.config.workers.max(1) {
            let manager = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                manager.worker_loop().await;
            }));
        }
        info!(workers = self.config.workers.max(1), "order manager started");
    }

    /// Stop the workers; queued orders are discarded.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("order manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &OrderStats {
        &self.stats
    }

    /// Orders queued but not yet picked up by a worker.
    pub fn pending_orders(&self) -> usize {
        self.queue.len()
    }

    // === Synchronous surface ===

    pub async fn place_buy(&self, params: &OrderParams) -> Result<String> {
        self.place("/private/buy", params).await
    }

    pub async fn place_sell(&self, params: &OrderParams) -> Result<String> {
        self.place("/private/sell", params).await
    }

    pub async fn cancel(&self, order_id: &str) -> Result<bool> {
        let body = self
            .authorized_get("/private/cancel", &[("order_id", order_id.to_string())])
            .await?;
        Ok(body.get("result").is_some())
    }

    pub async fn modify(&self, order_id: &str, new_amount: f64, new_price: f64) -> Result<bool> {
        let body = self
            .authorized_get(
                "/private/edit",
                &[
                    ("order_id", order_id.to_string()),
                    ("amount", new_amount.to_string()),
                    ("price", new_price.to_string()),
                ],
            )
            .await?;
        Ok(body.get("result").is_some())
    }

    pub async fn get_positions(&self, currency: &str, kind: &str) -> Result<Value> {
        self.authorized_get(
            "/private/get_positions",
            &[
                ("currency", currency.to_string()),
                ("kind", kind.to_string()),
            ],
        )
        .await
    }

    // === Fire-and-forget surface ===

    /// Queue an order for background submission. Returns false (and drops the
    /// order) when the queue is full.
    pub fn submit_async(&self, params: OrderParams) -> bool {
        self.submit_request(OrderRequest {
            params,
            notify: None,
        })
    }

    /// Queue an order and receive the resulting order id (or `None` on
    /// failure) through a oneshot channel.
    pub fn submit_with_result(&self, params: OrderParams) -> oneshot::Receiver<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.submit_request(OrderRequest {
            params,
            notify: Some(tx),
        });
        rx
    }

    fn submit_request(&self, request: OrderRequest) -> bool {
        match self.queue.push(request) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(rejected) => {
                self.stats.rejected_full.fetch_add(1, Ordering::Relaxed);
                if let Some(tx) = rejected.notify {
                    let _ = tx.send(None);
                }
                false
            }
        }
    }

    async fn worker_loop(&self) {
        while self.running.load(Ordering::Relaxed) {
            match self.queue.pop() {
                Some(request) => self.process(request).await,
                None => tokio::time::sleep(Duration::from_micros(100)).await,
            }
        }
    }

    async fn process(&self, request: OrderRequest) {
        let result = match request.params.side {
            OrderSide::Buy => self.place_buy(&request.params).await,
            OrderSide::Sell => self.place_sell(&request.params).await,
        };

        let order_id = match result {
            Ok(order_id) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(%order_id, instrument = %request.params.instrument_name, "async order placed");
                Some(order_id)
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    instrument = %request.params.instrument_name,
                    "async order failed"
                );
                None
            }
        };

        if let Some(tx) = request.notify {
            let _ = tx.send(order_id);
        }
    }

    async fn place(&self, path: &str, params: &OrderParams) -> Result<String> {
        let mut query = vec![
            ("amount", params.amount.to_string()),
            ("instrument_name", params.instrument_name.clone()),
            ("type", params.order_type.clone()),
        ];
        if params.order_type == "limit" {
            query.push(("price", params.price.to_string()));
        }

        let body = self.authorized_get(path, &query).await?;
        body.pointer("/result/order/order_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{path} response missing order id"))
    }

    async fn authorized_get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let Some(token) = self.auth.access_token() else {
            bail!("not authenticated");
        };

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;

        if !response.status().is_success() {
            bail!("{path} returned status {}", response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("{path} response was not JSON"))
    }
}

impl Drop for OrderManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
