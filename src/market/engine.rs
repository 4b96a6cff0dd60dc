//! Market-data engine: ingestion queue, book reconstruction, fan-out.
//!
//! The feed session enqueues raw `(symbol, payload)` frames; a pool of worker
//! threads pops them, applies snapshot/change semantics to the per-symbol
//! order book, and invokes registered callbacks with a consistent copy of the
//! updated book. Queries and updates for one symbol serialize on that
//! symbol's lock; different symbols never contend.
//!
//! The registry maps symbol -> `SymbolSlot`, and the slot's mutex guards the
//! book itself. A single lookup therefore yields the lock and the book
//! together, and the registry mutex is never held while a book is locked.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::book::{Ladder, Orderbook};
use super::buffer::RingBuffer;
use super::latency::{LatencyMeasurement, LatencySummary, LatencyTracker};

/// Subscriber callback invoked after each applied update. Runs on a worker
/// thread with no engine locks held; must not call back into the engine
/// synchronously.
pub type BookCallback = Arc<dyn Fn(&str, &Orderbook) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker threads applying updates.
    pub num_workers: usize,
    /// Ingestion queue capacity (rounded up to a power of two).
    pub queue_capacity: usize,
    /// Latency reservoir size.
    pub max_latency_samples: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_capacity: 65_536,
            max_latency_samples: LatencyTracker::DEFAULT_MAX_SAMPLES,
        }
    }
}

struct QueueEntry {
    symbol: String,
    payload: Value,
    receive_ns: u64,
    enqueue_ns: u64,
}

/// One symbol's book behind its own lock. The slot is allocated lazily on
/// first update and lives until process exit; its address is stable because
/// the registry stores an `Arc`.
struct SymbolSlot {
    book: Mutex<Orderbook>,
}

impl SymbolSlot {
    fn new() -> Self {
        Self {
            book: Mutex::new(Orderbook::default()),
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineStats {
    pub enqueued: AtomicU64,
    pub dropped: AtomicU64,
    pub processed: AtomicU64,
    pub stale_discards: AtomicU64,
    pub malformed_discards: AtomicU64,
    pub callback_panics: AtomicU64,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            stale_discards: self.stale_discards.load(Ordering::Relaxed),
            malformed_discards: self.malformed_discards.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub processed: u64,
    pub stale_discards: u64,
    pub malformed_discards: u64,
    pub callback_panics: u64,
}

/// The market-data engine. Construct with [`MarketData::new`], then
/// [`start`](MarketData::start) the worker pool.
pub struct MarketData {
    config: EngineConfig,
    queue: RingBuffer<QueueEntry>,
    books: Mutex<HashMap<String, Arc<SymbolSlot>>>,
    callbacks: Mutex<Vec<BookCallback>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stats: EngineStats,
    latency: LatencyTracker,
    epoch: Instant,
}

impl MarketData {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let queue = RingBuffer::new(config.queue_capacity);
        let latency = LatencyTracker::new(config.max_latency_samples);
        Arc::new(Self {
            config,
            queue,
            books: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            stats: EngineStats::default(),
            latency,
            epoch: Instant::now(),
        })
    }

    /// Monotonic nanoseconds since engine construction.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Spawn the worker pool. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            warn!("book workers already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        for i in 0..self.config.num_workers.max(1) {
            let engine = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("book-worker-{i}"))
                .spawn(move || engine.worker_loop())
                .expect("failed to spawn book worker");
            workers.push(handle);
        }

        info!(
            workers = self.config.num_workers.max(1),
            queue_capacity = self.queue.capacity(),
            "market data engine started"
        );
    }

    /// Stop the workers and join them. Items still queued are discarded.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        info!("market data engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enqueue an update, stamping the receive time now. Never blocks; on a
    /// full queue the payload is dropped and counted.
    pub fn enqueue(&self, symbol: String, payload: Value) {
        let receive_ns = self.now_ns();
        self.enqueue_at(symbol, payload, receive_ns);
    }

    /// Enqueue with a caller-supplied receive timestamp (the feed session
    /// stamps arrival before JSON parsing).
    pub fn enqueue_at(&self, symbol: String, payload: Value, receive_ns: u64) {
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        let entry = QueueEntry {
            symbol,
            payload,
            receive_ns,
            enqueue_ns: self.now_ns(),
        };
        if self.queue.push(entry).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Register a subscriber callback. Callbacks receive a consistent copy of
    /// the book taken under the symbol lock; they run without engine locks.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &Orderbook) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Return a copy of the book for `symbol`, or a default (unknown) book.
    pub fn get_book(&self, symbol: &str) -> Orderbook {
        let slot = self.books.lock().get(symbol).cloned();
        match slot {
            Some(slot) => slot.book.lock().clone(),
            None => Orderbook::default(),
        }
    }

    /// Symbols with at least one applied update.
    pub fn known_symbols(&self) -> Vec<String> {
        self.books.lock().keys().cloned().collect()
    }

    pub fn dropped_count(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn latency_summary(&self) -> LatencySummary {
        self.latency.summary()
    }

    fn worker_loop(self: Arc<Self>) {
        while self.running.load(Ordering::Relaxed) {
            match self.queue.pop() {
                Some(entry) => {
                    let pop_ns = self.now_ns();
                    self.apply(&entry.symbol, &entry.payload);
                    let apply_ns = self.now_ns();

                    self.latency.record(LatencyMeasurement {
                        receive_to_enqueue_ns: entry.enqueue_ns.saturating_sub(entry.receive_ns),
                        enqueue_to_pop_ns: pop_ns.saturating_sub(entry.enqueue_ns),
                        pop_to_apply_ns: apply_ns.saturating_sub(pop_ns),
                        total_ns: apply_ns.saturating_sub(entry.receive_ns),
                    });
                    self.stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                None => thread::sleep(Duration::from_micros(100)),
            }
        }
    }

    /// Lazily allocate the slot for `symbol`. The registry lock is released
    /// before the slot's own lock is ever taken.
    fn slot_for(&self, symbol: &str) -> Arc<SymbolSlot> {
        let mut books = self.books.lock();
        match books.get(symbol) {
            Some(slot) => Arc::clone(slot),
            None => {
                let slot = Arc::new(SymbolSlot::new());
                books.insert(symbol.to_string(), Arc::clone(&slot));
                slot
            }
        }
    }

    /// Apply one feed payload to its book. Updates are serialized per symbol
    /// by the slot lock; fan-out happens after the lock is released.
    fn apply(&self, symbol: &str, payload: &Value) {
        let Some(data) = payload.get("params").and_then(|p| p.get("data")) else {
            self.stats.malformed_discards.fetch_add(1, Ordering::Relaxed);
            debug!(symbol, "update payload missing data object, discarding");
            return;
        };

        let update_ts = data.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
        let kind = data.get("type").and_then(Value::as_str).unwrap_or("");

        let slot = self.slot_for(symbol);
        let updated = {
            let mut book = slot.book.lock();

            if update_ts <= book.timestamp {
                self.stats.stale_discards.fetch_add(1, Ordering::Relaxed);
                return;
            }

            match kind {
                "snapshot" => {
                    // A snapshot is authoritative: nothing from the previous
                    // state survives.
                    book.reset();
                    book.instrument_name = symbol.to_string();
                }
                "change" => {}
                other => {
                    self.stats.malformed_discards.fetch_add(1, Ordering::Relaxed);
                    debug!(symbol, update_type = other, "unknown update type, discarding");
                    return;
                }
            }

            if let Some(bids) = data.get("bids") {
                apply_ladder_deltas(&mut book.bids, bids, symbol, "bids");
            }
            if let Some(asks) = data.get("asks") {
                apply_ladder_deltas(&mut book.asks, asks, symbol, "asks");
            }

            book.timestamp = update_ts;
            if let Some(change_id) = data.get("change_id").and_then(Value::as_i64) {
                book.change_id = change_id;
            }
            book.refresh_top();

            book.clone()
        };

        self.notify(symbol, &updated);
    }

    fn notify(&self, symbol: &str, book: &Orderbook) {
        // Snapshot the list so the callbacks mutex is not held during
        // invocation; a callback registering another callback must not
        // deadlock.
        let callbacks: Vec<BookCallback> = self.callbacks.lock().clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(symbol, book))).is_err() {
                self.stats.callback_panics.fetch_add(1, Ordering::Relaxed);
                error!(symbol, "orderbook callback panicked, continuing with remaining callbacks");
            }
        }
    }
}

impl Drop for MarketData {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Apply one side's ladder deltas. A malformed delta is skipped with a
/// diagnostic; the rest of the batch still applies.
///
/// Two encodings arrive on the wire:
/// - `[price, amount]` sets the level, zero amount deletes it
/// - `[op, price, amount]` with op `new`/`change`/`delete`; `delete` ignores
///   the amount
fn apply_ladder_deltas(ladder: &mut Ladder, deltas: &Value, symbol: &str, side: &str) {
    let Some(rows) = deltas.as_array() else {
        if !deltas.is_null() {
            warn!(symbol, side, "ladder field is not an array, skipping side");
        }
        return;
    };

    for row in rows {
        let Some(parts) = row.as_array() else {
            warn!(symbol, side, "ladder delta is not an array, skipping");
            continue;
        };

        if parts.len() >= 3 && parts[0].is_string() {
            let op = parts[0].as_str().unwrap_or_default();
            let Some(price) = parts[1].as_f64() else {
                warn!(symbol, side, "ladder delta missing price, skipping");
                continue;
            };
            match op {
                "delete" => Orderbook::delete_level(ladder, price),
                "new" | "change" => match parts[2].as_f64() {
                    Some(amount) => Orderbook::set_level(ladder, price, amount),
                    None => warn!(symbol, side, "ladder delta has non-numeric amount, skipping"),
                },
                other => warn!(symbol, side, op = other, "unknown ladder op, skipping"),
            }
        } else if parts.len() >= 2 {
            let (Some(price), Some(amount)) = (parts[0].as_f64(), parts[1].as_f64()) else {
                warn!(symbol, side, "ladder delta has non-numeric fields, skipping");
                continue;
            };
            Orderbook::set_level(ladder, price, amount);
        } else {
            warn!(symbol, side, arity = parts.len(), "short ladder delta, skipping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn engine() -> Arc<MarketData> {
        MarketData::new(EngineConfig::default())
    }

    fn book_update(symbol: &str, data: Value) -> Value {
        json!({
            "params": {
                "channel": format!("book.{symbol}.100ms"),
                "data": data,
            }
        })
    }

    fn snapshot_payload(symbol: &str, ts: i64, change_id: i64, bids: Value, asks: Value) -> Value {
        book_update(
            symbol,
            json!({
                "type": "snapshot",
                "timestamp": ts,
                "change_id": change_id,
                "bids": bids,
                "asks": asks,
            }),
        )
    }

    fn change_payload(symbol: &str, ts: i64, change_id: i64, bids: Value, asks: Value) -> Value {
        book_update(
            symbol,
            json!({
                "type": "change",
                "timestamp": ts,
                "change_id": change_id,
                "bids": bids,
                "asks": asks,
            }),
        )
    }

    #[test]
    fn snapshot_establishes_top_of_book() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload(
                "BTC-PERPETUAL",
                100,
                1,
                json!([[99.5, 2.0], [100.0, 1.0]]),
                json!([[101.0, 3.0]]),
            ),
        );

        let ob = md.get_book("BTC-PERPETUAL");
        assert!(ob.is_known());
        assert_eq!(ob.best_bid_price, 100.0);
        assert_eq!(ob.best_bid_amount, 1.0);
        assert_eq!(ob.best_ask_price, 101.0);
        assert_eq!(ob.best_ask_amount, 3.0);
        assert_eq!(ob.timestamp, 100);
        assert_eq!(ob.change_id, 1);
    }

    #[test]
    fn incremental_add_and_delete() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload(
                "BTC-PERPETUAL",
                100,
                1,
                json!([[99.5, 2.0], [100.0, 1.0]]),
                json!([[101.0, 3.0]]),
            ),
        );
        md.apply(
            "BTC-PERPETUAL",
            &change_payload(
                "BTC-PERPETUAL",
                101,
                2,
                json!([[100.5, 0.5]]),
                json!([[101.0, 0.0]]),
            ),
        );

        let ob = md.get_book("BTC-PERPETUAL");
        assert_eq!(ob.best_bid_price, 100.5);
        assert_eq!(ob.best_bid_amount, 0.5);
        assert_eq!(ob.best_ask_price, 0.0);
        assert!(ob.asks.is_empty());
        assert_eq!(ob.timestamp, 101);
        assert_eq!(ob.change_id, 2);
    }

    #[test]
    fn stale_update_discarded() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload("BTC-PERPETUAL", 100, 1, json!([[100.0, 1.0]]), json!([])),
        );
        md.apply(
            "BTC-PERPETUAL",
            &change_payload("BTC-PERPETUAL", 101, 2, json!([[100.5, 0.5]]), json!([])),
        );
        let before = md.get_book("BTC-PERPETUAL");

        // Same timestamp: not strictly greater, must be ignored.
        md.apply(
            "BTC-PERPETUAL",
            &change_payload("BTC-PERPETUAL", 101, 3, json!([[100.5, 9.9]]), json!([])),
        );

        let after = md.get_book("BTC-PERPETUAL");
        assert_eq!(before, after);
        assert_eq!(md.stats().snapshot().stale_discards, 1);
    }

    #[test]
    fn three_element_delete_form() {
        let md = engine();
        md.apply(
            "ETH-PERPETUAL",
            &snapshot_payload(
                "ETH-PERPETUAL",
                10,
                1,
                json!([[100.0, 1.0], [99.0, 2.0]]),
                json!([]),
            ),
        );
        md.apply(
            "ETH-PERPETUAL",
            &change_payload("ETH-PERPETUAL", 11, 2, json!([["delete", 100.0, 0.0]]), json!([])),
        );

        let ob = md.get_book("ETH-PERPETUAL");
        assert_eq!(ob.best_bid_price, 99.0);
        assert_eq!(ob.best_bid_amount, 2.0);
    }

    #[test]
    fn three_element_new_and_change_forms() {
        let md = engine();
        md.apply(
            "ETH-PERPETUAL",
            &snapshot_payload("ETH-PERPETUAL", 10, 1, json!([["new", 99.0, 2.0]]), json!([])),
        );
        md.apply(
            "ETH-PERPETUAL",
            &change_payload("ETH-PERPETUAL", 11, 2, json!([["change", 99.0, 5.0]]), json!([])),
        );

        let ob = md.get_book("ETH-PERPETUAL");
        assert_eq!(ob.best_bid_price, 99.0);
        assert_eq!(ob.best_bid_amount, 5.0);

        // Zero amount through the three-element form also deletes.
        md.apply(
            "ETH-PERPETUAL",
            &change_payload("ETH-PERPETUAL", 12, 3, json!([["change", 99.0, 0.0]]), json!([])),
        );
        assert!(md.get_book("ETH-PERPETUAL").bids.is_empty());
    }

    #[test]
    fn drop_on_overload() {
        let md = MarketData::new(EngineConfig {
            num_workers: 0,
            queue_capacity: 4,
            ..Default::default()
        });
        // No workers running: the queue fills and the rest drop.
        for i in 0..10 {
            md.enqueue(
                "BTC-PERPETUAL".to_string(),
                snapshot_payload("BTC-PERPETUAL", i, i, json!([]), json!([])),
            );
        }

        assert_eq!(md.dropped_count(), 6);
        assert_eq!(md.queue_len(), 4);
        assert_eq!(md.stats().snapshot().enqueued, 10);
    }

    #[test]
    fn second_snapshot_fully_replaces() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload(
                "BTC-PERPETUAL",
                100,
                1,
                json!([[99.0, 1.0], [98.0, 2.0]]),
                json!([[101.0, 1.0]]),
            ),
        );
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload("BTC-PERPETUAL", 200, 2, json!([[50.0, 7.0]]), json!([])),
        );

        let ob = md.get_book("BTC-PERPETUAL");
        assert_eq!(ob.bids.len(), 1);
        assert!(ob.asks.is_empty());
        assert_eq!(ob.best_bid_price, 50.0);
        assert_eq!(ob.best_ask_price, 0.0);
    }

    #[test]
    fn zero_amount_for_absent_price_is_noop() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload("BTC-PERPETUAL", 100, 1, json!([[100.0, 1.0]]), json!([])),
        );
        md.apply(
            "BTC-PERPETUAL",
            &change_payload("BTC-PERPETUAL", 101, 2, json!([[123.0, 0.0]]), json!([])),
        );

        let ob = md.get_book("BTC-PERPETUAL");
        assert_eq!(ob.bids.len(), 1);
        assert_eq!(ob.best_bid_price, 100.0);
        assert_eq!(ob.timestamp, 101);
    }

    #[test]
    fn malformed_delta_skipped_rest_applied() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload(
                "BTC-PERPETUAL",
                100,
                1,
                json!([[99.0], ["bogus", "x", 1.0], [100.0, 1.0], "not-an-array"]),
                json!([]),
            ),
        );

        let ob = md.get_book("BTC-PERPETUAL");
        assert_eq!(ob.bids.len(), 1);
        assert_eq!(ob.best_bid_price, 100.0);
    }

    #[test]
    fn missing_data_discards_whole_update() {
        let md = engine();
        md.apply("BTC-PERPETUAL", &json!({"params": {"channel": "book.BTC-PERPETUAL.100ms"}}));

        let ob = md.get_book("BTC-PERPETUAL");
        assert!(!ob.is_known());
        assert_eq!(md.stats().snapshot().malformed_discards, 1);
    }

    #[test]
    fn unknown_update_type_discarded_without_mutation() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload("BTC-PERPETUAL", 100, 1, json!([[100.0, 1.0]]), json!([])),
        );
        md.apply(
            "BTC-PERPETUAL",
            &book_update(
                "BTC-PERPETUAL",
                json!({"type": "heartbeat", "timestamp": 200, "bids": [[1.0, 1.0]]}),
            ),
        );

        let ob = md.get_book("BTC-PERPETUAL");
        assert_eq!(ob.timestamp, 100);
        assert_eq!(ob.bids.len(), 1);
    }

    #[test]
    fn explicit_top_fields_are_not_trusted() {
        let md = engine();
        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload("BTC-PERPETUAL", 100, 1, json!([[100.0, 1.0]]), json!([[101.0, 2.0]])),
        );
        // The payload claims a different top; the ladder wins.
        md.apply(
            "BTC-PERPETUAL",
            &book_update(
                "BTC-PERPETUAL",
                json!({
                    "type": "change",
                    "timestamp": 101,
                    "change_id": 2,
                    "bids": [[100.0, 0.0]],
                    "asks": [],
                    "best_bid_price": 100.0,
                    "best_bid_amount": 1.0,
                }),
            ),
        );

        let ob = md.get_book("BTC-PERPETUAL");
        assert!(ob.bids.is_empty());
        assert_eq!(ob.best_bid_price, 0.0);
        assert_eq!(ob.best_bid_amount, 0.0);
    }

    #[test]
    fn callbacks_fire_after_apply_with_consistent_copy() {
        let md = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        md.register_callback(move |symbol, book| {
            seen_cb.lock().push((symbol.to_string(), book.best_bid_price));
        });

        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload("BTC-PERPETUAL", 100, 1, json!([[100.0, 1.0]]), json!([])),
        );
        // A stale update must not fan out.
        md.apply(
            "BTC-PERPETUAL",
            &change_payload("BTC-PERPETUAL", 100, 2, json!([[200.0, 1.0]]), json!([])),
        );

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("BTC-PERPETUAL".to_string(), 100.0));
    }

    #[test]
    fn panicking_callback_does_not_poison_others() {
        let md = engine();
        let fired = Arc::new(AtomicUsize::new(0));

        md.register_callback(|_, _| panic!("subscriber bug"));
        let fired_cb = Arc::clone(&fired);
        md.register_callback(move |_, _| {
            fired_cb.fetch_add(1, Ordering::Relaxed);
        });

        md.apply(
            "BTC-PERPETUAL",
            &snapshot_payload("BTC-PERPETUAL", 100, 1, json!([[100.0, 1.0]]), json!([])),
        );

        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert_eq!(md.stats().snapshot().callback_panics, 1);

        // Book state unaffected by the panic.
        assert_eq!(md.get_book("BTC-PERPETUAL").best_bid_price, 100.0);
    }

    #[test]
    fn get_book_for_unknown_symbol_is_default() {
        let md = engine();
        let ob = md.get_book("NO-SUCH-INSTRUMENT");
        assert!(!ob.is_known());
        assert!(md.known_symbols().is_empty());
    }
}
