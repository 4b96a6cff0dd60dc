//! Order-book replication core: ingestion queue, per-symbol books, worker
//! pool, fan-out, and latency accounting.

pub mod book;
pub mod buffer;
pub mod engine;
pub mod latency;

pub use book::{Ladder, Orderbook};
pub use buffer::RingBuffer;
pub use engine::{EngineConfig, MarketData};
pub use latency::{LatencySummary, LatencyTracker, StageStats};
