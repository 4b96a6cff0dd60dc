//! Per-update latency measurement across the ingestion pipeline.
//!
//! Four stages are timed for every applied update:
//! 1. receive → enqueue (producer side, before the queue)
//! 2. enqueue → pop (queueing delay)
//! 3. pop → apply complete (processing)
//! 4. receive → apply complete (end to end)
//!
//! Samples live in a fixed-capacity ring that overwrites the oldest entry,
//! so the summary always reflects the most recent window. Percentiles are
//! exact order statistics over that window (copy, sort, index), not bucket
//! estimates.

use parking_lot::Mutex;
use serde::Serialize;

/// One update's stage timings, all in nanoseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyMeasurement {
    pub receive_to_enqueue_ns: u64,
    pub enqueue_to_pop_ns: u64,
    pub pop_to_apply_ns: u64,
    pub total_ns: u64,
}

#[derive(Debug)]
pub struct LatencyTracker {
    inner: Mutex<TrackerInner>,
    max_samples: usize,
}

#[derive(Debug)]
struct TrackerInner {
    samples: Vec<LatencyMeasurement>,
    /// Total measurements ever recorded; `recorded % max_samples` is the
    /// overwrite cursor once the ring is full.
    recorded: u64,
}

impl LatencyTracker {
    pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            inner: Mutex::new(TrackerInner {
                samples: Vec::with_capacity(max_samples.min(4096)),
                recorded: 0,
            }),
            max_samples,
        }
    }

    pub fn record(&self, m: LatencyMeasurement) {
        let mut inner = self.inner.lock();
        if inner.samples.len() < self.max_samples {
            inner.samples.push(m);
        } else {
            let idx = (inner.recorded % self.max_samples as u64) as usize;
            inner.samples[idx] = m;
        }
        inner.recorded += 1;
    }

    pub fn sample_count(&self) -> u64 {
        self.inner.lock().recorded
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.recorded = 0;
    }

    /// Summarize all four stages over the current window.
    pub fn summary(&self) -> LatencySummary {
        let samples = self.inner.lock().samples.clone();
        LatencySummary {
            receive_to_enqueue: stage_stats(&samples, |m| m.receive_to_enqueue_ns),
            enqueue_to_pop: stage_stats(&samples, |m| m.enqueue_to_pop_ns),
            pop_to_apply: stage_stats(&samples, |m| m.pop_to_apply_ns),
            total: stage_stats(&samples, |m| m.total_ns),
        }
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_SAMPLES)
    }
}

fn stage_stats(samples: &[LatencyMeasurement], extract: fn(&LatencyMeasurement) -> u64) -> StageStats {
    if samples.is_empty() {
        return StageStats::default();
    }

    let mut values: Vec<u64> = samples.iter().map(extract).collect();
    values.sort_unstable();

    let n = values.len();
    let sum: u64 = values.iter().sum();
    let at = |q: f64| values[((n as f64 * q) as usize).min(n - 1)];

    StageStats {
        min_ns: values[0],
        avg_ns: sum / n as u64,
        p50_ns: at(0.50),
        p95_ns: at(0.95),
        p99_ns: at(0.99),
        max_ns: values[n - 1],
        samples: n as u64,
    }
}

/// Order statistics for one pipeline stage, nanoseconds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageStats {
    pub min_ns: u64,
    pub avg_ns: u64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
    pub samples: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencySummary {
    pub receive_to_enqueue: StageStats,
    pub enqueue_to_pop: StageStats,
    pub pop_to_apply: StageStats,
    pub total: StageStats,
}
