//! Throughput sampling over batches of successfully sent events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use siphon_core::config::DEFAULT_THROUGHPUT_BATCH;

/// One completed batch measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub events: u64,
    pub elapsed: Duration,
    pub events_per_sec: f64,
}

/// Counts events and emits a sample every `batch` events.
///
/// Safe to share between dispatchers. Under concurrent recording the
/// elapsed time of a batch is approximate, never its event count.
#[derive(Debug)]
pub struct ThroughputMeter {
    batch: u64,
    count: AtomicU64,
    checkpoint: Mutex<Instant>,
}

impl ThroughputMeter {
    pub fn new(batch: u64) -> Self {
        Self {
            batch: batch.max(1),
            count: AtomicU64::new(0),
            checkpoint: Mutex::new(Instant::now()),
        }
    }

    pub const fn batch(&self) -> u64 {
        self.batch
    }

    /// Events counted since the last checkpoint.
    pub fn pending(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Count one event. Returns a sample when this event completes a batch,
    /// after which the counter and checkpoint start over.
    pub fn record(&self) -> Option<ThroughputSample> {
        let batch = self.batch;
        let previous = match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(if c + 1 >= batch { 0 } else { c + 1 })
            }) {
            Ok(c) | Err(c) => c,
        };
        if previous + 1 < batch {
            return None;
        }

        let now = Instant::now();
        let mut checkpoint = self
            .checkpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.duration_since(*checkpoint);
        *checkpoint = now;
        drop(checkpoint);

        let secs = elapsed.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let events_per_sec = if secs > 0.0 {
            batch as f64 / secs
        } else {
            f64::INFINITY
        };
        Some(ThroughputSample {
            events: batch,
            elapsed,
            events_per_sec,
        })
    }

    /// Drop the current count and restart the checkpoint clock.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
        *self
            .checkpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(DEFAULT_THROUGHPUT_BATCH)
    }
}
