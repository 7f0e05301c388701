use crate::subscription::StreamType;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, time::Duration};

/// Recent processing-time samples retained per stream type.
const RING_CAPACITY: usize = 500;

/// Per-stream-type ingestion statistics for one connection.
///
/// Records every frame outcome as it flows through the read loop: normalized frames by
/// [`StreamType`] with their processing latency, and malformed frames that could not be
/// attributed to a type. Snapshots are cloned under a small mutex.
#[derive(Debug, Default)]
pub struct StreamMonitor {
    inner: Mutex<MonitorInner>,
}

#[derive(Debug, Default)]
struct MonitorInner {
    started_at: Option<DateTime<Utc>>,
    unattributed_failures: u64,
    by_type: IndexMap<StreamType, TypeStats>,
}

#[derive(Debug, Default)]
struct TypeStats {
    received: u64,
    processing_times: VecDeque<Duration>,
}

impl StreamMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the observation window open (idempotent; first call wins).
    pub fn mark_started(&self) {
        let mut inner = self.inner.lock();
        if inner.started_at.is_none() {
            inner.started_at = Some(Utc::now());
        }
    }

    /// Record one successfully normalized frame and its processing latency.
    pub fn record_processed(&self, stream: StreamType, elapsed: Duration) {
        let mut inner = self.inner.lock();
        let stats = inner.by_type.entry(stream).or_default();
        stats.received += 1;
        if stats.processing_times.len() >= RING_CAPACITY {
            stats.processing_times.pop_front();
        }
        stats.processing_times.push_back(elapsed);
    }

    /// Record one frame that failed normalization before its stream type was known.
    pub fn record_failure(&self) {
        self.inner.lock().unattributed_failures += 1;
    }

    /// Consistent snapshot across all stream types.
    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.inner.lock();

        let by_type: IndexMap<StreamType, TypeSnapshot> = inner
            .by_type
            .iter()
            .map(|(stream, stats)| {
                let avg_processing_ms = if stats.processing_times.is_empty() {
                    0.0
                } else {
                    stats
                        .processing_times
                        .iter()
                        .map(|elapsed| elapsed.as_secs_f64() * 1_000.0)
                        .sum::<f64>()
                        / stats.processing_times.len() as f64
                };

                (
                    *stream,
                    TypeSnapshot {
                        received: stats.received,
                        avg_processing_ms,
                    },
                )
            })
            .collect();

        MonitorSnapshot {
            uptime_s: inner
                .started_at
                .map(|started_at| (Utc::now() - started_at).num_milliseconds() as f64 / 1_000.0)
                .unwrap_or(0.0),
            total_received: by_type.values().map(|snapshot| snapshot.received).sum(),
            unattributed_failures: inner.unattributed_failures,
            by_type,
        }
    }
}

/// Point-in-time [`StreamMonitor`] snapshot.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct MonitorSnapshot {
    pub uptime_s: f64,
    pub total_received: u64,
    pub unattributed_failures: u64,
    pub by_type: IndexMap<StreamType, TypeSnapshot>,
}

/// Statistics for one normalized stream type.
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct TypeSnapshot {
    pub received: u64,
    pub avg_processing_ms: f64,
}
