use crate::event::EventPriority;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, time::Duration};

/// Number of recent samples retained for latency / queue-size statistics.
const RING_CAPACITY: usize = 1_000;

/// Number of recent enqueue outcomes considered by the sliding-window drop rate.
const HEALTH_WINDOW: usize = 1_000;

/// Monotonic dispatch counters plus bounded rings of recent processing times and queue sizes.
///
/// All mutation happens under one small mutex; [`EventMetrics::snapshot`] clones a consistent
/// view in a single critical section. Counters never go backwards.
#[derive(Debug, Default)]
pub struct EventMetrics {
    inner: Mutex<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    received: u64,
    processed: u64,
    dropped: u64,
    handler_faults: u64,
    by_priority: [u64; 5],
    processing_times: VecDeque<Duration>,
    queue_sizes: VecDeque<usize>,
    recent_drops: VecDeque<bool>,
}

impl EventMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, priority: EventPriority) {
        let mut inner = self.inner.lock();
        inner.received += 1;
        inner.by_priority[priority.index()] += 1;
    }

    pub fn record_processed(&self, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.processed += 1;
        push_bounded(&mut inner.processing_times, elapsed, RING_CAPACITY);
    }

    pub fn record_dropped(&self) {
        let mut inner = self.inner.lock();
        inner.dropped += 1;
        push_bounded(&mut inner.recent_drops, true, HEALTH_WINDOW);
    }

    /// Record an accepted enqueue for the sliding health window.
    pub fn record_accepted(&self) {
        let mut inner = self.inner.lock();
        push_bounded(&mut inner.recent_drops, false, HEALTH_WINDOW);
    }

    pub fn record_handler_fault(&self) {
        self.inner.lock().handler_faults += 1;
    }

    pub fn record_queue_size(&self, size: usize) {
        let mut inner = self.inner.lock();
        push_bounded(&mut inner.queue_sizes, size, RING_CAPACITY);
    }

    /// Drop rate over the sliding window of recent enqueue outcomes.
    ///
    /// Distinct from the lifetime `dropped / received` ratio so health recovers automatically
    /// once load falls.
    pub fn window_drop_rate(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.recent_drops.is_empty() {
            return 0.0;
        }
        let drops = inner.recent_drops.iter().filter(|dropped| **dropped).count();
        drops as f64 / inner.recent_drops.len() as f64
    }

    /// Consistent snapshot of all counters and derived statistics.
    pub fn snapshot(&self, queue_size: usize, in_flight: u64) -> DispatcherStats {
        let inner = self.inner.lock();

        let mut sorted_times: Vec<f64> = inner
            .processing_times
            .iter()
            .map(|elapsed| elapsed.as_secs_f64() * 1_000.0)
            .collect();
        sorted_times.sort_by(|a, b| a.total_cmp(b));

        let drop_rate = if inner.received > 0 {
            inner.dropped as f64 / inner.received as f64
        } else {
            0.0
        };

        DispatcherStats {
            received: inner.received,
            processed: inner.processed,
            dropped: inner.dropped,
            handler_faults: inner.handler_faults,
            queue_size,
            in_flight,
            drop_rate,
            avg_processing_time_ms: mean(&sorted_times),
            p50_processing_time_ms: percentile(&sorted_times, 0.50),
            p99_processing_time_ms: percentile(&sorted_times, 0.99),
            avg_queue_size: {
                let sizes: Vec<f64> = inner.queue_sizes.iter().map(|size| *size as f64).collect();
                mean(&sizes)
            },
            by_priority: PriorityCounts::from(inner.by_priority),
        }
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, value: T, capacity: usize) {
    if ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(value);
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Nearest-rank percentile over pre-sorted values. Returns 0.0 for an empty set.
fn percentile(sorted: &[f64], rank: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * rank) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Events received per [`EventPriority`].
#[derive(Copy, Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct PriorityCounts {
    pub critical: u64,
    pub high: u64,
    pub normal: u64,
    pub low: u64,
    pub background: u64,
}

impl From<[u64; 5]> for PriorityCounts {
    fn from(counts: [u64; 5]) -> Self {
        Self {
            critical: counts[0],
            high: counts[1],
            normal: counts[2],
            low: counts[3],
            background: counts[4],
        }
    }
}

impl PriorityCounts {
    fn merge(self, other: Self) -> Self {
        Self {
            critical: self.critical + other.critical,
            high: self.high + other.high,
            normal: self.normal + other.normal,
            low: self.low + other.low,
            background: self.background + other.background,
        }
    }
}

/// Point-in-time dispatcher statistics.
///
/// The accounting identity `received == processed + dropped + queue_size + in_flight` holds for
/// any snapshot taken while no `put` is concurrently in its critical section.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct DispatcherStats {
    pub received: u64,
    pub processed: u64,
    pub dropped: u64,
    pub handler_faults: u64,
    pub queue_size: usize,
    pub in_flight: u64,
    pub drop_rate: f64,
    pub avg_processing_time_ms: f64,
    pub p50_processing_time_ms: f64,
    pub p99_processing_time_ms: f64,
    pub avg_queue_size: f64,
    pub by_priority: PriorityCounts,
}

impl DispatcherStats {
    /// Merge two snapshots, summing counters and processed-weighting the latency averages.
    ///
    /// Used by the sharded dispatcher to aggregate per-shard statistics. Percentiles are
    /// processed-weighted approximations, not exact merged quantiles.
    pub fn merge(self, other: Self) -> Self {
        let weight_self = self.processed as f64;
        let weight_other = other.processed as f64;
        let weight_total = weight_self + weight_other;
        let weighted = |a: f64, b: f64| {
            if weight_total == 0.0 {
                0.0
            } else {
                (a * weight_self + b * weight_other) / weight_total
            }
        };

        let received = self.received + other.received;
        let dropped = self.dropped + other.dropped;

        Self {
            received,
            processed: self.processed + other.processed,
            dropped,
            handler_faults: self.handler_faults + other.handler_faults,
            queue_size: self.queue_size + other.queue_size,
            in_flight: self.in_flight + other.in_flight,
            drop_rate: if received > 0 {
                dropped as f64 / received as f64
            } else {
                0.0
            },
            avg_processing_time_ms: weighted(
                self.avg_processing_time_ms,
                other.avg_processing_time_ms,
            ),
            p50_processing_time_ms: weighted(
                self.p50_processing_time_ms,
                other.p50_processing_time_ms,
            ),
            p99_processing_time_ms: weighted(
                self.p99_processing_time_ms,
                other.p99_processing_time_ms,
            ),
            avg_queue_size: self.avg_queue_size + other.avg_queue_size,
            by_priority: self.by_priority.merge(other.by_priority),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_counters() {
        let metrics = EventMetrics::new();

        for _ in 0..10 {
            metrics.record_received(EventPriority::Normal);
            metrics.record_accepted();
            metrics.record_processed(Duration::from_millis(1));
        }

        let stats = metrics.snapshot(0, 0);
        assert_eq!(stats.received, 10);
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.drop_rate, 0.0);
        assert_eq!(stats.by_priority.normal, 10);
    }

    #[test]
    fn test_drop_rate_calculation() {
        let metrics = EventMetrics::new();

        for _ in 0..100 {
            metrics.record_received(EventPriority::Normal);
        }
        for _ in 0..10 {
            metrics.record_dropped();
        }

        let stats = metrics.snapshot(0, 0);
        assert_eq!(stats.received, 100);
        assert_eq!(stats.dropped, 10);
        assert!((stats.drop_rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_processing_time_tracking() {
        let metrics = EventMetrics::new();

        let times_ms = [1.0, 2.0, 3.0, 4.0, 5.0];
        for ms in times_ms {
            metrics.record_received(EventPriority::Normal);
            metrics.record_processed(Duration::from_secs_f64(ms / 1_000.0));
        }

        let stats = metrics.snapshot(0, 0);
        assert!((stats.avg_processing_time_ms - 3.0).abs() < 0.1);
        assert!(stats.p99_processing_time_ms >= stats.p50_processing_time_ms);
    }

    #[test]
    fn test_queue_size_history() {
        let metrics = EventMetrics::new();

        for size in 0..10 {
            metrics.record_queue_size(size);
        }

        let stats = metrics.snapshot(0, 0);
        assert!((stats.avg_queue_size - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_window_drop_rate_recovers() {
        let metrics = EventMetrics::new();

        for _ in 0..10 {
            metrics.record_dropped();
        }
        assert!((metrics.window_drop_rate() - 1.0).abs() < 1e-9);

        // A healthy stretch of accepted enqueues dilutes the window
        for _ in 0..990 {
            metrics.record_accepted();
        }
        assert!(metrics.window_drop_rate() <= 0.011);

        // And a full window of accepts evicts the drops entirely
        for _ in 0..1_000 {
            metrics.record_accepted();
        }
        assert_eq!(metrics.window_drop_rate(), 0.0);
    }

    #[test]
    fn test_stats_merge_sums_counters() {
        let a = DispatcherStats {
            received: 10,
            processed: 6,
            dropped: 2,
            queue_size: 1,
            in_flight: 1,
            avg_processing_time_ms: 2.0,
            ..DispatcherStats::default()
        };
        let b = DispatcherStats {
            received: 20,
            processed: 18,
            dropped: 2,
            avg_processing_time_ms: 4.0,
            ..DispatcherStats::default()
        };

        let merged = a.merge(b);
        assert_eq!(merged.received, 30);
        assert_eq!(merged.processed, 24);
        assert_eq!(merged.dropped, 4);
        assert!((merged.drop_rate - 4.0 / 30.0).abs() < 1e-9);
        // 6 events at 2ms, 18 events at 4ms
        assert!((merged.avg_processing_time_ms - 3.5).abs() < 1e-9);
    }
}
