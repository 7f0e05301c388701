use crate::{
    config::DispatcherConfig,
    error::DispatchError,
    event::{EventPriority, PrioritizedEvent},
    metrics::{DispatcherStats, EventMetrics},
    queue::BoundedPriorityQueue,
};
use chrono::Utc;
use fnv::FnvHashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use smol_str::SmolStr;
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

/// Handler invoked by worker threads for every event of a registered type.
///
/// Handlers are pure consumers: they must not block for long and must not hold references back
/// into the dispatcher. A handler fault (panic) is caught, counted and logged - it never kills
/// the worker or prevents subsequent handlers from running.
pub type EventHandler<T> = Arc<dyn Fn(&PrioritizedEvent<T>) + Send + Sync>;

/// Token returned by [`EventDispatcher::register`], required to unregister the handler again.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct HandlerId(pub(crate) u64);

pub(crate) struct RegisteredHandler<T> {
    pub id: HandlerId,
    pub handler: EventHandler<T>,
}

impl<T> Clone for RegisteredHandler<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Enqueue options for [`EventDispatcher::put_with`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PutOptions {
    pub priority: EventPriority,
    pub symbol: Option<SmolStr>,
    pub block: bool,
    pub timeout: Option<Duration>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            priority: EventPriority::Normal,
            symbol: None,
            block: true,
            timeout: Some(Duration::from_secs(1)),
        }
    }
}

impl PutOptions {
    pub fn with_priority(self, priority: EventPriority) -> Self {
        Self { priority, ..self }
    }

    pub fn with_symbol<S>(self, symbol: S) -> Self
    where
        S: Into<SmolStr>,
    {
        Self {
            symbol: Some(symbol.into()),
            ..self
        }
    }

    pub fn non_blocking(self) -> Self {
        Self {
            block: false,
            ..self
        }
    }

    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }
}

/// Single-queue event dispatcher: one [`BoundedPriorityQueue`], a per-event-type handler
/// registry, `W` worker threads and an [`EventMetrics`] block.
///
/// ### Ordering
/// With one worker, events of every type are processed in strict `(priority, sequence)` order.
/// With `W > 1`, cross-event ordering is best-effort - use a
/// [`ShardedDispatcher`](crate::ShardedDispatcher) when per-symbol order is a requirement.
///
/// ### Backpressure
/// `put` consults queue load before enqueueing: above `backpressure_threshold`, non-`Critical`
/// events are shed with probability rising linearly to 1.0 at a full queue. `Critical` events
/// are only ever refused by a full queue (non-blocking) or an expired timeout.
pub struct EventDispatcher<T> {
    config: DispatcherConfig,
    queue: Arc<BoundedPriorityQueue<T>>,
    handlers: Arc<RwLock<FnvHashMap<SmolStr, Vec<RegisteredHandler<T>>>>>,
    metrics: Arc<EventMetrics>,
    sequence: AtomicU64,
    next_handler_id: AtomicU64,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicU64>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl<T> fmt::Debug for EventDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("config", &self.config)
            .field("queue_size", &self.queue.len())
            .field("running", &self.running.load(Ordering::Acquire))
            .finish()
    }
}

impl<T> EventDispatcher<T> {
    pub fn new(config: DispatcherConfig) -> Self {
        let queue = Arc::new(BoundedPriorityQueue::new(config.max_queue_size));
        Self {
            config,
            queue,
            handlers: Arc::new(RwLock::new(FnvHashMap::default())),
            metrics: Arc::new(EventMetrics::new()),
            sequence: AtomicU64::new(0),
            next_handler_id: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicU64::new(0)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for the provided event type, returning the [`HandlerId`] used to
    /// unregister it. Thread-safe; handlers can be added while the dispatcher is running.
    pub fn register<Type, F>(&self, event_type: Type, handler: F) -> HandlerId
    where
        Type: Into<SmolStr>,
        F: Fn(&PrioritizedEvent<T>) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.register_entry(event_type.into(), id, Arc::new(handler));
        id
    }

    pub(crate) fn register_entry(&self, event_type: SmolStr, id: HandlerId, handler: EventHandler<T>) {
        debug!(%event_type, ?id, "registered event handler");
        self.handlers
            .write()
            .entry(event_type)
            .or_default()
            .push(RegisteredHandler { id, handler });
    }

    /// Unregister a previously registered handler. Returns false if the handler was not found.
    pub fn unregister(&self, event_type: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(registered) = handlers.get_mut(event_type) else {
            return false;
        };

        let before = registered.len();
        registered.retain(|entry| entry.id != id);
        let removed = registered.len() < before;

        if registered.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    /// Cooperative shutdown: clears the running flag, wakes blocked workers, joins them, and
    /// discards any events queued beyond the stop point. In-flight handlers complete.
    /// Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.queue.wake_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                error!("dispatcher worker thread panicked");
            }
        }

        let discarded = self.queue.drain();
        if discarded > 0 {
            warn!(discarded, "discarded queued events on stop");
        }
        info!("event dispatcher stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Probabilistic shed decision. `Critical` events are exempt; the shed probability rises
    /// linearly from 0.0 at the threshold to 1.0 at a full queue.
    fn should_shed(&self, queue_size: usize, priority: EventPriority) -> bool {
        if !self.config.backpressure_enabled || priority == EventPriority::Critical {
            return false;
        }

        let threshold = self.config.backpressure_threshold;
        if threshold >= 1.0 {
            return false;
        }

        let load = queue_size as f64 / self.config.max_queue_size as f64;
        if load < threshold {
            return false;
        }

        let shed_probability = ((load - threshold) / (1.0 - threshold)).clamp(0.0, 1.0);
        rand::rng().random::<f64>() < shed_probability
    }

    /// Healthy unless the sliding-window drop rate exceeds the configured limit. Recovery is
    /// automatic once load falls; `Critical` events are accepted regardless of health.
    pub fn is_healthy(&self) -> bool {
        if !self.config.graceful_degradation_enabled {
            return true;
        }
        self.metrics.window_drop_rate() <= self.config.unhealthy_drop_rate
    }

    /// Consistent statistics snapshot.
    pub fn stats(&self) -> DispatcherStats {
        self.metrics
            .snapshot(self.queue.len(), self.in_flight.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

impl<T> EventDispatcher<T>
where
    T: Send + 'static,
{
    /// Spawn the worker pool. Idempotent - calling `start` on a running dispatcher is a no-op.
    pub fn start(&self) -> Result<(), DispatchError> {
        self.config.validate()?;

        if self.running.swap(true, Ordering::SeqCst) {
            debug!("dispatcher already running");
            return Ok(());
        }

        let poll = Duration::from_millis(self.config.worker_poll_interval_ms);
        let mut workers = self.workers.lock();
        for index in 0..self.config.num_workers {
            let queue = Arc::clone(&self.queue);
            let handlers = Arc::clone(&self.handlers);
            let metrics = Arc::clone(&self.metrics);
            let running = Arc::clone(&self.running);
            let in_flight = Arc::clone(&self.in_flight);

            let worker = thread::Builder::new()
                .name(format!("kairos-dispatch-{index}"))
                .spawn(move || worker_loop(queue, handlers, metrics, running, in_flight, poll))
                .map_err(|error| DispatchError::WorkerSpawn(error.to_string()))?;

            workers.push(worker);
        }

        info!(
            num_workers = self.config.num_workers,
            capacity = self.config.max_queue_size,
            "event dispatcher started"
        );
        Ok(())
    }

    /// Enqueue an event with default [`PutOptions`] (Normal priority, blocking, 1s timeout).
    pub fn put<Type>(&self, event_type: Type, payload: T) -> bool
    where
        Type: Into<SmolStr>,
    {
        self.put_with(event_type, payload, PutOptions::default())
    }

    /// Enqueue an event, applying the backpressure policy. Returns false if the event was shed
    /// or the queue refused it; the caller decides what to do about refusal.
    pub fn put_with<Type>(&self, event_type: Type, payload: T, options: PutOptions) -> bool
    where
        Type: Into<SmolStr>,
    {
        let event_type = event_type.into();
        self.metrics.record_received(options.priority);

        let queue_size = self.queue.len();
        self.metrics.record_queue_size(queue_size);

        if self.should_shed(queue_size, options.priority) {
            self.metrics.record_dropped();
            debug!(
                %event_type,
                priority = %options.priority,
                queue_size,
                "shed event under backpressure"
            );
            return false;
        }

        let event = PrioritizedEvent {
            priority: options.priority,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            time: Utc::now(),
            event_type,
            symbol: options.symbol,
            payload,
        };

        if self.queue.put(event, options.block, options.timeout) {
            self.metrics.record_accepted();
            true
        } else {
            self.metrics.record_dropped();
            false
        }
    }
}

impl<T> Drop for EventDispatcher<T> {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            self.stop();
        }
    }
}

fn worker_loop<T>(
    queue: Arc<BoundedPriorityQueue<T>>,
    handlers: Arc<RwLock<FnvHashMap<SmolStr, Vec<RegisteredHandler<T>>>>>,
    metrics: Arc<EventMetrics>,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicU64>,
    poll: Duration,
) {
    while running.load(Ordering::Acquire) {
        let Some(event) = queue.get(true, Some(poll)) else {
            continue;
        };

        in_flight.fetch_add(1, Ordering::AcqRel);
        let started = Instant::now();

        let type_handlers = handlers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for registered in &type_handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (registered.handler)(&event)));
            if outcome.is_err() {
                metrics.record_handler_fault();
                error!(
                    event_type = %event.event_type,
                    handler_id = ?registered.id,
                    "event handler panicked - continuing with remaining handlers"
                );
            }
        }

        metrics.record_processed(started.elapsed());
        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    pub(crate) fn wait_for<F>(predicate: F, timeout: Duration) -> bool
    where
        F: Fn() -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn dispatcher(config: DispatcherConfig) -> EventDispatcher<String> {
        EventDispatcher::new(config)
    }

    fn single_worker() -> DispatcherConfig {
        DispatcherConfig {
            num_workers: 1,
            worker_poll_interval_ms: 10,
            ..DispatcherConfig::default()
        }
    }

    #[test]
    fn test_basic_event_processing() {
        let dispatcher = dispatcher(single_worker());
        let received = Arc::new(StdMutex::new(Vec::new()));

        let received_handler = Arc::clone(&received);
        dispatcher.register("TEST", move |event| {
            received_handler.lock().unwrap().push(event.payload.clone());
        });

        dispatcher.start().unwrap();
        assert!(dispatcher.put("TEST", "data1".to_string()));

        assert!(wait_for(
            || dispatcher.stats().processed == 1,
            Duration::from_secs(2)
        ));
        dispatcher.stop();

        assert_eq!(*received.lock().unwrap(), vec!["data1".to_string()]);
    }

    #[test]
    fn test_multiple_event_types() {
        let config = DispatcherConfig {
            num_workers: 2,
            worker_poll_interval_ms: 10,
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(config);

        let ticks = Arc::new(StdMutex::new(Vec::new()));
        let bars = Arc::new(StdMutex::new(Vec::new()));

        let ticks_handler = Arc::clone(&ticks);
        dispatcher.register("TICK", move |event| {
            ticks_handler.lock().unwrap().push(event.payload.clone());
        });
        let bars_handler = Arc::clone(&bars);
        dispatcher.register("BAR", move |event| {
            bars_handler.lock().unwrap().push(event.payload.clone());
        });

        dispatcher.start().unwrap();
        for i in 0..10 {
            assert!(dispatcher.put("TICK", format!("tick_{i}")));
            assert!(dispatcher.put("BAR", format!("bar_{i}")));
        }

        assert!(wait_for(
            || dispatcher.stats().processed == 20,
            Duration::from_secs(2)
        ));
        dispatcher.stop();

        assert_eq!(ticks.lock().unwrap().len(), 10);
        assert_eq!(bars.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_priority_ordering_single_worker() {
        let dispatcher = dispatcher(single_worker());
        let order = Arc::new(StdMutex::new(Vec::new()));

        let order_handler = Arc::clone(&order);
        dispatcher.register("TEST", move |event| {
            order_handler.lock().unwrap().push(event.payload.clone());
        });

        // Enqueue before starting so the single worker observes a fully ordered queue
        let put = |payload: &str, priority| {
            assert!(dispatcher.put_with(
                "TEST",
                payload.to_string(),
                PutOptions::default().with_priority(priority),
            ));
        };
        put("low", EventPriority::Low);
        put("critical", EventPriority::Critical);
        put("normal", EventPriority::Normal);
        put("high", EventPriority::High);
        put("bg", EventPriority::Background);

        dispatcher.start().unwrap();
        assert!(wait_for(
            || dispatcher.stats().processed == 5,
            Duration::from_secs(2)
        ));
        dispatcher.stop();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["critical", "high", "normal", "low", "bg"]
        );
    }

    #[test]
    fn test_same_priority_fifo_ordering() {
        let dispatcher = dispatcher(single_worker());
        let order = Arc::new(StdMutex::new(Vec::new()));

        let order_handler = Arc::clone(&order);
        dispatcher.register("TEST", move |event| {
            order_handler.lock().unwrap().push(event.payload.clone());
        });

        for i in 0..5 {
            assert!(dispatcher.put("TEST", format!("event_{i}")));
        }

        dispatcher.start().unwrap();
        assert!(wait_for(
            || dispatcher.stats().processed == 5,
            Duration::from_secs(2)
        ));
        dispatcher.stop();

        let order = order.lock().unwrap();
        for (i, payload) in order.iter().enumerate() {
            assert_eq!(payload, &format!("event_{i}"));
        }
    }

    #[test]
    fn test_handler_fault_isolation() {
        let dispatcher = dispatcher(single_worker());
        let successes = Arc::new(AtomicU64::new(0));

        let successes_handler = Arc::clone(&successes);
        dispatcher.register("TEST", move |event| {
            if event.payload == "fail" {
                panic!("boom");
            }
            successes_handler.fetch_add(1, Ordering::Relaxed);
        });

        dispatcher.start().unwrap();
        for i in 0..10 {
            let payload = if i % 2 == 0 { "fail" } else { "ok" };
            assert!(dispatcher.put("TEST", payload.to_string()));
        }

        assert!(wait_for(
            || dispatcher.stats().processed == 10,
            Duration::from_secs(2)
        ));

        assert!(dispatcher.is_running());
        assert_eq!(successes.load(Ordering::Relaxed), 5);
        assert_eq!(dispatcher.stats().handler_faults, 5);
        dispatcher.stop();
    }

    #[test]
    fn test_start_stop_idempotency() {
        let dispatcher = dispatcher(single_worker());

        dispatcher.start().unwrap();
        dispatcher.start().unwrap();
        dispatcher.start().unwrap();
        assert!(dispatcher.is_running());

        dispatcher.stop();
        dispatcher.stop();
        dispatcher.stop();
        assert!(!dispatcher.is_running());
    }

    #[test]
    fn test_unregister_handler() {
        let dispatcher = dispatcher(single_worker());

        let id = dispatcher.register("TEST", |_| {});
        assert!(dispatcher.unregister("TEST", id));
        assert!(!dispatcher.unregister("TEST", id));
    }

    #[test]
    fn test_blocking_put_with_timeout() {
        let config = DispatcherConfig {
            max_queue_size: 2,
            num_workers: 0,
            backpressure_enabled: false,
            graceful_degradation_enabled: false,
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(config);

        let options = || PutOptions::default().with_timeout(Some(Duration::from_secs(1)));
        assert!(dispatcher.put_with("TEST", "data1".to_string(), options()));
        assert!(dispatcher.put_with("TEST", "data2".to_string(), options()));

        let started = Instant::now();
        let accepted = dispatcher.put_with(
            "TEST",
            "data3".to_string(),
            PutOptions::default().with_timeout(Some(Duration::from_millis(100))),
        );
        let elapsed = started.elapsed();

        assert!(!accepted);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn test_metrics_collection() {
        let dispatcher = dispatcher(single_worker());
        dispatcher.register("TEST", |_| {});
        dispatcher.start().unwrap();

        for i in 0..100 {
            assert!(dispatcher.put("TEST", format!("data{i}")));
        }

        assert!(wait_for(
            || dispatcher.stats().processed == 100,
            Duration::from_secs(2)
        ));
        dispatcher.stop();

        let stats = dispatcher.stats();
        assert_eq!(stats.received, 100);
        assert_eq!(stats.processed, 100);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.drop_rate, 0.0);
        assert_eq!(stats.by_priority.normal, 100);
        assert!(stats.avg_processing_time_ms >= 0.0);
    }

    #[test]
    fn test_stats_accounting_identity() {
        let config = DispatcherConfig {
            max_queue_size: 8,
            num_workers: 0,
            backpressure_enabled: true,
            backpressure_threshold: 0.5,
            ..DispatcherConfig::default()
        };
        let dispatcher = dispatcher(config);

        for i in 0..20 {
            dispatcher.put_with(
                "TEST",
                format!("data{i}"),
                PutOptions::default().non_blocking(),
            );
        }

        // No workers: everything received is either queued or dropped
        let stats = dispatcher.stats();
        assert_eq!(stats.received, 20);
        assert_eq!(
            stats.received,
            stats.processed + stats.dropped + stats.queue_size as u64 + stats.in_flight
        );
    }
}
