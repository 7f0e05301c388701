use crate::{
    config::ConnectionConfig,
    error::DataError,
    event::StreamEvent,
    exchange::VenueConnector,
    monitor::{MonitorSnapshot, StreamMonitor},
    subscription::{Channel, SubscriptionSet},
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};
use tokio::{net::TcpStream, sync::watch, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, error, info, warn};

/// Convenient type alias for a tungstenite `WebSocketStream`.
pub type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Convenient type alias for the `Sink` half of a tungstenite [`WebSocket`].
pub type WsSink = futures_util::stream::SplitSink<WebSocket, WsMessage>;

/// Convenient type alias for the `Stream` half of a tungstenite [`WebSocket`].
pub type WsStream = futures_util::stream::SplitStream<WebSocket>;

/// Subscriber callback receiving every [`StreamEvent`]. Faults are caught and logged - one bad
/// callback never interrupts the read loop or other callbacks.
pub type MessageCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Lifecycle of one venue connection.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Reading,
    Reconnecting,
    /// Terminal: explicit shutdown or exhausted reconnect budget.
    Closed,
}

/// Connection statistics, cloned under a small mutex.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct ClientStats {
    pub messages_received: u64,
    pub frames_dropped: u64,
    pub reconnect_count: u64,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_message_time: Option<DateTime<Utc>>,
}

impl ClientStats {
    /// Seconds since the current connection was established.
    pub fn connection_duration_s(&self) -> f64 {
        self.connected_at
            .map(|connected_at| {
                (Utc::now() - connected_at).num_milliseconds() as f64 / 1_000.0
            })
            .unwrap_or(0.0)
    }
}

struct Shared<C> {
    connector: C,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    subscriptions: SubscriptionSet,
    callbacks: RwLock<Vec<MessageCallback>>,
    stats: Mutex<ClientStats>,
    monitor: StreamMonitor,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    shutdown: watch::Sender<bool>,
}

impl<C> Shared<C>
where
    C: VenueConnector,
{
    fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(venue = %C::VENUE, from = ?*current, to = ?state, "connection state transition");
            *current = state;
        }
    }

    /// Invoke every registered callback, isolating faults.
    fn dispatch(&self, event: &StreamEvent) {
        let callbacks = self.callbacks.read().clone();
        for callback in &callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(venue = %C::VENUE, "subscriber callback panicked - continuing");
            }
        }
    }
}

/// Supervised WebSocket market data client for one venue connection.
///
/// Owns the connection object, the live [`SubscriptionSet`] and the subscriber callbacks.
/// A supervisor task drives the read loop and, on connection loss, re-dials with linear backoff
/// and re-issues every live subscription *before* reads resume. When the attempt budget is
/// exhausted the client transitions to [`ConnectionState::Closed`] and emits a
/// [`StreamEvent::ReconnectExhausted`] so downstream dispatchers observe the outage.
pub struct MarketStreamClient<C> {
    shared: Arc<Shared<C>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<C> fmt::Debug for MarketStreamClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketStreamClient")
            .field("state", &*self.shared.state.lock())
            .field("subscriptions", &self.shared.subscriptions.len())
            .finish()
    }
}

impl<C> MarketStreamClient<C>
where
    C: VenueConnector,
{
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                subscriptions: SubscriptionSet::new(),
                callbacks: RwLock::new(Vec::new()),
                stats: Mutex::new(ClientStats::default()),
                monitor: StreamMonitor::new(),
                sink: tokio::sync::Mutex::new(None),
                shutdown,
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Register a callback receiving every [`StreamEvent`].
    pub fn add_message_callback<F>(&self, callback: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.shared.callbacks.write().push(Arc::new(callback));
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Healthy while the connection is established or actively reading.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.connection_state(),
            ConnectionState::Connected | ConnectionState::Subscribing | ConnectionState::Reading
        )
    }

    pub fn stats(&self) -> ClientStats {
        self.shared.stats.lock().clone()
    }

    /// Per-stream-type ingestion statistics.
    pub fn monitor(&self) -> MonitorSnapshot {
        self.shared.monitor.snapshot()
    }

    /// Snapshot of the live subscription set.
    pub fn subscriptions(&self) -> Vec<Channel> {
        self.shared.subscriptions.snapshot()
    }

    /// Open the WebSocket and spawn the supervisor task. Restores any subscriptions added
    /// before (or during a previous) connection. Idempotent while connected.
    pub async fn connect(&self) -> Result<(), DataError> {
        self.shared.config.validate()?;

        {
            let mut state = self.shared.state.lock();
            match *state {
                ConnectionState::Closed => return Err(DataError::NotConnected),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
                // Already connected or in the supervisor's hands
                _ => return Ok(()),
            }
        }

        let stream = match establish(&self.shared).await {
            Ok(stream) => stream,
            Err(error) => {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(error);
            }
        };

        let shared = Arc::clone(&self.shared);
        let supervisor = tokio::spawn(run_supervisor(shared, stream));
        *self.supervisor.lock() = Some(supervisor);
        Ok(())
    }

    /// Subscribe to the provided channels. Channels already live are skipped, so subscribing
    /// twice yields a single live subscription.
    pub async fn subscribe(&self, channels: &[Channel]) -> Result<(), DataError> {
        let fresh = self.shared.subscriptions.add(channels);
        if fresh.is_empty() {
            return Ok(());
        }

        let mut sink = self.shared.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            // Not connected yet - keep the set so connect() replays it
            return Ok(());
        };

        let previous = self.connection_state();
        self.shared.set_state(ConnectionState::Subscribing);
        let payload = self.shared.connector.subscribe_payload(&fresh);
        match sink.send(payload).await {
            Ok(()) => {
                info!(venue = %C::VENUE, count = fresh.len(), "subscribed to channels");
                self.shared.set_state(previous);
                Ok(())
            }
            Err(error) => {
                // Roll back so the set reflects what the venue actually knows
                self.shared.subscriptions.remove(&fresh);
                self.shared.set_state(previous);
                Err(DataError::from(error))
            }
        }
    }

    /// Unsubscribe from the provided channels; unknown channels are ignored.
    pub async fn unsubscribe(&self, channels: &[Channel]) -> Result<(), DataError> {
        let removed = self.shared.subscriptions.remove(channels);
        if removed.is_empty() {
            return Ok(());
        }

        let mut sink = self.shared.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Ok(());
        };

        let payload = self.shared.connector.unsubscribe_payload(&removed);
        sink.send(payload).await.map_err(DataError::from)?;
        info!(venue = %C::VENUE, count = removed.len(), "unsubscribed from channels");
        Ok(())
    }

    /// Terminal shutdown: cancel the supervisor, close the sink and transition to `Closed`.
    pub async fn close(&self) {
        let _ = self.shared.shutdown.send(true);

        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            if supervisor.await.is_err() {
                error!(venue = %C::VENUE, "connection supervisor task panicked");
            }
        }

        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }

        self.shared.set_state(ConnectionState::Closed);
        info!(venue = %C::VENUE, "market stream client closed");
    }
}

/// Dial the venue, store the write half, and replay the live subscription set before handing
/// the read half to the caller.
async fn establish<C>(shared: &Arc<Shared<C>>) -> Result<WsStream, DataError>
where
    C: VenueConnector,
{
    let url = shared.connector.url()?;
    debug!(venue = %C::VENUE, %url, "attempting to establish WebSocket connection");

    let (websocket, _) = connect_async(url.as_str()).await?;
    let (mut sink, stream) = websocket.split();

    // Restore every live subscription before reads resume
    let channels = shared.subscriptions.snapshot();
    if !channels.is_empty() {
        let payload = shared.connector.subscribe_payload(&channels);
        sink.send(payload).await?;
        info!(venue = %C::VENUE, count = channels.len(), "restored subscriptions");
    }

    *shared.sink.lock().await = Some(sink);
    {
        let mut stats = shared.stats.lock();
        stats.connected_at = Some(Utc::now());
    }
    shared.monitor.mark_started();
    shared.set_state(ConnectionState::Connected);
    info!(venue = %C::VENUE, "WebSocket connected");
    Ok(stream)
}

enum ConnectionEnd {
    Shutdown,
    Lost,
}

async fn run_supervisor<C>(shared: Arc<Shared<C>>, mut stream: WsStream)
where
    C: VenueConnector,
{
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        shared.set_state(ConnectionState::Reading);
        let end = read_connection(&shared, &mut stream, &mut shutdown).await;

        // Tear down the stale write half in every case
        shared.sink.lock().await.take();

        match end {
            ConnectionEnd::Shutdown => {
                shared.set_state(ConnectionState::Closed);
                return;
            }
            ConnectionEnd::Lost => match reconnect(&shared, &mut shutdown).await {
                Some(new_stream) => stream = new_stream,
                None => return,
            },
        }
    }
}

/// Read frames until shutdown or connection loss.
async fn read_connection<C>(
    shared: &Arc<Shared<C>>,
    stream: &mut WsStream,
    shutdown: &mut watch::Receiver<bool>,
) -> ConnectionEnd
where
    C: VenueConnector,
{
    let frame_timeout = shared.config.frame_timeout();
    let ping_interval = shared.config.ping_interval();
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.reset();

    let mut consecutive_errors: u32 = 0;
    let mut last_frame = Instant::now();

    loop {
        // A shutdown requested before this receiver subscribed would not trigger changed()
        if *shutdown.borrow() {
            return ConnectionEnd::Shutdown;
        }

        tokio::select! {
            _ = shutdown.changed() => return ConnectionEnd::Shutdown,

            _ = ping.tick() => {
                // Pong (or any frame) must have arrived within one ping period; a silent
                // connection is treated as lost
                if last_frame.elapsed() > ping_interval + frame_timeout {
                    warn!(venue = %C::VENUE, "heartbeat timeout - treating connection as lost");
                    return ConnectionEnd::Lost;
                }
                let mut sink = shared.sink.lock().await;
                if let Some(sink) = sink.as_mut() {
                    if sink.send(WsMessage::Ping(bytes::Bytes::new())).await.is_err() {
                        return ConnectionEnd::Lost;
                    }
                }
            }

            frame = tokio::time::timeout(frame_timeout, stream.next()) => {
                let Ok(frame) = frame else {
                    // Idle read window - loop again and re-check shutdown
                    continue;
                };

                match frame {
                    None => {
                        warn!(venue = %C::VENUE, "WebSocket stream ended");
                        return ConnectionEnd::Lost;
                    }
                    Some(Err(error)) => {
                        warn!(venue = %C::VENUE, %error, "WebSocket protocol error");
                        return ConnectionEnd::Lost;
                    }
                    Some(Ok(WsMessage::Text(text))) => {
                        last_frame = Instant::now();
                        let started = Instant::now();
                        match shared.connector.parse_frame(&text) {
                            Ok(Some(event)) => {
                                consecutive_errors = 0;
                                {
                                    let mut stats = shared.stats.lock();
                                    stats.messages_received += 1;
                                    stats.last_message_time = Some(Utc::now());
                                }
                                let data_type = event.data_type;
                                shared.dispatch(&StreamEvent::Market(event));
                                shared.monitor.record_processed(data_type, started.elapsed());
                            }
                            Ok(None) => {
                                consecutive_errors = 0;
                                shared.stats.lock().messages_received += 1;
                            }
                            Err(error) => {
                                consecutive_errors += 1;
                                shared.stats.lock().frames_dropped += 1;
                                shared.monitor.record_failure();
                                warn!(
                                    venue = %C::VENUE,
                                    %error,
                                    consecutive_errors,
                                    "dropped malformed frame"
                                );
                                if consecutive_errors >= shared.config.consecutive_error_limit {
                                    error!(
                                        venue = %C::VENUE,
                                        limit = shared.config.consecutive_error_limit,
                                        "consecutive frame error limit reached"
                                    );
                                    return ConnectionEnd::Lost;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        warn!(venue = %C::VENUE, ?frame, "received CloseFrame");
                        return ConnectionEnd::Lost;
                    }
                    Some(Ok(_ping_pong_or_binary)) => {
                        last_frame = Instant::now();
                    }
                }
            }
        }
    }
}

/// Re-dial with linear backoff under the configured attempt budget. Returns the new read half,
/// or `None` once the budget is exhausted (terminal `Closed`).
async fn reconnect<C>(
    shared: &Arc<Shared<C>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<WsStream>
where
    C: VenueConnector,
{
    let mut attempt: u32 = 1;

    loop {
        if *shutdown.borrow() {
            shared.set_state(ConnectionState::Closed);
            return None;
        }

        if shared.config.attempts_exhausted(attempt) {
            let attempts = attempt - 1;
            error!(venue = %C::VENUE, attempts, "reconnect budget exhausted - closing client");
            shared.set_state(ConnectionState::Closed);
            shared.dispatch(&StreamEvent::ReconnectExhausted {
                venue: C::VENUE,
                attempts,
            });
            return None;
        }

        shared.set_state(ConnectionState::Reconnecting);
        shared.dispatch(&StreamEvent::Reconnecting {
            venue: C::VENUE,
            attempt,
        });

        let backoff = shared.config.reconnect_backoff(attempt);
        info!(venue = %C::VENUE, attempt, ?backoff, "reconnecting");

        tokio::select! {
            _ = shutdown.changed() => {
                shared.set_state(ConnectionState::Closed);
                return None;
            }
            _ = tokio::time::sleep(backoff) => {}
        }

        shared.set_state(ConnectionState::Connecting);
        match establish(shared).await {
            Ok(stream) => {
                shared.stats.lock().reconnect_count += 1;
                info!(venue = %C::VENUE, attempt, "reconnected with subscriptions restored");
                return Some(stream);
            }
            Err(error) => {
                warn!(venue = %C::VENUE, attempt, %error, "reconnect attempt failed");
                attempt += 1;
            }
        }
    }
}
