use crate::error::EngineError;
use kairos_data::{
    ConnectionConfig, MarketStreamClient, StreamEvent,
    exchange::VenueConnector,
    subscription::Channel,
};
use kairos_dispatch::{
    EventPriority, HandlerId, PrioritizedEvent, PutOptions, ShardedConfig, ShardedDispatcher,
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, sync::Arc};
use tracing::{info, warn};

/// Event type used for connection outage notifications published at `Critical` priority.
pub const OUTAGE_EVENT: &str = "stream_outage";

/// Event type used for reconnection lifecycle notifications.
pub const RECONNECT_EVENT: &str = "stream_reconnecting";

/// Configuration for a [`MarketSystem`].
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketSystemConfig {
    pub connection: ConnectionConfig,
    pub dispatch: ShardedConfig,
}

/// Live market data pipeline: one venue [`MarketStreamClient`] feeding a
/// [`ShardedDispatcher`] keyed by symbol.
///
/// Normalized market events are enqueued under their `data_type` (eg/ "kline", "trade") with
/// the event's symbol as the shard key, so per-symbol tick order is preserved end to end.
/// Reconnection notices flow at `Normal` priority; an exhausted reconnect budget is published
/// as a `Critical` [`OUTAGE_EVENT`] that is exempt from backpressure shedding.
pub struct MarketSystem<C> {
    client: MarketStreamClient<C>,
    dispatcher: Arc<ShardedDispatcher<StreamEvent>>,
}

impl<C> fmt::Debug for MarketSystem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketSystem")
            .field("client", &self.client)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<C> MarketSystem<C>
where
    C: VenueConnector,
{
    pub fn new(connector: C, config: MarketSystemConfig) -> Self {
        let client = MarketStreamClient::new(connector, config.connection);
        let dispatcher = Arc::new(ShardedDispatcher::new(config.dispatch));

        let forwarder = Arc::clone(&dispatcher);
        client.add_message_callback(move |event| forward(&forwarder, event));

        Self { client, dispatcher }
    }

    /// Start the dispatcher workers and open the venue connection.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.dispatcher.start()?;
        self.client.connect().await?;
        info!("market system started");
        Ok(())
    }

    /// Cooperative shutdown: close the connection first so no new events arrive, then stop the
    /// dispatcher workers.
    pub async fn stop(&self) {
        self.client.close().await;
        self.dispatcher.stop();
        info!("market system stopped");
    }

    pub async fn subscribe(&self, channels: &[Channel]) -> Result<(), EngineError> {
        self.client.subscribe(channels).await.map_err(EngineError::from)
    }

    pub async fn unsubscribe(&self, channels: &[Channel]) -> Result<(), EngineError> {
        self.client.unsubscribe(channels).await.map_err(EngineError::from)
    }

    /// Register a handler for one normalized data type (eg/ "kline", "trade"), or for
    /// [`OUTAGE_EVENT`] / [`RECONNECT_EVENT`] lifecycle notifications.
    pub fn register_handler<Type, F>(&self, event_type: Type, handler: F) -> HandlerId
    where
        Type: Into<SmolStr>,
        F: Fn(&PrioritizedEvent<StreamEvent>) + Send + Sync + 'static,
    {
        self.dispatcher.register(event_type, handler)
    }

    pub fn unregister_handler(&self, event_type: &str, id: HandlerId) -> bool {
        self.dispatcher.unregister(event_type, id)
    }

    pub fn dispatcher(&self) -> &Arc<ShardedDispatcher<StreamEvent>> {
        &self.dispatcher
    }

    pub fn client(&self) -> &MarketStreamClient<C> {
        &self.client
    }

    /// Healthy while the connection is live and no dispatcher shard reports sustained drops.
    pub fn is_healthy(&self) -> bool {
        self.client.is_healthy() && self.dispatcher.is_healthy()
    }
}

/// Bridge one [`StreamEvent`] into the sharded dispatcher.
fn forward(dispatcher: &ShardedDispatcher<StreamEvent>, event: &StreamEvent) {
    let accepted = match event {
        StreamEvent::Market(market) => dispatcher.put_with(
            SmolStr::new(market.data_type.as_str()),
            event.clone(),
            PutOptions::default()
                .with_symbol(market.symbol.clone())
                .non_blocking(),
        ),
        StreamEvent::Reconnecting { .. } => dispatcher.put_with(
            RECONNECT_EVENT,
            event.clone(),
            PutOptions::default().non_blocking(),
        ),
        StreamEvent::ReconnectExhausted { .. } => dispatcher.put_with(
            OUTAGE_EVENT,
            event.clone(),
            PutOptions::default()
                .with_priority(EventPriority::Critical)
                .non_blocking(),
        ),
    };

    if !accepted {
        warn!("dispatcher refused stream event under load");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_dispatch::DispatcherConfig;
    use chrono::Utc;
    use kairos_data::{MarketDataKind, MarketEvent, StreamType, event::PublicTrade};
    use kairos_instrument::{Side, instrument::Venue};
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::{Duration, Instant},
    };

    fn market_event(symbol: &str) -> StreamEvent {
        StreamEvent::Market(MarketEvent {
            exchange: Venue::Binance,
            data_type: StreamType::Trade,
            symbol: SmolStr::new(symbol),
            time_exchange: Utc::now(),
            time_received: Utc::now(),
            kind: MarketDataKind::Trade(PublicTrade {
                id: 1,
                price: 42_000.0,
                amount: 0.1,
                side: Side::Buy,
            }),
        })
    }

    fn wait_for<F>(predicate: F, timeout: Duration) -> bool
    where
        F: Fn() -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_forward_routes_market_events_by_data_type() {
        let dispatcher = Arc::new(ShardedDispatcher::new(ShardedConfig {
            num_shards: 2,
            dispatcher: DispatcherConfig {
                worker_poll_interval_ms: 10,
                ..DispatcherConfig::default()
            },
        }));

        let trades = Arc::new(AtomicU64::new(0));
        let trades_handler = Arc::clone(&trades);
        dispatcher.register("trade", move |event| {
            assert!(matches!(event.payload, StreamEvent::Market(_)));
            trades_handler.fetch_add(1, Ordering::Relaxed);
        });

        dispatcher.start().unwrap();
        forward(&dispatcher, &market_event("BTCUSDT"));
        forward(&dispatcher, &market_event("ETHUSDT"));

        assert!(wait_for(
            || trades.load(Ordering::Relaxed) == 2,
            Duration::from_secs(2)
        ));
        dispatcher.stop();
    }

    #[test]
    fn test_forward_publishes_outage_as_critical() {
        let dispatcher = Arc::new(ShardedDispatcher::new(ShardedConfig {
            num_shards: 2,
            dispatcher: DispatcherConfig {
                num_workers: 0,
                ..DispatcherConfig::default()
            },
        }));

        forward(
            &dispatcher,
            &StreamEvent::ReconnectExhausted {
                venue: Venue::Binance,
                attempts: 5,
            },
        );

        let stats = dispatcher.stats();
        assert_eq!(stats.by_priority.critical, 1);
        assert_eq!(stats.queue_size, 1);
    }
}
