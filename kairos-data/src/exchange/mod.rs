use crate::{error::DataError, event::MarketEvent, subscription::Channel};
use kairos_instrument::instrument::Venue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

/// [`VenueConnector`] implementation for Binance combined streams.
pub mod binance;

/// Defines how one venue's WebSocket dialect maps onto the normalized Kairos model: the
/// endpoint to dial, the subscribe/unsubscribe payloads for a set of [`Channel`]s, and the
/// translation of raw text frames into [`MarketEvent`]s.
///
/// The connection supervisor is venue-agnostic; adding a venue means implementing this trait.
pub trait VenueConnector
where
    Self: Send + Sync + 'static,
{
    const VENUE: Venue;

    fn url(&self) -> Result<Url, DataError>;

    fn subscribe_payload(&self, channels: &[Channel]) -> WsMessage;

    fn unsubscribe_payload(&self, channels: &[Channel]) -> WsMessage;

    /// Translate one raw text frame into a normalized [`MarketEvent`].
    ///
    /// `Ok(None)` marks an administrative frame (eg/ a subscription acknowledgement) that is
    /// valid but carries no market data.
    fn parse_frame(&self, frame: &str) -> Result<Option<MarketEvent>, DataError>;
}
