use thiserror::Error;

/// All errors generated in `kairos-data`.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid channel '{channel}': {reason}")]
    InvalidChannel { channel: String, reason: String },

    #[error("unsupported stream type: {0}")]
    UnsupportedStream(String),

    #[error("failed to parse venue URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("failed to deserialise venue frame: {error}, payload: {payload}")]
    Deserialise {
        error: serde_json::Error,
        payload: String,
    },

    #[error("client is not connected - call connect() first")]
    NotConnected,

    #[error("client is closed after exhausting {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("invalid connection configuration: {0}")]
    InvalidConfig(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for DataError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(error))
    }
}
