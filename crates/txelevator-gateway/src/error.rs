use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The client sent something that is not a request we understand.
    /// Answered with an error frame; the connection stays open.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("connection closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            other => Self::WebSocket(other.to_string()),
        }
    }
}
