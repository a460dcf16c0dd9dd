use thiserror::Error;

/// Categorizes errors for status reporting.
///
/// Lightweight, cloneable view of an [`Error`] that decides which
/// condition the host sees and whether the failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket, HTTP or timeout failure (retried with backoff)
    Transport,
    /// Server rejected the session at the protocol level (retried with backoff)
    Protocol,
    /// No bearer token available (terminal until the host connects again)
    AuthMissing,
    /// Invalid configuration or endpoint
    Config,
}

/// Errors that can occur in notify-link
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP polling transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer closed the transport
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Handshake did not complete within the connect timeout
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Server answered with a STOMP ERROR frame or an unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Frame could not be decoded
    #[error("Malformed frame: {0}")]
    Frame(String),

    /// Payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Endpoint could not be derived from the API base URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No bearer token was available
    #[error("No credentials available")]
    AuthMissing,
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WebSocket(_)
            | Error::Http(_)
            | Error::ConnectionFailed(_)
            | Error::ConnectionClosed
            | Error::HandshakeTimeout => ErrorKind::Transport,
            Error::Protocol(_) | Error::Frame(_) | Error::Parse(_) => ErrorKind::Protocol,
            Error::AuthMissing => ErrorKind::AuthMissing,
            Error::InvalidEndpoint(_) => ErrorKind::Config,
        }
    }
}
