use crate::error::{Error, ErrorKind};
use crate::handler::{call_guarded, NotificationHandler};
use std::fmt;
use tracing::debug;

/// Lifecycle state of the single logical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, no timer; waiting for `connect()`
    #[default]
    Disconnected,
    /// Transport opening or handshake in progress
    Connecting,
    /// Handshake done and both subscriptions active
    Connected,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
    /// Automatic recovery gave up; waiting for `connect()`
    Failed,
}

impl ConnectionState {
    /// Whether a connection is open, being opened, or scheduled
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Conditions surfaced to the host alongside a status
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    /// No token at connect time; the host must authenticate and connect again
    #[error("no credentials available")]
    AuthMissing,
    /// Socket or handshake failure; retried automatically
    #[error("transport error: {0}")]
    Transport(String),
    /// Handshake rejected by the server; retried automatically
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Automatic recovery stopped; the host must connect again
    #[error("gave up after {attempts} reconnection attempts")]
    MaxRetriesExceeded { attempts: u32 },
}

impl StatusError {
    /// Whether the host has to act before the client tries again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusError::AuthMissing | StatusError::MaxRetriesExceeded { .. }
        )
    }
}

impl From<&Error> for StatusError {
    fn from(error: &Error) -> Self {
        match error.kind() {
            ErrorKind::AuthMissing => StatusError::AuthMissing,
            ErrorKind::Protocol => StatusError::Protocol(error.to_string()),
            ErrorKind::Transport | ErrorKind::Config => StatusError::Transport(error.to_string()),
        }
    }
}

/// A lifecycle status event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: ConnectionState,
    pub error: Option<StatusError>,
}

impl Status {
    pub fn new(state: ConnectionState, error: Option<StatusError>) -> Self {
        Self { state, error }
    }

    /// `true` only for [`ConnectionState::Connected`]
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Forwards status events to the host's handler.
pub(crate) struct StatusReporter;

impl StatusReporter {
    /// Deliver `status`; returns `false` if the handler panicked.
    pub(crate) fn report(handler: &dyn NotificationHandler, status: &Status) -> bool {
        debug!(
            "Status: {}{}",
            status.state,
            status
                .error
                .as_ref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
        call_guarded("on_status", || handler.on_status(status))
    }
}
