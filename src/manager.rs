use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionCommand};
use crate::credentials::CredentialProvider;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::handler::NotificationHandler;
use crate::metrics::Metrics;
use crate::status::ConnectionState;
use crate::transport::{NetworkTransportFactory, TransportFactory};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to the single logical notification connection.
///
/// `connect()` and `disconnect()` only enqueue a command and return
/// immediately; the outcome arrives through the handler's `on_status`.
/// All lifecycle work happens on one spawned connection task, which owns
/// the transport and is the only writer of the connection state.
///
/// Dropping the manager closes the command channel; the task then
/// releases the subscriptions, closes the transport and exits without
/// reporting a status. Use [`shutdown`](Self::shutdown) to wait for that.
///
/// # Thread Safety
///
/// `ConnectionManager` is `Send + Sync`. State reads use a
/// `parking_lot::RwLock` that is never held across an await point.
pub struct ConnectionManager {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    state: Arc<RwLock<ConnectionState>>,
    metrics: Arc<Metrics>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the connection task for `endpoint`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<F, C>(config: ClientConfig, endpoint: Endpoint, factory: F, credentials: C) -> Self
    where
        F: TransportFactory,
        C: CredentialProvider,
    {
        if let Err(e) = config.validate() {
            warn!("{}; out-of-range values will be clamped", e);
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let metrics = Arc::new(Metrics::new());

        debug!(
            "Starting connection task for {} ({:?})",
            endpoint.websocket_url(),
            config.transport_mode
        );
        let connection = Connection::new(
            factory,
            credentials,
            endpoint,
            config,
            state.clone(),
            metrics.clone(),
            command_rx,
        );
        let task = tokio::spawn(connection.run());

        Self {
            command_tx,
            state,
            metrics,
            task,
        }
    }

    /// Connect to `<api_base><endpoint_path>` over the network transports.
    ///
    /// The endpoint is derived from the REST base URL; `http`/`https`
    /// map to `ws`/`wss` for the native socket.
    pub fn from_api_base<C: CredentialProvider>(
        api_base: &str,
        config: ClientConfig,
        credentials: C,
    ) -> Result<Self, Error> {
        let endpoint = Endpoint::from_api_base(api_base, &config.endpoint_path)?;
        let factory = NetworkTransportFactory::new(config.transport_mode, config.connect_timeout);
        Ok(Self::new(config, endpoint, factory, credentials))
    }

    /// Start the session, delivering to `handler`.
    ///
    /// A no-op while connecting, connected or reconnecting: no second
    /// transport is opened and the first handler stays in place. From
    /// `Disconnected` or `Failed` the attempt counter is reset and a new
    /// attempt starts. Returns the state observed when the call was made.
    pub fn connect(&self, handler: impl NotificationHandler) -> ConnectionState {
        let current = self.state();
        if current.is_active() {
            debug!("connect() while {}, ignoring", current);
            return current;
        }
        self.send(ConnectionCommand::Connect(Arc::new(handler)));
        current
    }

    /// Intentionally close the session.
    ///
    /// Always safe to call. Cancels a pending reconnection, releases the
    /// subscriptions, closes the transport and reports `Disconnected` once.
    pub fn disconnect(&self) {
        self.send(ConnectionCommand::Disconnect);
    }

    /// Whether the session is established and subscribed
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Close the command channel and wait for the connection task to finish
    /// its teardown.
    pub async fn shutdown(self) {
        let Self { command_tx, task, .. } = self;
        drop(command_tx);
        if let Err(e) = task.await {
            warn!("Connection task ended abnormally: {}", e);
        }
    }

    fn send(&self, command: ConnectionCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Connection task is gone, command dropped");
        }
    }
}
