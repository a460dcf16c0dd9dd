use crate::config::ClientConfig;
use crate::credentials::{CredentialProvider, Credentials};
use crate::dispatcher::Dispatcher;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::frame::{Command, Frame, ACCEPT_VERSION, HEARTBEAT};
use crate::handler::NotificationHandler;
use crate::heartbeat::{HeartbeatMonitor, NegotiatedHeartbeat};
use crate::metrics::Metrics;
use crate::reconnect::ReconnectScheduler;
use crate::status::{ConnectionState, Status, StatusError, StatusReporter};
use crate::subscription::{SubscriptionManager, SubscriptionSet};
use crate::transport::{Transport, TransportFactory};
use parking_lot::RwLock;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Commands sent from the [`ConnectionManager`](crate::ConnectionManager) handle
pub(crate) enum ConnectionCommand {
    /// Start (or restart after `Failed`) the session for this handler
    Connect(Arc<dyn NotificationHandler>),
    /// Intentional disconnect
    Disconnect,
}

/// One established session: transport, heartbeat state and live subscriptions.
struct Link<T> {
    id: u64,
    transport: T,
    heartbeat: HeartbeatMonitor,
    subscriptions: SubscriptionSet,
}

/// How a handshake ended
enum Handshake<T> {
    Done(Result<Link<T>, Error>),
    /// A `disconnect()` arrived first
    Aborted,
    /// The manager handle was dropped
    Shutdown,
}

/// The connection task.
///
/// Owns the transport, the subscriptions, the attempt counter, the
/// reconnection timer and the host handler, and handles one event at a
/// time. `state` is written here and nowhere else.
pub(crate) struct Connection<F: TransportFactory, C: CredentialProvider> {
    factory: F,
    credentials: C,
    endpoint: Endpoint,
    config: ClientConfig,
    state: Arc<RwLock<ConnectionState>>,
    metrics: Arc<Metrics>,
    dispatcher: Dispatcher,
    scheduler: ReconnectScheduler,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    handler: Option<Arc<dyn NotificationHandler>>,
    link: Option<Link<F::Transport>>,
    /// Reconnection attempts since the last successful handshake
    attempts: u32,
    next_connection_id: u64,
    shutdown: bool,
}

impl<F: TransportFactory, C: CredentialProvider> Connection<F, C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        factory: F,
        credentials: C,
        endpoint: Endpoint,
        config: ClientConfig,
        state: Arc<RwLock<ConnectionState>>,
        metrics: Arc<Metrics>,
        command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        Self {
            factory,
            credentials,
            endpoint,
            scheduler: ReconnectScheduler::new(config.backoff.clone()),
            config,
            state,
            dispatcher: Dispatcher::new(metrics.clone()),
            metrics,
            command_rx,
            handler: None,
            link: None,
            attempts: 0,
            next_connection_id: 1,
            shutdown: false,
        }
    }

    /// Run until the manager handle is dropped
    pub(crate) async fn run(mut self) {
        while !self.shutdown {
            let heartbeat_deadline = self
                .link
                .as_ref()
                .and_then(|link| link.heartbeat.next_deadline());

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Connect(handler)) => self.on_connect(handler).await,
                        Some(ConnectionCommand::Disconnect) => self.on_disconnect().await,
                        None => {
                            debug!("Command channel closed, shutting down");
                            self.teardown().await;
                            self.set_state(ConnectionState::Disconnected);
                            self.shutdown = true;
                        }
                    }
                }

                _ = self.scheduler.fired() => {
                    self.metrics.record_reconnect_attempt();
                    debug!("Reconnection timer fired (attempt {})", self.attempts);
                    self.attempt().await;
                }

                event = next_message(&mut self.link) => {
                    match event {
                        Some(Ok(text)) => self.on_text(text).await,
                        Some(Err(e)) => self.connection_lost(e).await,
                        None => self.connection_lost(Error::ConnectionClosed).await,
                    }
                }

                _ = sleep_until_deadline(heartbeat_deadline) => {
                    self.on_heartbeat_tick().await;
                }
            }
        }
        debug!("Connection task exited");
    }

    async fn on_connect(&mut self, handler: Arc<dyn NotificationHandler>) {
        let current = self.current_state();
        if current.is_active() {
            debug!("connect() ignored while {}", current);
            return;
        }

        self.handler = Some(handler);
        self.attempts = 0;
        self.attempt().await;
    }

    /// Intentional disconnect: cancel the timer, release subscriptions,
    /// close the transport, then report `Disconnected` once.
    async fn on_disconnect(&mut self) {
        let current = self.current_state();
        info!("Disconnect requested while {}", current);

        if self.scheduler.is_pending() {
            debug!("Cancelling pending reconnection (attempt {})", self.attempts);
        }
        self.scheduler.cancel();
        self.teardown().await;
        self.attempts = 0;

        if current != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected, None);
        }
    }

    /// One connection attempt: credentials, transport, handshake, subscriptions.
    async fn attempt(&mut self) {
        let Some(credentials) = self.credentials.bearer_token() else {
            warn!("No credentials available, not connecting");
            self.scheduler.cancel();
            self.transition(ConnectionState::Disconnected, Some(StatusError::AuthMissing));
            return;
        };

        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.transition(ConnectionState::Connecting, None);
        debug!(
            "[CONN-{}] Connecting to {} (attempt {})",
            id,
            self.endpoint.websocket_url(),
            self.attempts
        );

        let outcome = {
            let establish = establish(
                &self.factory,
                &self.endpoint,
                &self.config,
                credentials,
                id,
            );
            tokio::pin!(establish);

            loop {
                tokio::select! {
                    result = &mut establish => break Handshake::Done(result),
                    cmd = self.command_rx.recv() => match cmd {
                        Some(ConnectionCommand::Connect(_)) => {
                            debug!("[CONN-{}] connect() ignored during handshake", id);
                        }
                        Some(ConnectionCommand::Disconnect) => break Handshake::Aborted,
                        None => break Handshake::Shutdown,
                    },
                }
            }
        };

        match outcome {
            Handshake::Done(Ok(link)) => {
                info!(
                    "[CONN-{}] Connected via {} ({} subscriptions)",
                    id,
                    link.transport.name(),
                    link.subscriptions.len()
                );
                self.link = Some(link);
                self.attempts = 0;
                self.metrics.record_connection();
                self.transition(ConnectionState::Connected, None);
            }
            Handshake::Done(Err(e)) => {
                warn!("[CONN-{}] Connection attempt failed: {}", id, e);
                self.schedule_reconnect(StatusError::from(&e));
            }
            Handshake::Aborted => {
                info!("[CONN-{}] Handshake aborted by disconnect", id);
                self.scheduler.cancel();
                self.attempts = 0;
                self.transition(ConnectionState::Disconnected, None);
            }
            Handshake::Shutdown => {
                debug!("[CONN-{}] Command channel closed during handshake", id);
                self.set_state(ConnectionState::Disconnected);
                self.shutdown = true;
            }
        }
    }

    /// Handle one inbound transport message (one or more STOMP frames).
    async fn on_text(&mut self, text: String) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        link.heartbeat.record_received();

        for decoded in Frame::decode_each(&text) {
            let frame = match decoded {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[CONN-{}] Dropping undecodable frame: {}", link.id, e);
                    self.metrics.record_parse_error();
                    continue;
                }
            };

            match frame.command {
                Command::Message => {
                    if let Some(handler) = self.handler.as_deref() {
                        let outcome = self.dispatcher.dispatch(&frame, &link.subscriptions, handler);
                        trace!("[CONN-{}] Dispatch: {:?}", link.id, outcome);
                    }
                }
                Command::Error => {
                    let message = frame
                        .get("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| frame.body.trim().to_string());
                    error!("[CONN-{}] Server sent ERROR: {}", link.id, message);
                    self.connection_lost(Error::Protocol(message)).await;
                    return;
                }
                Command::Receipt => {
                    trace!("[CONN-{}] Receipt {:?}", link.id, frame.get("receipt-id"));
                }
                other => {
                    debug!("[CONN-{}] Ignoring unexpected {} frame", link.id, other.as_str());
                }
            }
        }
    }

    async fn on_heartbeat_tick(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        if link.heartbeat.is_expired() {
            let silence = link.heartbeat.silence();
            warn!(
                "[CONN-{}] No data from server for {:?}, reconnecting",
                link.id, silence
            );
            self.metrics.record_heartbeat_timeout();
            self.connection_lost(Error::ConnectionFailed(format!(
                "heartbeat timeout after {:?}",
                silence
            )))
            .await;
            return;
        }

        if link.heartbeat.should_send() {
            let sent = send_within(
                &mut link.transport,
                HEARTBEAT.to_string(),
                self.config.connect_timeout,
            )
            .await;
            match sent {
                Ok(()) => {
                    trace!("[CONN-{}] Sent heartbeat", link.id);
                    link.heartbeat.record_sent();
                    self.metrics.record_heartbeat_sent();
                }
                Err(e) => {
                    warn!("[CONN-{}] Failed to send heartbeat: {}", link.id, e);
                    self.connection_lost(e).await;
                }
            }
        }
    }

    /// Unrequested loss of an established session
    async fn connection_lost(&mut self, error: Error) {
        // Subscriptions die with the session; nothing to release.
        let Some(Link { id, mut transport, .. }) = self.link.take() else {
            return;
        };
        warn!("[CONN-{}] Connection lost: {}", id, error);
        close_within(&mut transport, self.config.connect_timeout, id).await;
        self.schedule_reconnect(StatusError::from(&error));
    }

    fn schedule_reconnect(&mut self, cause: StatusError) {
        match self.scheduler.schedule(self.attempts) {
            Ok((attempt, delay)) => {
                self.attempts = attempt;
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay, attempt, self.config.backoff.max_attempts
                );
                self.transition(ConnectionState::Reconnecting, Some(cause));
            }
            Err(max_attempts) => {
                error!(
                    "Max reconnection attempts ({}) reached, last error: {}",
                    max_attempts, cause
                );
                self.transition(
                    ConnectionState::Failed,
                    Some(StatusError::MaxRetriesExceeded {
                        attempts: max_attempts,
                    }),
                );
            }
        }
    }

    /// Release subscriptions and close the transport, if there is one
    async fn teardown(&mut self) {
        let Some(Link {
            id,
            mut transport,
            subscriptions,
            ..
        }) = self.link.take()
        else {
            return;
        };
        let release = async {
            SubscriptionManager::unsubscribe_all(&mut transport, subscriptions, id).await;
            let _ = transport
                .send(Frame::new(Command::Disconnect).encode())
                .await;
        };
        if timeout(self.config.connect_timeout, release).await.is_err() {
            warn!("[CONN-{}] Timed out releasing subscriptions", id);
        }
        close_within(&mut transport, self.config.connect_timeout, id).await;
        debug!("[CONN-{}] Transport closed", id);
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn transition(&self, state: ConnectionState, error: Option<StatusError>) {
        self.set_state(state);
        if let Some(handler) = self.handler.as_deref() {
            if !StatusReporter::report(handler, &Status::new(state, error)) {
                self.metrics.record_handler_panic();
            }
        }
    }
}

/// Open the transport, authenticate, and subscribe.
///
/// `open` is bounded by the factory itself. The connect timeout then
/// bounds the CONNECT/CONNECTED exchange and the subscriptions; the
/// transport is closed if either fails.
async fn establish<F: TransportFactory>(
    factory: &F,
    endpoint: &Endpoint,
    config: &ClientConfig,
    credentials: Credentials,
    id: u64,
) -> Result<Link<F::Transport>, Error> {
    let mut transport = factory.open(endpoint).await?;
    debug!("[CONN-{}] {} transport open", id, transport.name());

    let exchange = timeout(
        config.connect_timeout,
        handshake(&mut transport, endpoint, config, credentials, id),
    )
    .await
    .unwrap_or(Err(Error::HandshakeTimeout));

    match exchange {
        Ok((negotiated, subscriptions)) => Ok(Link {
            id,
            transport,
            heartbeat: HeartbeatMonitor::new(negotiated, config.heartbeat.tolerance),
            subscriptions,
        }),
        Err(e) => {
            close_within(&mut transport, config.connect_timeout, id).await;
            Err(e)
        }
    }
}

async fn handshake<T: Transport>(
    transport: &mut T,
    endpoint: &Endpoint,
    config: &ClientConfig,
    credentials: Credentials,
    id: u64,
) -> Result<(NegotiatedHeartbeat, SubscriptionSet), Error> {
    let connect = Frame::new(Command::Connect)
        .header("accept-version", ACCEPT_VERSION)
        .header("host", endpoint.host())
        .header(
            "heart-beat",
            NegotiatedHeartbeat::request_header(&config.heartbeat),
        )
        .header("Authorization", credentials.authorization());
    transport.send(connect.encode()).await?;

    let connected = await_connected(transport, id).await?;
    let negotiated = NegotiatedHeartbeat::negotiate(&config.heartbeat, connected.get("heart-beat"));
    debug!(
        "[CONN-{}] Handshake complete (server {:?}, heartbeat out={:?} in={:?})",
        id,
        connected.get("server"),
        negotiated.outgoing,
        negotiated.incoming
    );

    let subscriptions = SubscriptionManager::subscribe_all(transport, id).await?;
    Ok((negotiated, subscriptions))
}

/// Wait for CONNECTED; ERROR or anything else fails the handshake.
async fn await_connected<T: Transport>(transport: &mut T, id: u64) -> Result<Frame, Error> {
    loop {
        let text = match transport.recv().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => return Err(e),
            None => return Err(Error::ConnectionClosed),
        };

        let mut frames = Frame::decode_all(&text)?.into_iter();
        let Some(frame) = frames.next() else {
            // Heartbeat before CONNECTED
            continue;
        };
        if frames.len() > 0 {
            debug!(
                "[CONN-{}] Discarding {} frames received with the handshake reply",
                id,
                frames.len()
            );
        }

        return match frame.command {
            Command::Connected => Ok(frame),
            Command::Error => Err(Error::Protocol(
                frame
                    .get("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| "handshake rejected".to_string()),
            )),
            other => Err(Error::Protocol(format!(
                "expected CONNECTED, got {}",
                other.as_str()
            ))),
        };
    }
}

/// Send one message, failing once `limit` has passed
async fn send_within<T: Transport>(
    transport: &mut T,
    message: String,
    limit: Duration,
) -> Result<(), Error> {
    timeout(limit, transport.send(message))
        .await
        .unwrap_or_else(|_| {
            Err(Error::ConnectionFailed(format!(
                "send did not complete within {:?}",
                limit
            )))
        })
}

/// Close `transport`, giving up on it after `limit`
async fn close_within<T: Transport>(transport: &mut T, limit: Duration, id: u64) {
    if timeout(limit, transport.close()).await.is_err() {
        warn!("[CONN-{}] Transport did not close within {:?}", id, limit);
    }
}

/// Next message of the live transport; pending forever without one.
async fn next_message<T: Transport>(link: &mut Option<Link<T>>) -> Option<Result<String, Error>> {
    match link {
        Some(link) => link.transport.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
