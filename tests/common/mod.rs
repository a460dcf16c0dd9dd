//! In-memory transport double for lifecycle tests.
//!
//! Every `open()` either fails (per the script) or creates a duplex pair:
//! the client half goes to the connection task, the server half is handed
//! to the test through [`FakeNetwork::next_server`].

#![allow(dead_code)]

use notify_link::frame::{Command, Frame};
use notify_link::{
    ChannelHandler, ClientConfig, ClientEvent, ConnectionManager, Endpoint, Error, Status,
    Transport, TransportFactory,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// What the next `open()` does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Accept,
    Refuse,
    /// Accept once the delay has passed
    AcceptAfter(Duration),
}

#[derive(Default)]
struct Script {
    plans: VecDeque<Plan>,
    /// Used once the scripted plans run out
    fallback: Option<Plan>,
    opens: Vec<Instant>,
}

#[derive(Clone)]
pub struct FakeFactory {
    script: Arc<Mutex<Script>>,
    servers: mpsc::UnboundedSender<ServerConn>,
}

impl TransportFactory for FakeFactory {
    type Transport = FakeTransport;

    async fn open(&self, _endpoint: &Endpoint) -> Result<FakeTransport, Error> {
        let plan = {
            let mut script = self.script.lock();
            script.opens.push(Instant::now());
            let fallback = script.fallback.unwrap_or(Plan::Accept);
            script.plans.pop_front().unwrap_or(fallback)
        };

        match plan {
            Plan::Refuse => return Err(Error::ConnectionFailed("connection refused".to_string())),
            Plan::AcceptAfter(delay) => tokio::time::sleep(delay).await,
            Plan::Accept => {}
        }

        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let stalled = Arc::new(AtomicBool::new(false));
        let server = ServerConn {
            inbound,
            outbound: Some(outbound),
            closed: closed.clone(),
            stalled: stalled.clone(),
        };
        let _ = self.servers.send(server);
        Ok(FakeTransport {
            to_server,
            from_server,
            closed,
            stalled,
        })
    }
}

pub struct FakeTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<Result<String, Error>>,
    closed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl Transport for FakeTransport {
    async fn send(&mut self, message: String) -> Result<(), Error> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        self.to_server
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<Result<String, Error>> {
        self.from_server.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// The server side of one fake connection
pub struct ServerConn {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: Option<mpsc::UnboundedSender<Result<String, Error>>>,
    closed: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl ServerConn {
    /// Next frame from the client, skipping heartbeats.
    ///
    /// `None` once the client dropped its half.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let message = self.inbound.recv().await?;
            let mut frames = Frame::decode_all(&message).expect("client sent a bad frame");
            if !frames.is_empty() {
                assert_eq!(frames.len(), 1, "one frame per message");
                return frames.pop();
            }
        }
    }

    /// Raw messages already queued by the client
    pub fn drain_raw(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Frames already queued by the client, heartbeats skipped
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        self.drain_raw()
            .iter()
            .flat_map(|m| Frame::decode_all(m).expect("client sent a bad frame"))
            .collect()
    }

    /// Read CONNECT and answer CONNECTED with the given `heart-beat`.
    pub async fn accept_with_heartbeat(&mut self, heart_beat: &str) -> Frame {
        let connect = self.next_frame().await.expect("client closed before CONNECT");
        assert_eq!(connect.command, Command::Connect);
        self.send_frame(
            Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", heart_beat),
        );
        connect
    }

    /// Accept with heartbeats disabled
    pub async fn accept(&mut self) -> Frame {
        self.accept_with_heartbeat("0,0").await
    }

    /// Accept, then read both SUBSCRIBE frames and return their ids
    pub async fn accept_and_subscribe(&mut self) -> Vec<(String, String)> {
        self.accept().await;
        self.subscriptions().await
    }

    /// Read the two SUBSCRIBE frames; returns `(id, destination)` pairs
    pub async fn subscriptions(&mut self) -> Vec<(String, String)> {
        let mut subscriptions = Vec::new();
        for _ in 0..2 {
            let frame = self.next_frame().await.expect("client closed before SUBSCRIBE");
            assert_eq!(frame.command, Command::Subscribe);
            subscriptions.push((
                frame.get("id").unwrap().to_string(),
                frame.get("destination").unwrap().to_string(),
            ));
        }
        subscriptions
    }

    pub fn send_frame(&self, frame: Frame) {
        self.send_raw(frame.encode());
    }

    /// Send one transport message as-is
    pub fn send_raw(&self, message: impl Into<String>) {
        if let Some(outbound) = &self.outbound {
            let _ = outbound.send(Ok(message.into()));
        }
    }

    /// From now on every client send hangs forever
    pub fn stall_sends(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn send_message(&self, subscription: &str, destination: &str, body: &str) {
        self.send_frame(
            Frame::new(Command::Message)
                .header("subscription", subscription)
                .header("destination", destination)
                .header("message-id", "m-1")
                .with_body(body),
        );
    }

    /// Reject the session with an ERROR frame
    pub fn reject(&self, message: &str) {
        self.send_frame(Frame::new(Command::Error).header("message", message));
    }

    /// Close the server side; the client sees a clean close
    pub fn hang_up(&mut self) {
        self.outbound = None;
    }

    /// Whether the client closed its transport
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A scripted fake network
pub struct FakeNetwork {
    script: Arc<Mutex<Script>>,
    servers: mpsc::UnboundedReceiver<ServerConn>,
    factory: FakeFactory,
}

impl FakeNetwork {
    pub fn new() -> Self {
        let (tx, servers) = mpsc::unbounded_channel();
        let script = Arc::new(Mutex::new(Script::default()));
        let factory = FakeFactory {
            script: script.clone(),
            servers: tx,
        };
        Self {
            script,
            servers,
            factory,
        }
    }

    /// Queue plans for the next opens
    pub fn script(&self, plans: impl IntoIterator<Item = Plan>) {
        self.script.lock().plans.extend(plans);
    }

    /// Plan used after the script runs out (default: accept)
    pub fn otherwise(&self, plan: Plan) {
        self.script.lock().fallback = Some(plan);
    }

    pub fn factory(&self) -> FakeFactory {
        self.factory.clone()
    }

    /// Instants of every `open()` so far
    pub fn opens(&self) -> Vec<Instant> {
        self.script.lock().opens.clone()
    }

    pub fn open_count(&self) -> usize {
        self.script.lock().opens.len()
    }

    /// Wait for the client's next accepted connection
    pub async fn next_server(&mut self) -> ServerConn {
        self.servers.recv().await.expect("factory dropped")
    }
}

pub fn endpoint() -> Endpoint {
    Endpoint::from_api_base("http://localhost:8080", "/ws").unwrap()
}

pub fn manager<C: notify_link::CredentialProvider>(
    network: &FakeNetwork,
    credentials: C,
) -> ConnectionManager {
    manager_with_config(network, credentials, ClientConfig::default())
}

pub fn manager_with_config<C: notify_link::CredentialProvider>(
    network: &FakeNetwork,
    credentials: C,
    config: ClientConfig,
) -> ConnectionManager {
    ConnectionManager::new(config, endpoint(), network.factory(), credentials)
}

/// Next event, which must be a status
pub async fn next_status(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Status {
    match events.recv().await {
        Some(ClientEvent::Status(status)) => status,
        other => panic!("expected a status event, got {:?}", other),
    }
}

pub fn handler() -> (ChannelHandler, mpsc::UnboundedReceiver<ClientEvent>) {
    ChannelHandler::new()
}
