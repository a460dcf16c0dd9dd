//! Duplex, message-framed transports.
//!
//! [`Transport`] is the capability the connection task drives: send a
//! text message, receive the next one (which also reports close and
//! error), and close. [`NetworkTransportFactory`] opens a native
//! WebSocket and falls back to SockJS xhr-polling when that fails.

mod polling;
mod sockjs;
mod websocket;

pub use polling::PollingTransport;
pub use sockjs::SockJsFrame;
pub use websocket::WebSocketTransport;

use crate::config::TransportMode;
use crate::endpoint::Endpoint;
use crate::error::Error;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// An open duplex connection carrying text messages.
pub trait Transport: Send + 'static {
    /// Send one message.
    fn send(&mut self, message: String) -> impl Future<Output = Result<(), Error>> + Send;

    /// Receive the next message.
    ///
    /// `None` means the peer closed the connection; `Some(Err(_))` is a
    /// transport failure. Must be cancel-safe: it is polled inside
    /// `tokio::select!`.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, Error>>> + Send;

    /// Tear the connection down. Safe to call more than once.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Opens transports to the notification endpoint.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: Transport;

    /// Open a new connection to `endpoint`.
    ///
    /// Implementations bound their own connect time; the connection task
    /// only times the STOMP handshake that follows.
    fn open(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Transport, Error>> + Send;
}

/// Either of the network transports.
pub enum NetworkTransport {
    WebSocket(WebSocketTransport),
    Polling(PollingTransport),
}

impl Transport for NetworkTransport {
    async fn send(&mut self, message: String) -> Result<(), Error> {
        match self {
            NetworkTransport::WebSocket(t) => t.send(message).await,
            NetworkTransport::Polling(t) => t.send(message).await,
        }
    }

    async fn recv(&mut self) -> Option<Result<String, Error>> {
        match self {
            NetworkTransport::WebSocket(t) => t.recv().await,
            NetworkTransport::Polling(t) => t.recv().await,
        }
    }

    async fn close(&mut self) {
        match self {
            NetworkTransport::WebSocket(t) => t.close().await,
            NetworkTransport::Polling(t) => t.close().await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            NetworkTransport::WebSocket(t) => t.name(),
            NetworkTransport::Polling(t) => t.name(),
        }
    }
}

/// Opens real network transports according to a [`TransportMode`].
#[derive(Debug, Clone)]
pub struct NetworkTransportFactory {
    mode: TransportMode,
    connect_timeout: Duration,
    http: reqwest::Client,
}

impl NetworkTransportFactory {
    /// Create a factory using `mode`, bounding each open by `connect_timeout`
    pub fn new(mode: TransportMode, connect_timeout: Duration) -> Self {
        Self {
            mode,
            connect_timeout,
            http: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client for the polling fallback
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    async fn open_polling(&self, endpoint: &Endpoint) -> Result<NetworkTransport, Error> {
        PollingTransport::open(self.http.clone(), endpoint.http_url(), self.connect_timeout)
            .await
            .map(NetworkTransport::Polling)
    }
}

impl TransportFactory for NetworkTransportFactory {
    type Transport = NetworkTransport;

    async fn open(&self, endpoint: &Endpoint) -> Result<NetworkTransport, Error> {
        match self.mode {
            TransportMode::PollingOnly => self.open_polling(endpoint).await,
            TransportMode::WebSocketOnly => {
                WebSocketTransport::connect(endpoint.websocket_url(), self.connect_timeout)
                    .await
                    .map(NetworkTransport::WebSocket)
            }
            TransportMode::Auto => {
                match WebSocketTransport::connect(endpoint.websocket_url(), self.connect_timeout)
                    .await
                {
                    Ok(ws) => Ok(NetworkTransport::WebSocket(ws)),
                    Err(e) => {
                        warn!("WebSocket unavailable ({}), falling back to xhr-polling", e);
                        let transport = self.open_polling(endpoint).await?;
                        debug!("xhr-polling session opened");
                        Ok(transport)
                    }
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{read_head, serve};
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_auto_mode_falls_back_when_upgrade_stalls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Swallow the upgrade request and never answer it
            let (mut stalled, _) = listener.accept().await.unwrap();
            let upgrade = read_head(&mut stalled).await;
            let request_lines = serve(listener, vec!["o\n", "c[3000,\"Go away!\"]\n"]).await;
            drop(stalled);
            (upgrade, request_lines)
        });

        let endpoint = Endpoint::from_api_base(&format!("http://{}", addr), "/ws").unwrap();
        let factory =
            NetworkTransportFactory::new(TransportMode::Auto, Duration::from_millis(500));
        let mut transport = factory.open(&endpoint).await.unwrap();
        assert_eq!(transport.name(), "xhr-polling");
        assert!(transport.recv().await.is_none());

        let (upgrade, request_lines) = server.await.unwrap();
        assert!(upgrade.starts_with("GET /ws "));
        assert_eq!(request_lines.len(), 2);
        assert!(request_lines.iter().all(|line| line.starts_with("POST /ws/")));
    }

    #[tokio::test]
    async fn test_auto_mode_falls_back_to_polling() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(
            listener,
            vec!["no upgrade here", "o\n", "c[3000,\"Go away!\"]\n"],
        ));

        let endpoint = Endpoint::from_api_base(&format!("http://{}", addr), "/ws").unwrap();
        let factory = NetworkTransportFactory::new(TransportMode::Auto, Duration::from_secs(5));
        let mut transport = factory.open(&endpoint).await.unwrap();
        assert_eq!(transport.name(), "xhr-polling");
        assert!(transport.recv().await.is_none());

        let request_lines = server.await.unwrap();
        assert!(request_lines[0].starts_with("GET /ws "));
        assert!(request_lines[1].starts_with("POST /ws/"));
    }

    #[tokio::test]
    async fn test_websocket_only_does_not_fall_back() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, vec!["no upgrade here"]));

        let endpoint = Endpoint::from_api_base(&format!("http://{}", addr), "/ws").unwrap();
        let factory =
            NetworkTransportFactory::new(TransportMode::WebSocketOnly, Duration::from_secs(5));
        let result = factory.open(&endpoint).await;
        assert!(matches!(result, Err(Error::WebSocket(_))));

        let request_lines = server.await.unwrap();
        assert_eq!(request_lines.len(), 1);
    }
}
