use super::Transport;
use crate::error::Error;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpSocket;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{
    client_async_tls_with_config, tungstenite::client::IntoClientRequest,
    tungstenite::Error as WsError, tungstenite::Message, Connector, MaybeTlsStream,
    WebSocketStream,
};
use tracing::{debug, trace};
use url::Url;

/// Type alias for WebSocket stream
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Native WebSocket transport, one STOMP frame per text message.
pub struct WebSocketTransport {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to `url` (`ws://` or `wss://`) within `connect_timeout`.
    pub async fn connect(url: &Url, connect_timeout: Duration) -> Result<Self, Error> {
        let ws_stream = match timeout(connect_timeout, connect_with_options(url)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::ConnectionFailed(format!(
                    "WebSocket connect to {} timed out",
                    url
                )))
            }
        };

        debug!("WebSocket connected to {}", url);
        let (write, read) = ws_stream.split();
        Ok(Self {
            write,
            read,
            closed: false,
        })
    }
}

impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), Error> {
        self.write
            .send(Message::Text(message))
            .await
            .map_err(Error::WebSocket)
    }

    async fn recv(&mut self) -> Option<Result<String, Error>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => {
                    return Some(
                        String::from_utf8(data)
                            .map_err(|e| Error::Frame(format!("binary frame is not UTF-8: {}", e))),
                    )
                }
                Ok(Message::Close(frame)) => {
                    debug!("Received close frame: {:?}", frame);
                    return None;
                }
                // Pings are answered by tungstenite on the next read/write
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    trace!("Control frame");
                }
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(Error::WebSocket(e))),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.write.send(Message::Close(None)).await;
        let _ = self.write.close().await;
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// Perform DNS lookup, TCP connect, optional TLS, and the WebSocket upgrade.
async fn connect_with_options(url: &Url) -> Result<WsStream, Error> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::ConnectionFailed("No host in URL".to_string()))?;

    let is_tls = url.scheme() == "wss";
    let port = url.port().unwrap_or(if is_tls { 443 } else { 80 });

    let request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::ConnectionFailed(format!("Invalid WebSocket request: {}", e)))?;

    let tcp_stream = connect_direct(host, port).await?;

    // Set TCP options for low latency
    set_tcp_options(&tcp_stream);

    let connector = if is_tls {
        let tls = native_tls::TlsConnector::new()
            .map_err(|e| Error::ConnectionFailed(format!("TLS error: {}", e)))?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let (ws_stream, _response) = client_async_tls_with_config(request, tcp_stream, None, connector)
        .await
        .map_err(Error::WebSocket)?;

    Ok(ws_stream)
}

async fn connect_direct(host: &str, port: u16) -> Result<tokio::net::TcpStream, Error> {
    let dest_str = format!("{}:{}", host, port);
    let dest_addr: SocketAddr = tokio::net::lookup_host(&dest_str)
        .await
        .map_err(|e| Error::ConnectionFailed(format!("DNS lookup failed: {}", e)))?
        .next()
        .ok_or_else(|| Error::ConnectionFailed(format!("No addresses found for {}", host)))?;

    let socket = if dest_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Error::ConnectionFailed(format!("Failed to create socket: {}", e)))?;

    socket
        .connect(dest_addr)
        .await
        .map_err(|e| Error::ConnectionFailed(format!("TCP connect to {} failed: {}", dest_addr, e)))
}

/// Disable Nagle and enable TCP keepalive so dead peers surface as errors
fn set_tcp_options(stream: &tokio::net::TcpStream) {
    let sock2 = socket2::SockRef::from(stream);

    let _ = sock2.set_nodelay(true);

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    let _ = sock2.set_tcp_keepalive(&keepalive);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_connection_failed() {
        // Bind then drop a listener so the port is very likely closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{}/ws", port)).unwrap();
        let result = WebSocketTransport::connect(&url, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_connect_and_exchange_text() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            ws.send(msg).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let url = Url::parse(&format!("ws://{}/ws", addr)).unwrap();
        let mut transport = WebSocketTransport::connect(&url, Duration::from_secs(2))
            .await
            .unwrap();

        transport.send("CONNECT\n\n\0".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "CONNECT\n\n\0");
        assert!(transport.recv().await.is_none());

        transport.close().await;
        server.await.unwrap();
    }
}
