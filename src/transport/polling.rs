use super::sockjs::{encode_send, SockJsFrame};
use super::Transport;
use crate::error::Error;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, trace, warn};
use url::Url;

/// Upper bound for a single long-poll request; servers answer well before this
const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// SockJS xhr-polling emulation of a duplex connection.
///
/// A background task keeps one receive request (`/xhr`) outstanding and
/// forwards decoded messages to [`recv`](Transport::recv); each send is a
/// separate `/xhr_send` request.
pub struct PollingTransport {
    client: reqwest::Client,
    send_url: Url,
    /// Bound on each `xhr_send` request
    send_timeout: Duration,
    inbound: mpsc::UnboundedReceiver<Result<String, Error>>,
    poller: Option<JoinHandle<()>>,
}

impl PollingTransport {
    /// Open a new SockJS session under `base` (the HTTP form of the endpoint).
    ///
    /// `connect_timeout` bounds the opening request and every later send.
    pub async fn open(
        client: reqwest::Client,
        base: &Url,
        connect_timeout: Duration,
    ) -> Result<Self, Error> {
        let session_url = session_url(base)?;
        let receive_url = join(&session_url, "xhr")?;
        let send_url = join(&session_url, "xhr_send")?;

        debug!("Opening xhr-polling session {}", session_url);
        let body = client
            .post(receive_url.clone())
            .timeout(connect_timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut frames = SockJsFrame::decode_body(&body)?.into_iter();
        if frames.next() != Some(SockJsFrame::Open) {
            return Err(Error::ConnectionFailed(format!(
                "xhr-polling session did not open: {:?}",
                body.trim()
            )));
        }

        let (tx, inbound) = mpsc::unbounded_channel();
        // Anything that arrived together with the open frame
        let still_open = frames.all(|frame| forward(frame, &tx));

        let poller = still_open.then(|| tokio::spawn(poll_loop(client.clone(), receive_url, tx)));

        Ok(Self {
            client,
            send_url,
            send_timeout: connect_timeout,
            inbound,
            poller,
        })
    }
}

impl Transport for PollingTransport {
    async fn send(&mut self, message: String) -> Result<(), Error> {
        let body = encode_send(&[message])?;
        self.client
            .post(self.send_url.clone())
            .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
            .timeout(self.send_timeout)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, Error>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        self.inbound.close();
    }

    fn name(&self) -> &'static str {
        "xhr-polling"
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

async fn poll_loop(
    client: reqwest::Client,
    receive_url: Url,
    tx: mpsc::UnboundedSender<Result<String, Error>>,
) {
    loop {
        let body = match poll_once(&client, &receive_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("xhr-polling receive failed: {}", e);
                let _ = tx.send(Err(e));
                return;
            }
        };

        let frames = match SockJsFrame::decode_body(&body) {
            Ok(frames) => frames,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };

        for frame in frames {
            if !forward(frame, &tx) {
                return;
            }
        }
    }
}

async fn poll_once(client: &reqwest::Client, url: &Url) -> Result<String, Error> {
    Ok(client
        .post(url.clone())
        .timeout(POLL_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?)
}

/// Forward one frame; `false` once the session is over.
fn forward(frame: SockJsFrame, tx: &mpsc::UnboundedSender<Result<String, Error>>) -> bool {
    match frame {
        SockJsFrame::Open | SockJsFrame::Heartbeat => {
            trace!("xhr-polling keep-alive");
            true
        }
        SockJsFrame::Messages(messages) => messages
            .into_iter()
            .all(|message| tx.send(Ok(message)).is_ok()),
        SockJsFrame::Close { code, reason } => {
            debug!("xhr-polling session closed by server: {} {}", code, reason);
            false
        }
    }
}

/// `<base>/<server-id>/<session-id>`
fn session_url(base: &Url) -> Result<Url, Error> {
    let (server_id, session_id) = session_ids();
    let raw = format!(
        "{}/{}/{}",
        base.as_str().trim_end_matches('/'),
        server_id,
        session_id
    );
    Url::parse(&raw).map_err(|e| Error::InvalidEndpoint(format!("{}: {}", raw, e)))
}

fn join(session_url: &Url, suffix: &str) -> Result<Url, Error> {
    let raw = format!("{}/{}", session_url.as_str(), suffix);
    Url::parse(&raw).map_err(|e| Error::InvalidEndpoint(format!("{}: {}", raw, e)))
}

fn session_ids() -> (String, String) {
    let mut rng = rand::thread_rng();
    let server_id = format!("{:03}", rng.gen_range(0..1000));
    let session_id: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    (server_id, session_id.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{answer, read_head, serve};
    use tokio::net::TcpListener;

    #[test]
    fn test_session_url_shape() {
        let base = Url::parse("http://localhost:8080/ws").unwrap();
        let url = session_url(&base).unwrap();
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], "ws");
        assert_eq!(segments[1].len(), 3);
        assert!(segments[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(segments[2].len(), 8);
    }

    #[tokio::test]
    async fn test_open_receive_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(
            listener,
            vec!["o\n", "a[\"hello\"]\n", "c[3000,\"Go away!\"]\n"],
        ));

        let base = Url::parse(&format!("http://{}/ws", addr)).unwrap();
        let mut transport =
            PollingTransport::open(reqwest::Client::new(), &base, Duration::from_secs(5))
                .await
                .unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "hello");
        assert!(transport.recv().await.is_none());

        let request_lines = server.await.unwrap();
        assert_eq!(request_lines.len(), 3);
        assert!(request_lines
            .iter()
            .all(|line| line.starts_with("POST /ws/") && line.contains("/xhr ")));
    }

    #[tokio::test]
    async fn test_open_rejects_non_open_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, vec!["h\n"]));

        let base = Url::parse(&format!("http://{}/ws", addr)).unwrap();
        let result =
            PollingTransport::open(reqwest::Client::new(), &base, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::ConnectionFailed(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_gives_up_on_a_stalled_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut opening, _) = listener.accept().await.unwrap();
            answer(&mut opening, "o\n").await;
            // Every later request (the poll and the send) hangs
            let mut held = Vec::new();
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                read_head(&mut stream).await;
                held.push(stream);
            }
        });

        let base = Url::parse(&format!("http://{}/ws", addr)).unwrap();
        let mut transport =
            PollingTransport::open(reqwest::Client::new(), &base, Duration::from_millis(300))
                .await
                .unwrap();

        let started = std::time::Instant::now();
        let result = transport.send("SEND\ndestination:/app/x\n\n\0".to_string()).await;
        assert!(matches!(result, Err(Error::Http(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        transport.close().await;
    }
}
