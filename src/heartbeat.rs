use crate::config::HeartbeatConfig;
use tokio::time::{Duration, Instant};

/// Heartbeat intervals agreed with the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegotiatedHeartbeat {
    /// How often we must send something (None: never)
    pub outgoing: Option<Duration>,
    /// How often the server promised to send something (None: no promise)
    pub incoming: Option<Duration>,
}

impl NegotiatedHeartbeat {
    /// Value for the `heart-beat` header of our CONNECT frame
    pub fn request_header(config: &HeartbeatConfig) -> String {
        format!(
            "{},{}",
            config.outgoing.as_millis(),
            config.incoming.as_millis()
        )
    }

    /// Combine our request with the `heart-beat` header of CONNECTED.
    ///
    /// Each direction uses the larger of the two intervals; a zero on
    /// either side disables it. A missing or malformed header disables both.
    pub fn negotiate(config: &HeartbeatConfig, server_header: Option<&str>) -> Self {
        let (server_send, server_receive) = server_header
            .and_then(parse_header)
            .unwrap_or((0, 0));

        let combine = |ours: Duration, theirs_ms: u64| {
            let ours_ms = ours.as_millis() as u64;
            if ours_ms == 0 || theirs_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(ours_ms.max(theirs_ms)))
            }
        };

        Self {
            outgoing: combine(config.outgoing, server_receive),
            incoming: combine(config.incoming, server_send),
        }
    }
}

fn parse_header(value: &str) -> Option<(u64, u64)> {
    let (send, receive) = value.split_once(',')?;
    Some((send.trim().parse().ok()?, receive.trim().parse().ok()?))
}

/// `interval × tolerance`, with the tolerance forced to at least 1.0.
///
/// Saturates instead of panicking on overflow.
fn scale(interval: Duration, tolerance: f64) -> Duration {
    // `max` also maps NaN to 1.0
    Duration::try_from_secs_f64(interval.as_secs_f64() * tolerance.max(1.0)).unwrap_or(Duration::MAX)
}

/// Tracks heartbeat state for a single connection
#[derive(Debug)]
pub struct HeartbeatMonitor {
    outgoing: Option<Duration>,

    /// Inbound silence allowed before the connection is considered dead
    incoming_limit: Option<Duration>,

    /// Time of last frame sent (heartbeat or data)
    last_sent: Instant,

    /// Time of last frame received (heartbeat or data)
    last_received: Instant,
}

impl HeartbeatMonitor {
    /// Create a new monitor for negotiated intervals
    pub fn new(negotiated: NegotiatedHeartbeat, tolerance: f64) -> Self {
        let now = Instant::now();
        Self {
            outgoing: negotiated.outgoing,
            incoming_limit: negotiated.incoming.map(|i| scale(i, tolerance)),
            last_sent: now,
            last_received: now,
        }
    }

    /// Record that we sent a frame
    pub fn record_sent(&mut self) {
        self.last_sent = Instant::now();
    }

    /// Record that we received data (frame or heartbeat)
    pub fn record_received(&mut self) {
        self.last_received = Instant::now();
    }

    /// Check if an outbound heartbeat is due
    pub fn should_send(&self) -> bool {
        match self.outgoing {
            None => false,
            Some(interval) => self.last_sent.elapsed() >= interval,
        }
    }

    /// Check if the server has been silent for too long
    pub fn is_expired(&self) -> bool {
        match self.incoming_limit {
            None => false,
            Some(limit) => self.last_received.elapsed() >= limit,
        }
    }

    /// Earliest instant at which a send or an expiry check is due
    pub fn next_deadline(&self) -> Option<Instant> {
        let send_at = self.outgoing.and_then(|o| self.last_sent.checked_add(o));
        let expire_at = self
            .incoming_limit
            .and_then(|l| self.last_received.checked_add(l));
        match (send_at, expire_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Time since the last received frame
    pub fn silence(&self) -> Duration {
        self.last_received.elapsed()
    }
}
