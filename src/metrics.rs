use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for observability
///
/// Counters are updated by the connection task and can be read from any
/// thread. Use `snapshot()` for a point-in-time view.
///
/// # Example
/// ```ignore
/// let metrics = manager.metrics();
/// println!("Parse errors: {}", metrics.parse_errors());
/// ```
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnect_attempts_total: AtomicU64,
    messages_received_total: AtomicU64,
    notifications_delivered_total: AtomicU64,
    unread_counts_delivered_total: AtomicU64,
    parse_errors_total: AtomicU64,
    dropped_messages_total: AtomicU64,
    handler_panics_total: AtomicU64,
    heartbeats_sent_total: AtomicU64,
    heartbeat_timeouts_total: AtomicU64,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Successful handshakes
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Reconnection timers that fired
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts_total.load(Ordering::Relaxed)
    }

    /// STOMP MESSAGE frames received
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Notifications handed to the host
    pub fn notifications_delivered(&self) -> u64 {
        self.notifications_delivered_total.load(Ordering::Relaxed)
    }

    /// Unread counts handed to the host
    pub fn unread_counts_delivered(&self) -> u64 {
        self.unread_counts_delivered_total.load(Ordering::Relaxed)
    }

    /// Malformed payloads dropped
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors_total.load(Ordering::Relaxed)
    }

    /// Messages for unknown or stale subscriptions
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages_total.load(Ordering::Relaxed)
    }

    /// Panics caught in host handlers
    pub fn handler_panics(&self) -> u64 {
        self.handler_panics_total.load(Ordering::Relaxed)
    }

    /// Outbound heartbeats sent
    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent_total.load(Ordering::Relaxed)
    }

    /// Connections torn down for inbound silence
    pub fn heartbeat_timeouts(&self) -> u64 {
        self.heartbeat_timeouts_total.load(Ordering::Relaxed)
    }

    // ========== Recording methods (called internally) ==========

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_attempt(&self) {
        self.reconnect_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification_delivered(&self) {
        self.notifications_delivered_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unread_count_delivered(&self) {
        self.unread_counts_delivered_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_error(&self) {
        self.parse_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_message(&self) {
        self.dropped_messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_panic(&self) {
        self.handler_panics_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_sent(&self) {
        self.heartbeats_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat_timeout(&self) {
        self.heartbeat_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all metrics for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnect_attempts_total: self.reconnect_attempts_total.load(Ordering::Acquire),
            messages_received_total: self.messages_received_total.load(Ordering::Acquire),
            notifications_delivered_total: self
                .notifications_delivered_total
                .load(Ordering::Acquire),
            unread_counts_delivered_total: self
                .unread_counts_delivered_total
                .load(Ordering::Acquire),
            parse_errors_total: self.parse_errors_total.load(Ordering::Acquire),
            dropped_messages_total: self.dropped_messages_total.load(Ordering::Acquire),
            handler_panics_total: self.handler_panics_total.load(Ordering::Acquire),
            heartbeats_sent_total: self.heartbeats_sent_total.load(Ordering::Acquire),
            heartbeat_timeouts_total: self.heartbeat_timeouts_total.load(Ordering::Acquire),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnect_attempts_total: u64,
    pub messages_received_total: u64,
    pub notifications_delivered_total: u64,
    pub unread_counts_delivered_total: u64,
    pub parse_errors_total: u64,
    pub dropped_messages_total: u64,
    pub handler_panics_total: u64,
    pub heartbeats_sent_total: u64,
    pub heartbeat_timeouts_total: u64,
}
