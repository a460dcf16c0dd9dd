use crate::error::Error;
use crate::frame::{Command, Frame};
use crate::handler::{call_guarded, NotificationHandler};
use crate::metrics::Metrics;
use crate::notification::NotificationMessage;
use crate::subscription::{Channel, SubscriptionSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What happened to an inbound MESSAGE frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Parsed and handed to the host
    Delivered,
    /// Parsed, but the host handler panicked
    HandlerPanicked,
    /// Malformed payload, dropped
    ParseFailed,
    /// Not addressed to a live subscription, dropped
    Unrouted,
}

/// Parses MESSAGE frames and hands them to the host handler.
///
/// Failures stay here: nothing this type does can close the connection.
pub(crate) struct Dispatcher {
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub(crate) fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Route one frame received while connected.
    pub(crate) fn dispatch(
        &self,
        frame: &Frame,
        subscriptions: &SubscriptionSet,
        handler: &dyn NotificationHandler,
    ) -> Dispatch {
        debug_assert_eq!(frame.command, Command::Message);
        self.metrics.record_message_received();

        let Some(channel) = route(frame, subscriptions) else {
            debug!(
                "Dropping message for {:?} (subscription {:?})",
                frame.get("destination"),
                frame.get("subscription")
            );
            self.metrics.record_dropped_message();
            return Dispatch::Unrouted;
        };

        let delivered = match channel {
            Channel::Notifications => match parse_notification(&frame.body) {
                Ok(message) => {
                    trace!("Delivering notification {}", message.id);
                    call_guarded("on_notification", || handler.on_notification(message))
                }
                Err(e) => return self.parse_failed(channel, e),
            },
            Channel::UnreadCount => match parse_unread_count(&frame.body) {
                Ok(count) => {
                    trace!("Delivering unread count {}", count);
                    call_guarded("on_unread_count", || handler.on_unread_count(count))
                }
                Err(e) => return self.parse_failed(channel, e),
            },
        };

        if !delivered {
            self.metrics.record_handler_panic();
            return Dispatch::HandlerPanicked;
        }

        match channel {
            Channel::Notifications => self.metrics.record_notification_delivered(),
            Channel::UnreadCount => self.metrics.record_unread_count_delivered(),
        }
        Dispatch::Delivered
    }

    fn parse_failed(&self, channel: Channel, error: Error) -> Dispatch {
        warn!(
            "Dropping malformed message on {}: {}",
            channel.destination(),
            error
        );
        self.metrics.record_parse_error();
        Dispatch::ParseFailed
    }
}

/// Resolve the channel: by subscription id when present (stale ids never
/// route), otherwise by destination.
fn route(frame: &Frame, subscriptions: &SubscriptionSet) -> Option<Channel> {
    match frame.get("subscription") {
        Some(id) => subscriptions.channel_for(id),
        None => frame.get("destination").and_then(Channel::from_destination),
    }
}

pub(crate) fn parse_notification(body: &str) -> Result<NotificationMessage, Error> {
    serde_json::from_str(body).map_err(|e| Error::Parse(format!("notification: {}", e)))
}

pub(crate) fn parse_unread_count(body: &str) -> Result<u64, Error> {
    let trimmed = body.trim();
    trimmed
        .parse::<u64>()
        .map_err(|e| Error::Parse(format!("unread count {:?}: {}", trimmed, e)))
}
