use crate::error::Error;
use crate::frame::{Command, Frame};
use crate::transport::Transport;
use tracing::{debug, warn};

/// Per-user notification destination
pub const NOTIFICATION_DESTINATION: &str = "/user/queue/notifications";

/// Per-user unread-count destination
pub const UNREAD_COUNT_DESTINATION: &str = "/user/queue/unread-count";

/// The two fixed channels every session subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Notifications,
    UnreadCount,
}

impl Channel {
    /// Subscription order after every connect
    pub const ALL: [Channel; 2] = [Channel::Notifications, Channel::UnreadCount];

    /// Server destination of this channel
    pub fn destination(&self) -> &'static str {
        match self {
            Channel::Notifications => NOTIFICATION_DESTINATION,
            Channel::UnreadCount => UNREAD_COUNT_DESTINATION,
        }
    }

    /// Channel for a destination, if it is one of ours
    pub fn from_destination(destination: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.destination() == destination)
    }
}

/// One live subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
    pub channel: Channel,
}

/// Both subscriptions of one connected period.
///
/// Never carried over a reconnect: each connection gets fresh ids.
#[derive(Debug, PartialEq, Eq)]
pub struct SubscriptionSet {
    handles: Vec<SubscriptionHandle>,
}

impl SubscriptionSet {
    /// Channel of a live subscription id
    pub fn channel_for(&self, subscription_id: &str) -> Option<Channel> {
        self.handles
            .iter()
            .find(|h| h.id == subscription_id)
            .map(|h| h.channel)
    }

    pub fn handles(&self) -> &[SubscriptionHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Establishes and releases the fixed subscriptions.
pub(crate) struct SubscriptionManager;

impl SubscriptionManager {
    /// Subscribe both channels on a freshly connected transport.
    ///
    /// All-or-nothing: the first failed send fails the whole sequence.
    pub(crate) async fn subscribe_all<T: Transport>(
        transport: &mut T,
        connection_id: u64,
    ) -> Result<SubscriptionSet, Error> {
        let mut handles = Vec::with_capacity(Channel::ALL.len());
        for (index, channel) in Channel::ALL.into_iter().enumerate() {
            let id = format!("sub-{}-{}", connection_id, index);
            let frame = Frame::new(Command::Subscribe)
                .header("id", id.as_str())
                .header("destination", channel.destination());
            transport.send(frame.encode()).await.map_err(|e| {
                Error::Protocol(format!(
                    "subscription to {} failed: {}",
                    channel.destination(),
                    e
                ))
            })?;
            debug!(
                "[CONN-{}] Subscribed {} as {}",
                connection_id,
                channel.destination(),
                id
            );
            handles.push(SubscriptionHandle { id, channel });
        }
        Ok(SubscriptionSet { handles })
    }

    /// Release every subscription in `set` (best effort).
    pub(crate) async fn unsubscribe_all<T: Transport>(
        transport: &mut T,
        set: SubscriptionSet,
        connection_id: u64,
    ) {
        for handle in set.handles {
            let frame = Frame::new(Command::Unsubscribe).header("id", handle.id.as_str());
            if let Err(e) = transport.send(frame.encode()).await {
                warn!(
                    "[CONN-{}] Failed to unsubscribe {}: {}",
                    connection_id, handle.id, e
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records sent messages; fails sends after `fail_after` successes.
    struct RecordingTransport {
        sent: Vec<String>,
        fail_after: usize,
    }

    impl Transport for RecordingTransport {
        async fn send(&mut self, message: String) -> Result<(), Error> {
            if self.sent.len() >= self.fail_after {
                return Err(Error::ConnectionClosed);
            }
            self.sent.push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, Error>> {
            None
        }

        async fn close(&mut self) {}

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_subscribe_all_creates_two_fresh_subscriptions() {
        let mut transport = RecordingTransport {
            sent: Vec::new(),
            fail_after: usize::MAX,
        };

        let set = SubscriptionManager::subscribe_all(&mut transport, 3)
            .await
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.channel_for("sub-3-0"), Some(Channel::Notifications));
        assert_eq!(set.channel_for("sub-3-1"), Some(Channel::UnreadCount));

        let frames: Vec<Frame> = transport
            .sent
            .iter()
            .flat_map(|m| Frame::decode_all(m).unwrap())
            .collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get("destination"), Some(NOTIFICATION_DESTINATION));
        assert_eq!(frames[1].get("destination"), Some(UNREAD_COUNT_DESTINATION));

        let next = SubscriptionManager::subscribe_all(&mut transport, 4)
            .await
            .unwrap();
        assert_eq!(next.channel_for("sub-3-0"), None);
    }

    #[tokio::test]
    async fn test_partial_subscription_is_a_failure() {
        let mut transport = RecordingTransport {
            sent: Vec::new(),
            fail_after: 1,
        };

        let result = SubscriptionManager::subscribe_all(&mut transport, 1).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_unsubscribe_all_sends_both_ids() {
        let mut transport = RecordingTransport {
            sent: Vec::new(),
            fail_after: usize::MAX,
        };
        let set = SubscriptionManager::subscribe_all(&mut transport, 9)
            .await
            .unwrap();
        transport.sent.clear();

        SubscriptionManager::unsubscribe_all(&mut transport, set, 9).await;

        let ids: Vec<String> = transport
            .sent
            .iter()
            .flat_map(|m| Frame::decode_all(m).unwrap())
            .filter(|f| f.command == Command::Unsubscribe)
            .filter_map(|f| f.get("id").map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["sub-9-0", "sub-9-1"]);
    }

    #[test]
    fn test_channel_from_destination() {
        assert_eq!(
            Channel::from_destination("/user/queue/unread-count"),
            Some(Channel::UnreadCount)
        );
        assert_eq!(Channel::from_destination("/topic/other"), None);
    }
}
