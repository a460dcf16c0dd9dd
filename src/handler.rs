use crate::notification::NotificationMessage;
use crate::status::Status;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::error;

/// Trait that the host implements to receive notifications and status.
///
/// The client owns the connection lifecycle (reconnection, heartbeats,
/// subscriptions); the handler only renders what it is given.
///
/// All methods are called synchronously from the connection task and
/// should return promptly. A panic inside a method is caught and logged;
/// it never affects the connection.
///
/// # Example
///
/// ```ignore
/// use notify_link::{NotificationHandler, NotificationMessage, Status};
///
/// struct Tray;
///
/// impl NotificationHandler for Tray {
///     fn on_notification(&self, message: NotificationMessage) {
///         println!("{}: {}", message.title, message.body);
///     }
///
///     fn on_unread_count(&self, count: u64) {
///         println!("{} unread", count);
///     }
///
///     fn on_status(&self, status: &Status) {
///         println!("online: {}", status.connected());
///     }
/// }
/// ```
pub trait NotificationHandler: Send + Sync + 'static {
    /// Called for every notification received on the notification channel.
    fn on_notification(&self, message: NotificationMessage);

    /// Called for every value received on the unread-count channel.
    fn on_unread_count(&self, count: u64);

    /// Called on every connection state transition.
    fn on_status(&self, _status: &Status) {}
}

impl<T: NotificationHandler + ?Sized> NotificationHandler for std::sync::Arc<T> {
    fn on_notification(&self, message: NotificationMessage) {
        (**self).on_notification(message)
    }

    fn on_unread_count(&self, count: u64) {
        (**self).on_unread_count(count)
    }

    fn on_status(&self, status: &Status) {
        (**self).on_status(status)
    }
}

/// Events pushed by [`ChannelHandler`]
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Notification(NotificationMessage),
    UnreadCount(u64),
    Status(Status),
}

/// Handler that turns callbacks into typed events on a channel.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelHandler {
    /// Create the handler and the receiver the host consumes
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationHandler for ChannelHandler {
    fn on_notification(&self, message: NotificationMessage) {
        let _ = self.tx.send(ClientEvent::Notification(message));
    }

    fn on_unread_count(&self, count: u64) {
        let _ = self.tx.send(ClientEvent::UnreadCount(count));
    }

    fn on_status(&self, status: &Status) {
        let _ = self.tx.send(ClientEvent::Status(status.clone()));
    }
}

type Callback<T> = Box<dyn Fn(T) + Send + Sync + 'static>;

/// Handler built from three closures.
pub struct Callbacks {
    on_notification: Callback<NotificationMessage>,
    on_unread_count: Callback<u64>,
    on_status: Box<dyn Fn(&Status) + Send + Sync + 'static>,
}

impl Callbacks {
    pub fn new(
        on_notification: impl Fn(NotificationMessage) + Send + Sync + 'static,
        on_unread_count: impl Fn(u64) + Send + Sync + 'static,
        on_status: impl Fn(&Status) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_notification: Box::new(on_notification),
            on_unread_count: Box::new(on_unread_count),
            on_status: Box::new(on_status),
        }
    }
}

impl NotificationHandler for Callbacks {
    fn on_notification(&self, message: NotificationMessage) {
        (self.on_notification)(message)
    }

    fn on_unread_count(&self, count: u64) {
        (self.on_unread_count)(count)
    }

    fn on_status(&self, status: &Status) {
        (self.on_status)(status)
    }
}

/// Run a host callback, catching panics.
///
/// Returns `false` if the callback panicked.
pub(crate) fn call_guarded(name: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            error!("Handler.{} panicked: {}", name, panic_msg);
            false
        }
    }
}
