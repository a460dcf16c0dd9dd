//! # notify-link
//!
//! A resilient client for an authenticated STOMP notification service.
//!
//! ## Features
//!
//! - **Bearer authentication** on the STOMP handshake, never in the URL
//! - **Auto-reconnection** with capped exponential backoff and a retry ceiling
//! - **Fixed subscriptions** to the notification and unread-count channels,
//!   re-established after every reconnect
//! - **Heartbeats** negotiated at handshake time to detect dead connections
//! - **Polling fallback** (SockJS xhr-polling) when a WebSocket cannot be opened
//! - **Failure isolation**: malformed payloads and panicking handlers never
//!   close the connection
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use notify_link::{ChannelHandler, ClientConfig, ConnectionManager, TokenStore};
//! use std::sync::Arc;
//!
//! let tokens = Arc::new(TokenStore::with_token(token));
//! let manager = ConnectionManager::from_api_base(
//!     "https://api.example.com",
//!     ClientConfig::default(),
//!     tokens.clone(),
//! )?;
//!
//! let (handler, mut events) = ChannelHandler::new();
//! manager.connect(handler);
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod config;
mod connection;
mod credentials;
mod dispatcher;
mod endpoint;
mod error;
pub mod frame;
mod handler;
mod heartbeat;
mod manager;
mod metrics;
mod notification;
mod reconnect;
mod status;
mod subscription;
pub mod transport;

pub use config::{
    BackoffConfig, ClientConfig, ClientConfigBuilder, ConfigError, HeartbeatConfig, TransportMode,
    DEFAULT_ENDPOINT_PATH,
};
pub use credentials::{CredentialProvider, Credentials, FileCredentials, TokenStore};
pub use endpoint::Endpoint;
pub use error::{Error, ErrorKind};
pub use handler::{Callbacks, ChannelHandler, ClientEvent, NotificationHandler};
pub use manager::ConnectionManager;
pub use metrics::{Metrics, MetricsSnapshot};
pub use notification::{NotificationId, NotificationMessage, Severity};
pub use status::{ConnectionState, Status, StatusError};
pub use subscription::{
    Channel, SubscriptionHandle, SubscriptionSet, NOTIFICATION_DESTINATION,
    UNREAD_COUNT_DESTINATION,
};
pub use transport::{Transport, TransportFactory};

/// Result type for notify-link operations
pub type Result<T> = std::result::Result<T, Error>;
