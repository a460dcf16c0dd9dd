//! Example: keeping a notification session open
//!
//! Connects to the notification service behind a REST API, prints every
//! notification and unread count, and shuts down on Ctrl-C.
//!
//! Run with:
//!   NOTIFY_API=http://localhost:8080 NOTIFY_TOKEN=... cargo run --example notifications

use notify_link::{ChannelHandler, ClientConfig, ClientEvent, ConnectionManager, TokenStore};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let api_base = std::env::var("NOTIFY_API").unwrap_or_else(|_| "http://localhost:8080".into());
    let tokens = Arc::new(TokenStore::new());
    if let Ok(token) = std::env::var("NOTIFY_TOKEN") {
        tokens.set(token);
    }

    let config = ClientConfig::builder().build()?;
    let manager = ConnectionManager::from_api_base(&api_base, config, tokens.clone())?;

    let (handler, mut events) = ChannelHandler::new();
    manager.connect(handler);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(ClientEvent::Notification(message)) => {
                        info!(
                            "[{:?}] {}: {} ({})",
                            message.severity, message.title, message.body, message.created_at
                        );
                    }
                    Some(ClientEvent::UnreadCount(count)) => info!("{} unread", count),
                    Some(ClientEvent::Status(status)) => {
                        info!("Status: {}", status.state);
                        if let Some(error) = status.error.filter(|e| e.is_terminal()) {
                            warn!("{}; log in again and restart", error);
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                manager.disconnect();
                break;
            }
        }
    }

    let snapshot = manager.metrics().snapshot();
    info!("Final metrics: {:?}", snapshot);
    manager.shutdown().await;

    Ok(())
}
