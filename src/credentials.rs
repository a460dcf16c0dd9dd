//! Bearer-token sources.
//!
//! The client only ever reads credentials, once per connection attempt.
//! Writing or refreshing the token is the host's business.

use parking_lot::RwLock;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// An opaque bearer token.
///
/// `Debug` and `Display` never print the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    /// Wrap a raw token. Returns `None` for empty or whitespace-only tokens.
    pub fn bearer(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == token.len() {
            Some(Self(token))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The raw token
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(***)")
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Supplies the current bearer token.
///
/// Returning `None` means no user is authenticated; the client then fails
/// fast with an `AuthMissing` status and does not touch the network.
pub trait CredentialProvider: Send + Sync + 'static {
    /// The token to present on the next handshake
    fn bearer_token(&self) -> Option<Credentials>;
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn bearer_token(&self) -> Option<Credentials> {
        (**self).bearer_token()
    }
}

/// In-memory token slot shared with the host.
///
/// The host stores the token after login and clears it on logout.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<Option<Credentials>>,
}

impl TokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Credentials::bearer(token)),
        }
    }

    /// Replace the stored token
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Credentials::bearer(token);
    }

    /// Forget the stored token
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl CredentialProvider for TokenStore {
    fn bearer_token(&self) -> Option<Credentials> {
        self.token.read().clone()
    }
}

/// Reads the token from a file on every connection attempt.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    /// Read tokens from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialProvider for FileCredentials {
    fn bearer_token(&self) -> Option<Credentials> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Credentials::bearer(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read token file {}: {}", self.path.display(), e);
                None
            }
        }
    }
}
