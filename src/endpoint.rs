use crate::error::Error;
use url::Url;

/// The notification endpoint, in both of its URL forms.
///
/// Derived from the REST API base URL: same host and port, the endpoint
/// path appended to the base path, and the HTTP scheme swapped for its
/// WebSocket equivalent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    websocket: Url,
    http: Url,
}

impl Endpoint {
    /// Build the endpoint for `path` on the API at `api_base`.
    ///
    /// `api_base` may use `http`, `https`, `ws` or `wss`. Query strings and
    /// fragments are dropped; credentials are never carried in the URL.
    pub fn from_api_base(api_base: &str, path: &str) -> Result<Self, Error> {
        let base = Url::parse(api_base)
            .map_err(|e| Error::InvalidEndpoint(format!("{}: {}", api_base, e)))?;

        if base.host_str().is_none() {
            return Err(Error::InvalidEndpoint(format!("no host in {}", api_base)));
        }

        let (http_scheme, ws_scheme) = match base.scheme() {
            "http" | "ws" => ("http", "ws"),
            "https" | "wss" => ("https", "wss"),
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };

        let mut http = base.clone();
        http.set_query(None);
        http.set_fragment(None);
        let _ = http.set_username("");
        let _ = http.set_password(None);
        let joined = format!(
            "{}/{}",
            http.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        http.set_path(&joined);
        http.set_scheme(http_scheme)
            .map_err(|_| Error::InvalidEndpoint(format!("cannot use scheme {}", http_scheme)))?;

        let mut websocket = http.clone();
        websocket
            .set_scheme(ws_scheme)
            .map_err(|_| Error::InvalidEndpoint(format!("cannot use scheme {}", ws_scheme)))?;

        Ok(Self { websocket, http })
    }

    /// URL for the native WebSocket transport (`ws://` / `wss://`)
    pub fn websocket_url(&self) -> &Url {
        &self.websocket
    }

    /// URL for the HTTP polling fallback (`http://` / `https://`)
    pub fn http_url(&self) -> &Url {
        &self.http
    }

    /// Host name presented in the STOMP `host` header
    pub fn host(&self) -> &str {
        self.http.host_str().unwrap_or_default()
    }
}
