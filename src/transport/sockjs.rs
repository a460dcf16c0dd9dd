//! SockJS framing used by the xhr-polling emulation.

use crate::error::Error;

/// One SockJS frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    /// `o`: session opened
    Open,
    /// `h`: server heartbeat
    Heartbeat,
    /// `a[...]`: one or more application messages
    Messages(Vec<String>),
    /// `c[code,"reason"]`: session closed by the server
    Close { code: u16, reason: String },
}

impl SockJsFrame {
    /// Decode every frame in an xhr response body (frames are newline separated).
    pub fn decode_body(body: &str) -> Result<Vec<SockJsFrame>, Error> {
        body.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::decode)
            .collect()
    }

    fn decode(line: &str) -> Result<SockJsFrame, Error> {
        let mut chars = line.chars();
        let kind = chars.next().unwrap_or_default();
        let payload = chars.as_str();
        match kind {
            'o' => Ok(SockJsFrame::Open),
            'h' => Ok(SockJsFrame::Heartbeat),
            'a' => serde_json::from_str::<Vec<String>>(payload)
                .map(SockJsFrame::Messages)
                .map_err(|e| Error::Frame(format!("bad SockJS message array: {}", e))),
            'c' => serde_json::from_str::<(u16, String)>(payload)
                .map(|(code, reason)| SockJsFrame::Close { code, reason })
                .map_err(|e| Error::Frame(format!("bad SockJS close frame: {}", e))),
            _ => Err(Error::Frame(format!("unknown SockJS frame type '{}'", kind))),
        }
    }
}

/// Body of an `xhr_send` request
pub(crate) fn encode_send(messages: &[String]) -> Result<String, Error> {
    serde_json::to_string(messages).map_err(|e| Error::Frame(e.to_string()))
}
