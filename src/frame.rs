//! STOMP 1.2 frame codec.
//!
//! One transport message carries either a single frame or a heartbeat
//! (a bare EOL). Decoding accepts several frames per message and leading
//! EOLs, which some brokers emit.

use crate::error::Error;
use std::fmt;

/// Protocol versions offered in the CONNECT frame
pub const ACCEPT_VERSION: &str = "1.2,1.1";

/// A single EOL, the heartbeat frame
pub const HEARTBEAT: &str = "\n";

/// STOMP frame commands used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Option<Self> {
        Some(match line {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A STOMP frame
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name` (repeated headers: the first one wins)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All headers in wire order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Encode to wire text, NUL-terminated
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                escape_into(&mut out, name);
                out.push(':');
                escape_into(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame in `input`.
    ///
    /// Returns an empty vector when the input is only heartbeat EOLs.
    pub fn decode_all(input: &str) -> Result<Vec<Frame>, Error> {
        let mut frames = Vec::new();
        let mut rest = input;

        loop {
            rest = rest.trim_start_matches(['\n', '\r']);
            if rest.is_empty() {
                return Ok(frames);
            }
            let (frame, remaining) = decode_one(rest)?;
            frames.push(frame);
            rest = remaining;
        }
    }

    /// Decode every frame in `input`, one result per frame.
    ///
    /// A malformed frame yields an `Err` and decoding resumes after its
    /// NUL terminator, so the frames around it survive.
    pub fn decode_each(input: &str) -> Vec<Result<Frame, Error>> {
        let mut results = Vec::new();
        let mut rest = input;

        loop {
            rest = rest.trim_start_matches(['\n', '\r']);
            if rest.is_empty() {
                return results;
            }
            match decode_one(rest) {
                Ok((frame, remaining)) => {
                    results.push(Ok(frame));
                    rest = remaining;
                }
                Err(e) => {
                    results.push(Err(e));
                    rest = rest.find('\0').map_or("", |end| &rest[end + 1..]);
                }
            }
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") || k == "passcode" {
                    (k.as_str(), "***")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("Frame")
            .field("command", &self.command)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

fn decode_one(input: &str) -> Result<(Frame, &str), Error> {
    let (command_line, mut rest) = split_line(input)
        .ok_or_else(|| Error::Frame("truncated command line".to_string()))?;
    let command = Command::parse(command_line)
        .ok_or_else(|| Error::Frame(format!("unknown command '{}'", command_line)))?;

    let mut headers = Vec::new();
    loop {
        let (line, remaining) =
            split_line(rest).ok_or_else(|| Error::Frame("truncated headers".to_string()))?;
        rest = remaining;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Frame(format!("header without ':' in {} frame", command)))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| Error::Frame(format!("invalid content-length '{}'", v)))
        })
        .transpose()?;

    let (body, rest) = match content_length {
        Some(len) => {
            let body = rest
                .get(..len)
                .ok_or_else(|| Error::Frame("body shorter than content-length".to_string()))?;
            let after = &rest[len..];
            let after = after
                .strip_prefix('\0')
                .ok_or_else(|| Error::Frame("missing NUL after body".to_string()))?;
            (body, after)
        }
        None => {
            let end = rest
                .find('\0')
                .ok_or_else(|| Error::Frame("missing NUL terminator".to_string()))?;
            (&rest[..end], &rest[end + 1..])
        }
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        rest,
    ))
}

/// Split off one line, accepting `\n` or `\r\n`
fn split_line(input: &str) -> Option<(&str, &str)> {
    let pos = input.find('\n')?;
    let line = &input[..pos];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[pos + 1..]))
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, Error> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(Error::Frame(format!(
                    "invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
