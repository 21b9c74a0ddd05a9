//! Frame struct, commands and the encoder.
//!
//! A frame on the wire:
//!
//! ```text
//! COMMAND\n
//! key:value\n      (zero or more)
//! \n
//! body\0
//! ```
//!
//! # Example
//!
//! ```
//! use stompwire::protocol::{build_frame, Command, Headers, Protocol};
//!
//! let headers = Headers::new().add("destination", "/queue/a");
//! let bytes = build_frame(Command::Send, &headers, b"hi", Protocol::V1_2);
//! assert_eq!(&bytes[..], b"SEND\ndestination:/queue/a\n\nhi\0");
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::headers::{keys, Headers};
use super::version::{Escaping, Protocol};
use crate::error::{Result, StompError};

/// Frame terminator octet.
pub const NULL: u8 = 0;

/// Line terminator (also the heartbeat byte).
pub const LF: u8 = b'\n';

/// Carriage return, accepted before LF.
pub const CR: u8 = b'\r';

/// Every command a client or broker may put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// Parse a command line (without the line terminator).
    pub fn parse(line: &[u8]) -> Option<Self> {
        let cmd = match line {
            b"CONNECT" => Command::Connect,
            b"STOMP" => Command::Stomp,
            b"CONNECTED" => Command::Connected,
            b"SEND" => Command::Send,
            b"SUBSCRIBE" => Command::Subscribe,
            b"UNSUBSCRIBE" => Command::Unsubscribe,
            b"ACK" => Command::Ack,
            b"NACK" => Command::Nack,
            b"BEGIN" => Command::Begin,
            b"COMMIT" => Command::Commit,
            b"ABORT" => Command::Abort,
            b"DISCONNECT" => Command::Disconnect,
            b"MESSAGE" => Command::Message,
            b"RECEIPT" => Command::Receipt,
            b"ERROR" => Command::Error,
            _ => return None,
        };
        Some(cmd)
    }

    /// Handshake frames are never escaped, whatever the protocol.
    #[inline]
    pub fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Headers,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command, headers: Headers, body: Bytes) -> Self {
        Self {
            command,
            headers,
            body,
        }
    }

    /// First value of a header.
    #[inline]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.value(key)
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, if it is valid.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// The `message` header of an ERROR frame, or the body text.
    pub fn error_message(&self) -> String {
        self.header(keys::MESSAGE)
            .map(str::to_string)
            .or_else(|| self.body_str().map(|s| s.trim_end().to_string()))
            .unwrap_or_default()
    }

    /// Encode this frame for the given protocol.
    pub fn encode(&self, protocol: Protocol) -> Bytes {
        build_frame(self.command, &self.headers, &self.body, protocol)
    }
}

/// Encode a frame as one contiguous buffer.
///
/// Only complete header pairs are written; validation happens before this
/// is called.
pub fn build_frame(command: Command, headers: &Headers, body: &[u8], protocol: Protocol) -> Bytes {
    let escaping = if command.escapes_headers() {
        protocol.rules().escaping
    } else {
        Escaping::None
    };

    let cmd = command.as_str();
    let header_len: usize = headers.as_slice().iter().map(|t| t.len() + 1).sum();
    let mut buf = BytesMut::with_capacity(cmd.len() + header_len + body.len() + 3);

    buf.put_slice(cmd.as_bytes());
    buf.put_u8(LF);
    for (key, value) in headers.pairs() {
        escape_into(&mut buf, key, escaping);
        buf.put_u8(b':');
        escape_into(&mut buf, value, escaping);
        buf.put_u8(LF);
    }
    buf.put_u8(LF);
    buf.put_slice(body);
    buf.put_u8(NULL);
    buf.freeze()
}

fn escape_into(buf: &mut BytesMut, token: &str, escaping: Escaping) {
    if escaping == Escaping::None {
        buf.put_slice(token.as_bytes());
        return;
    }
    for &b in token.as_bytes() {
        match b {
            b'\\' => buf.put_slice(b"\\\\"),
            LF => buf.put_slice(b"\\n"),
            b':' => buf.put_slice(b"\\c"),
            CR if escaping == Escaping::WithCarriageReturn => buf.put_slice(b"\\r"),
            _ => buf.put_u8(b),
        }
    }
}

/// Reverse [`escape_into`] for one header token.
pub(crate) fn unescape(raw: &str, escaping: Escaping) -> Result<String> {
    if escaping == Escaping::None || !raw.contains('\\') {
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
            Some('c') => out.push(':'),
            Some('r') if escaping == Escaping::WithCarriageReturn => out.push('\r'),
            other => {
                return Err(StompError::Protocol(format!(
                    "invalid escape sequence \\{} in header {:?}",
                    other.map(String::from).unwrap_or_default(),
                    raw
                )))
            }
        }
    }
    Ok(out)
}
