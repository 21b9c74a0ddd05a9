//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `Command`: skipping heartbeat EOLs, waiting for the command line
//! - `Headers`: collecting `key:value` lines until the blank line
//! - `Body`: waiting for `content-length` bytes, or for the NUL terminator
//!
//! # Example
//!
//! ```
//! use stompwire::protocol::{Command, FrameBuffer, Protocol};
//!
//! let mut buffer = FrameBuffer::new(Protocol::V1_2);
//!
//! // Heartbeats are swallowed, the frame arrives in two chunks.
//! assert!(buffer.push(b"\n\nMESSAGE\nsubscr").unwrap().is_empty());
//! let frames = buffer.push(b"iption:0\n\nhello\0").unwrap();
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].command, Command::Message);
//! assert_eq!(frames[0].body(), b"hello");
//! assert_eq!(buffer.take_heartbeats(), 2);
//! ```

use bytes::{Buf, BytesMut};

use super::frame::{unescape, Command, Frame, CR, LF, NULL};
use super::headers::{keys, Headers};
use super::version::{Escaping, Protocol};
use crate::error::{Result, StompError};

/// State machine for frame parsing.
#[derive(Debug)]
enum State {
    /// Between frames, waiting for a command line.
    Command,
    /// Command parsed, reading header lines.
    Headers {
        command: Command,
        headers: Headers,
        content_length: Option<usize>,
    },
    /// Headers parsed, waiting for the body.
    Body {
        command: Command,
        headers: Headers,
        content_length: Option<usize>,
        /// Bytes already searched for the terminator.
        scanned: usize,
    },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Protocol whose escaping and line-ending rules apply.
    protocol: Protocol,
    /// Heartbeat EOLs consumed since the last `take_heartbeats`.
    heartbeats: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer for `protocol`.
    pub fn new(protocol: Protocol) -> Self {
        Self::with_capacity(protocol, 64 * 1024)
    }

    pub fn with_capacity(protocol: Protocol, capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::Command,
            protocol,
            heartbeats: 0,
        }
    }

    /// Switch decoding rules, e.g. once the handshake has settled the version.
    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push. Heartbeat EOLs between frames
    /// are consumed and never returned.
    ///
    /// # Errors
    ///
    /// Returns [`StompError::Protocol`] on a malformed frame. The buffer
    /// should be discarded afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Append data to the buffer without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of heartbeats seen since the last call.
    pub fn take_heartbeats(&mut self) -> u64 {
        std::mem::take(&mut self.heartbeats)
    }

    /// Extract the next complete frame, if the buffer holds one.
    ///
    /// Frames are decoded one at a time, so a [`set_protocol`](Self::set_protocol)
    /// between calls applies to everything not yet returned.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match &mut self.state {
                State::Command => {
                    let Some(line) = self.next_line(true) else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.heartbeats += 1;
                        continue;
                    }
                    let command = Command::parse(&line).ok_or_else(|| {
                        StompError::Protocol(format!(
                            "unknown command {:?}",
                            String::from_utf8_lossy(&line)
                        ))
                    })?;
                    self.state = State::Headers {
                        command,
                        headers: Headers::new(),
                        content_length: None,
                    };
                }

                State::Headers { .. } => {
                    let crlf = self.protocol.rules().crlf;
                    let Some(line) = self.next_line(crlf) else {
                        return Ok(None);
                    };
                    let escaping = self.protocol.rules().escaping;
                    let State::Headers {
                        command,
                        headers,
                        content_length,
                    } = &mut self.state
                    else {
                        unreachable!("state checked above")
                    };

                    if line.is_empty() {
                        self.state = State::Body {
                            command: *command,
                            headers: std::mem::take(headers),
                            content_length: *content_length,
                            scanned: 0,
                        };
                        continue;
                    }

                    let escaping = if command.escapes_headers() {
                        escaping
                    } else {
                        Escaping::None
                    };
                    let (key, value) = parse_header_line(&line, escaping)?;
                    if key == keys::CONTENT_LENGTH && content_length.is_none() {
                        let len = value.trim().parse::<usize>().map_err(|_| {
                            StompError::Protocol(format!("invalid content-length {:?}", value))
                        })?;
                        *content_length = Some(len);
                    }
                    headers.push(key, value);
                }

                State::Body {
                    content_length,
                    scanned,
                    ..
                } => {
                    let body_len = match *content_length {
                        Some(len) => {
                            if self.buffer.len() <= len {
                                return Ok(None);
                            }
                            if self.buffer[len] != NULL {
                                return Err(StompError::Protocol(
                                    "frame body not terminated by NUL after content-length"
                                        .to_string(),
                                ));
                            }
                            len
                        }
                        None => {
                            let from = *scanned;
                            match self.buffer[from..].iter().position(|&b| b == NULL) {
                                Some(pos) => from + pos,
                                None => {
                                    *scanned = self.buffer.len();
                                    return Ok(None);
                                }
                            }
                        }
                    };

                    let State::Body {
                        command, headers, ..
                    } = std::mem::replace(&mut self.state, State::Command)
                    else {
                        unreachable!("state checked above")
                    };
                    let body = self.buffer.split_to(body_len).freeze();
                    self.buffer.advance(1);
                    return Ok(Some(Frame::new(command, headers, body)));
                }
            }
        }
    }

    /// Take one line off the buffer, without its terminator.
    fn next_line(&mut self, strip_cr: bool) -> Option<BytesMut> {
        let pos = self.buffer.iter().position(|&b| b == LF)?;
        let mut line = self.buffer.split_to(pos);
        self.buffer.advance(1);
        if strip_cr && line.last() == Some(&CR) {
            line.truncate(line.len() - 1);
        }
        Some(line)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Command;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Command => "Command",
            State::Headers { .. } => "Headers",
            State::Body { .. } => "Body",
        }
    }
}

fn parse_header_line(line: &[u8], escaping: Escaping) -> Result<(String, String)> {
    let text = std::str::from_utf8(line)
        .map_err(|_| StompError::Protocol("header line is not valid UTF-8".to_string()))?;
    let (key, value) = text
        .split_once(':')
        .ok_or_else(|| StompError::Protocol(format!("malformed header line {:?}", text)))?;
    Ok((unescape(key, escaping)?, unescape(value, escaping)?))
}
