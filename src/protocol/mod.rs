//! Protocol module - versions, headers, framing and validation.
//!
//! This module implements the STOMP text protocol:
//! - Per-version rule table (escaping, NACK, mandatory keys)
//! - Ordered headers and header validation
//! - Frame encoding and an incremental frame buffer for decoding

mod frame;
mod frame_buffer;
mod headers;
mod validate;
mod version;

pub use frame::{build_frame, Command, Frame, CR, LF, NULL};
pub use frame_buffer::FrameBuffer;
pub use headers::{keys, Headers};
pub use validate::validate;
pub use version::{Escaping, Protocol, Rules, SUPPORTED_VERSIONS};
