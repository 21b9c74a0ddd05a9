//! Error types for stompwire.

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::Frame;

/// Main error type for all STOMP operations.
///
/// The variants are fixed and shared by every component. The type is `Clone`
/// so that one terminal transport failure can be handed to every open
/// delivery queue.
#[derive(Debug, Clone, Error)]
pub enum StompError {
    /// No headers were supplied.
    #[error("headers can not be nil")]
    HeadersNil,

    /// Header sequence has an odd number of entries.
    #[error("unmatched headers, bad length")]
    HeadersMalformed,

    /// A header token can not be represented on the negotiated protocol.
    #[error("header can not be encoded for protocol 1.0: {0:?}")]
    HeadersUnencodable(String),

    /// The client asked for a protocol version this engine does not implement.
    #[error("unsupported protocol version requested by client")]
    UnsupportedVersion,

    /// The broker answered with a version the client did not offer.
    #[error("unsupported protocol version returned by server: {0}")]
    UnsupportedServerVersion(String),

    /// The operation does not exist on the negotiated protocol version.
    #[error("{operation} is not supported by protocol {protocol}")]
    UnsupportedOperation {
        operation: &'static str,
        protocol: &'static str,
    },

    /// An operation-mandatory header is absent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// SUBSCRIBE carried an ack mode the protocol does not define.
    #[error("invalid ack mode: {0}")]
    InvalidAckMode(String),

    /// The heart-beat header could not be parsed.
    #[error("invalid heart-beat header: {0:?}")]
    InvalidHeartBeat(String),

    /// Subscription id is already active on this connection.
    #[error("duplicate subscription id: {0}")]
    DuplicateSubscription(String),

    /// Subscription id (or destination) is not active on this connection.
    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),

    /// BEGIN for a transaction that is still open.
    #[error("transaction already open: {0}")]
    TransactionOpen(String),

    /// COMMIT or ABORT for a transaction that is not open.
    #[error("transaction not open: {0}")]
    TransactionNotOpen(String),

    /// The broker answered CONNECT with an ERROR frame.
    #[error("broker rejected CONNECT: {message}")]
    ConnectRejected { message: String, frame: Box<Frame> },

    /// The broker sent an ERROR frame after the handshake.
    #[error("broker error: {0}")]
    BrokerError(String),

    /// Operation requires a connected connection.
    #[error("not connected")]
    NotConnected,

    /// Transport closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// DISCONNECT receipt did not arrive in time.
    #[error("timed out waiting for receipt {0}")]
    ReceiptTimeout(String),

    /// Malformed frame on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for StompError {
    fn from(e: std::io::Error) -> Self {
        StompError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for StompError {
    fn from(e: serde_json::Error) -> Self {
        StompError::Config(e.to_string())
    }
}

/// Result type alias using StompError.
pub type Result<T> = std::result::Result<T, StompError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_is_cloneable() {
        let err: StompError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        let copy = err.clone();
        assert!(matches!(copy, StompError::Io(_)));
        assert!(copy.to_string().contains("gone"));
    }

    #[test]
    fn test_display_names_missing_header() {
        let err = StompError::MissingHeader("destination");
        assert_eq!(err.to_string(), "missing required header: destination");
    }
}
