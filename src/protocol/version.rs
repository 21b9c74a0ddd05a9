//! Protocol versions and the per-version rule table.
//!
//! Everything that differs between STOMP 1.0, 1.1 and 1.2 (header escaping,
//! NACK, which headers identify an acknowledged message, heartbeats) is read
//! from [`Rules`] so the codec and validator never branch on the version
//! directly.

use std::fmt;
use std::str::FromStr;

use crate::error::StompError;

/// Version strings this engine implements, lowest first.
pub const SUPPORTED_VERSIONS: [&str; 3] = ["1.0", "1.1", "1.2"];

/// A negotiated STOMP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    V1_0,
    V1_1,
    V1_2,
}

/// How header tokens are escaped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escaping {
    /// Tokens are written verbatim (1.0).
    None,
    /// `\\`, `\n` and `\c` (1.1).
    Standard,
    /// Standard plus `\r` (1.2).
    WithCarriageReturn,
}

/// Version-dependent behavior.
#[derive(Debug)]
pub struct Rules {
    /// Header escaping applied by the codec.
    pub escaping: Escaping,
    /// Whether the NACK frame exists.
    pub nack: bool,
    /// Headers that must be present on ACK (and NACK).
    pub ack_keys: &'static [&'static str],
    /// UNSUBSCRIBE may name a destination instead of an id.
    pub unsubscribe_by_destination: bool,
    /// Valid values of the SUBSCRIBE `ack` header.
    pub ack_modes: &'static [&'static str],
    /// Heartbeats may be negotiated.
    pub heartbeats: bool,
    /// Broker closes the connection after every ERROR frame.
    pub error_is_fatal: bool,
    /// Lines may end in CRLF instead of LF.
    pub crlf: bool,
}

static RULES: [Rules; 3] = [
    Rules {
        escaping: Escaping::None,
        nack: false,
        ack_keys: &["message-id"],
        unsubscribe_by_destination: true,
        ack_modes: &["auto", "client"],
        heartbeats: false,
        error_is_fatal: false,
        crlf: false,
    },
    Rules {
        escaping: Escaping::Standard,
        nack: true,
        ack_keys: &["message-id", "subscription"],
        unsubscribe_by_destination: false,
        ack_modes: &["auto", "client", "client-individual"],
        heartbeats: true,
        error_is_fatal: true,
        crlf: false,
    },
    Rules {
        escaping: Escaping::WithCarriageReturn,
        nack: true,
        ack_keys: &["id"],
        unsubscribe_by_destination: false,
        ack_modes: &["auto", "client", "client-individual"],
        heartbeats: true,
        error_is_fatal: true,
        crlf: true,
    },
];

impl Protocol {
    /// All supported versions, lowest first.
    pub const ALL: [Protocol; 3] = [Protocol::V1_0, Protocol::V1_1, Protocol::V1_2];

    /// Wire representation, e.g. `"1.1"`.
    pub fn as_str(self) -> &'static str {
        SUPPORTED_VERSIONS[self as usize]
    }

    /// Rule table entry for this version.
    #[inline]
    pub fn rules(self) -> &'static Rules {
        &RULES[self as usize]
    }

    /// Parse the `accept-version` header of a CONNECT frame.
    ///
    /// Returns every requested version. An absent or empty header means 1.0.
    pub fn parse_accept_version(value: Option<&str>) -> Result<Vec<Protocol>, StompError> {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return Ok(vec![Protocol::V1_0]);
        };
        value
            .split(',')
            .map(|v| v.trim().parse::<Protocol>())
            .collect()
    }
}

impl FromStr for Protocol {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(Protocol::V1_0),
            "1.1" => Ok(Protocol::V1_1),
            "1.2" => Ok(Protocol::V1_2),
            _ => Err(StompError::UnsupportedVersion),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
