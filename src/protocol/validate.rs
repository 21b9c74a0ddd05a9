//! Header validation.
//!
//! Every outbound operation runs through [`validate`] before anything is
//! encoded or written, so a rejected call never reaches the wire.

use super::frame::Command;
use super::headers::{keys, Headers};
use super::version::{Escaping, Protocol};
use crate::error::{Result, StompError};
use crate::util;

/// Validate the headers for one outbound `command` on `protocol`.
///
/// Checks, in order: presence, even entry count, encodability when the
/// frame is written unescaped, then the keys the command requires.
/// Returns the headers on success so callers can chain.
pub fn validate<'h>(
    command: Command,
    headers: Option<&'h Headers>,
    protocol: Protocol,
) -> Result<&'h Headers> {
    let headers = headers.ok_or(StompError::HeadersNil)?;
    if !headers.is_well_formed() {
        return Err(StompError::HeadersMalformed);
    }

    let rules = protocol.rules();
    if !command.escapes_headers() || rules.escaping == Escaping::None {
        check_unescaped(headers)?;
    }

    match command {
        Command::Connect | Command::Stomp => check_connect(headers)?,
        Command::Send => require(headers, keys::DESTINATION)?,
        Command::Subscribe => {
            require(headers, keys::DESTINATION)?;
            if let Some(mode) = headers.value(keys::ACK) {
                if !util::has_value(rules.ack_modes, mode) {
                    return Err(StompError::InvalidAckMode(mode.to_string()));
                }
            }
        }
        Command::Unsubscribe => {
            if rules.unsubscribe_by_destination {
                if headers.non_empty(keys::ID).is_none() {
                    require(headers, keys::DESTINATION)?;
                }
            } else {
                require(headers, keys::ID)?;
            }
        }
        Command::Ack | Command::Nack => {
            if command == Command::Nack && !rules.nack {
                return Err(StompError::UnsupportedOperation {
                    operation: "NACK",
                    protocol: protocol.as_str(),
                });
            }
            for key in rules.ack_keys {
                require(headers, *key)?;
            }
        }
        Command::Begin | Command::Commit | Command::Abort => {
            require(headers, keys::TRANSACTION)?
        }
        _ => {}
    }
    Ok(headers)
}

fn require(headers: &Headers, key: &'static str) -> Result<()> {
    headers
        .non_empty(key)
        .map(|_| ())
        .ok_or(StompError::MissingHeader(key))
}

fn check_connect(headers: &Headers) -> Result<()> {
    let versions = Protocol::parse_accept_version(headers.value(keys::ACCEPT_VERSION))?;
    if versions.iter().any(|v| *v > Protocol::V1_0) {
        require(headers, keys::HOST)?;
    }
    Ok(())
}

fn check_unescaped(headers: &Headers) -> Result<()> {
    for (key, value) in headers.pairs() {
        if key.contains(['\n', ':']) {
            return Err(StompError::HeadersUnencodable(key.to_string()));
        }
        if value.contains('\n') {
            return Err(StompError::HeadersUnencodable(value.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MUTATING: [Command; 9] = [
        Command::Abort,
        Command::Ack,
        Command::Begin,
        Command::Commit,
        Command::Disconnect,
        Command::Nack,
        Command::Send,
        Command::Subscribe,
        Command::Unsubscribe,
    ];

    #[test]
    fn test_nil_headers_rejected_everywhere() {
        for p in Protocol::ALL {
            for cmd in MUTATING.iter().copied().chain([Command::Connect]) {
                assert!(matches!(validate(cmd, None, p), Err(StompError::HeadersNil)));
            }
        }
    }

    #[test]
    fn test_odd_headers_rejected_everywhere() {
        let odd = Headers::from(["a", "b", "c"]);
        for p in Protocol::ALL {
            for cmd in MUTATING.iter().copied().chain([Command::Connect]) {
                assert!(matches!(
                    validate(cmd, Some(&odd), p),
                    Err(StompError::HeadersMalformed)
                ));
            }
        }
    }

    #[test]
    fn test_send_requires_destination() {
        let h = Headers::new();
        assert!(matches!(
            validate(Command::Send, Some(&h), Protocol::V1_2),
            Err(StompError::MissingHeader("destination"))
        ));
        let h = h.add("destination", "/queue/a");
        assert!(validate(Command::Send, Some(&h), Protocol::V1_2).is_ok());
    }

    #[test]
    fn test_disconnect_accepts_empty() {
        for p in Protocol::ALL {
            assert!(validate(Command::Disconnect, Some(&Headers::new()), p).is_ok());
        }
    }

    #[test]
    fn test_connect_versions() {
        let bad = Headers::from(["host", "localhost", "accept-version", "3.14159"]);
        assert!(matches!(
            validate(Command::Connect, Some(&bad), Protocol::V1_0),
            Err(StompError::UnsupportedVersion)
        ));

        let no_host = Headers::from(["accept-version", "1.1"]);
        assert!(matches!(
            validate(Command::Connect, Some(&no_host), Protocol::V1_0),
            Err(StompError::MissingHeader("host"))
        ));

        assert!(validate(Command::Connect, Some(&Headers::new()), Protocol::V1_0).is_ok());
    }

    #[test]
    fn test_ack_keys_per_version() {
        let v10 = Headers::from(["message-id", "m1"]);
        let v11 = Headers::from(["message-id", "m1", "subscription", "s1"]);
        let v12 = Headers::from(["id", "a1"]);

        assert!(validate(Command::Ack, Some(&v10), Protocol::V1_0).is_ok());
        assert!(matches!(
            validate(Command::Ack, Some(&v10), Protocol::V1_1),
            Err(StompError::MissingHeader("subscription"))
        ));
        assert!(validate(Command::Ack, Some(&v11), Protocol::V1_1).is_ok());
        assert!(matches!(
            validate(Command::Ack, Some(&v11), Protocol::V1_2),
            Err(StompError::MissingHeader("id"))
        ));
        assert!(validate(Command::Ack, Some(&v12), Protocol::V1_2).is_ok());
    }

    #[test]
    fn test_nack_unsupported_on_1_0() {
        let h = Headers::from(["message-id", "m1"]);
        assert!(matches!(
            validate(Command::Nack, Some(&h), Protocol::V1_0),
            Err(StompError::UnsupportedOperation { .. })
        ));
        let h = Headers::from(["id", "a1"]);
        assert!(validate(Command::Nack, Some(&h), Protocol::V1_2).is_ok());
    }

    #[test]
    fn test_unsubscribe_keys() {
        let by_dest = Headers::from(["destination", "/queue/a"]);
        assert!(validate(Command::Unsubscribe, Some(&by_dest), Protocol::V1_0).is_ok());
        assert!(matches!(
            validate(Command::Unsubscribe, Some(&by_dest), Protocol::V1_1),
            Err(StompError::MissingHeader("id"))
        ));
        assert!(matches!(
            validate(Command::Unsubscribe, Some(&Headers::new()), Protocol::V1_0),
            Err(StompError::MissingHeader("destination"))
        ));
    }

    #[test]
    fn test_transaction_required() {
        for cmd in [Command::Begin, Command::Commit, Command::Abort] {
            assert!(matches!(
                validate(cmd, Some(&Headers::new()), Protocol::V1_1),
                Err(StompError::MissingHeader("transaction"))
            ));
        }
    }

    #[test]
    fn test_ack_mode() {
        let h = Headers::from(["destination", "/q", "ack", "client-individual"]);
        assert!(matches!(
            validate(Command::Subscribe, Some(&h), Protocol::V1_0),
            Err(StompError::InvalidAckMode(_))
        ));
        assert!(validate(Command::Subscribe, Some(&h), Protocol::V1_1).is_ok());
    }

    #[test]
    fn test_unencodable_on_1_0() {
        let h = Headers::from(["destination", "/q", "note", "a\nb"]);
        assert!(matches!(
            validate(Command::Send, Some(&h), Protocol::V1_0),
            Err(StompError::HeadersUnencodable(_))
        ));
        assert!(validate(Command::Send, Some(&h), Protocol::V1_1).is_ok());
    }
}
