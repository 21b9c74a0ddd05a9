//! Ordered frame headers.
//!
//! Headers are stored flat (`key0, value0, key1, value1, ...`) exactly as the
//! caller supplied them, so a sequence with an odd number of entries can be
//! represented and rejected by the validator rather than silently paired.
//!
//! # Example
//!
//! ```
//! use stompwire::protocol::{keys, Headers};
//!
//! let h = Headers::new()
//!     .add(keys::DESTINATION, "/queue/a")
//!     .add("x-custom", "1");
//! assert_eq!(h.value(keys::DESTINATION), Some("/queue/a"));
//! assert_eq!(h.len(), 4);
//! ```

/// Well-known header keys.
pub mod keys {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const ACK: &str = "ack";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const HOST: &str = "host";
    pub const ID: &str = "id";
    pub const LOGIN: &str = "login";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message-id";
    pub const PASSCODE: &str = "passcode";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SERVER: &str = "server";
    pub const SESSION: &str = "session";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const SUPPRESS_CONTENT_LENGTH: &str = "suppress-content-length";
    pub const TRANSACTION: &str = "transaction";
    pub const VERSION: &str = "version";
}

/// Ordered sequence of header entries. Duplicate keys are allowed; lookups
/// return the first occurrence, which is the one STOMP says wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<String>);

impl Headers {
    /// Create empty headers.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from a flat entry list. The list is kept as-is, even if its
    /// length is odd.
    pub fn from_flat(entries: Vec<String>) -> Self {
        Self(entries)
    }

    /// Append a pair (builder style).
    pub fn add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Append a pair in place.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push(key.into());
        self.0.push(value.into());
    }

    /// Append all entries of `other`.
    pub fn extend_from(&mut self, other: &Headers) {
        self.0.extend_from_slice(&other.0);
    }

    /// Number of flat entries (twice the number of pairs when well formed).
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every key has a value.
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() % 2 == 0
    }

    /// Iterate over complete pairs in wire order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .chunks_exact(2)
            .map(|kv| (kv[0].as_str(), kv[1].as_str()))
    }

    /// Flat view of all entries.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// First value for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// First value for `key`, treating an empty value as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.value(key).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// Remove every pair with `key`.
    pub fn delete(&mut self, key: &str) {
        if !self.is_well_formed() {
            return;
        }
        let mut kept = Vec::with_capacity(self.0.len());
        for kv in self.0.chunks_exact(2) {
            if kv[0] != key {
                kept.extend_from_slice(kv);
            }
        }
        self.0 = kept;
    }
}

impl<const N: usize> From<[&str; N]> for Headers {
    fn from(entries: [&str; N]) -> Self {
        Self(entries.iter().map(|s| s.to_string()).collect())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.push(k, v);
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_duplicates_preserved() {
        let h = Headers::new().add("a", "1").add("b", "2").add("a", "3");
        let pairs: Vec<_> = h.pairs().collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "2"), ("a", "3")]);
        assert_eq!(h.value("a"), Some("1"));
    }

    #[test]
    fn test_odd_length_is_kept() {
        let h = Headers::from(["a", "b", "c"]);
        assert_eq!(h.len(), 3);
        assert!(!h.is_well_formed());
        assert_eq!(h.pairs().count(), 1);
    }

    #[test]
    fn test_delete() {
        let mut h = Headers::new().add("a", "1").add("b", "2").add("a", "3");
        h.delete("a");
        assert_eq!(h, Headers::new().add("b", "2"));
    }

    #[test]
    fn test_non_empty() {
        let h = Headers::new().add("id", "");
        assert!(h.contains("id"));
        assert_eq!(h.non_empty("id"), None);
    }

    #[test]
    fn test_from_iter() {
        let h: Headers = vec![("k", "v")].into_iter().collect();
        assert_eq!(h.value("k"), Some("v"));
    }
}
