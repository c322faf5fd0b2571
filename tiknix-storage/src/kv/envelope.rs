//! On-disk value layout shared by the store backends.
//!
//! Format: `[expires_at millis: i64 LE, 8 bytes][payload]`. An `expires_at`
//! of zero means the entry never expires.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tiknix_core::StorageError;

pub(crate) const HEADER_LEN: usize = 8;

/// Outcome of decoding a stored value at a given instant.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoded<'a> {
    Live(&'a [u8]),
    Expired,
    Corrupt,
}

/// Absolute expiry in millis for a TTL measured from `now`, or 0 for none.
pub(crate) fn expiry_millis(ttl: Option<Duration>, now: DateTime<Utc>) -> i64 {
    match ttl {
        Some(ttl) if !ttl.is_zero() => {
            let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now.timestamp_millis().saturating_add(ttl_millis)
        }
        _ => 0,
    }
}

pub(crate) fn encode(payload: &[u8], ttl: Option<Duration>, now: DateTime<Utc>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&expiry_millis(ttl, now).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub(crate) fn decode(bytes: &[u8], now: DateTime<Utc>) -> Decoded<'_> {
    if bytes.len() < HEADER_LEN {
        return Decoded::Corrupt;
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&bytes[..HEADER_LEN]);
    let expires_at = i64::from_le_bytes(header);

    if expires_at != 0 && now.timestamp_millis() >= expires_at {
        Decoded::Expired
    } else {
        Decoded::Live(&bytes[HEADER_LEN..])
    }
}

/// Parse a counter payload (decimal ASCII).
pub(crate) fn parse_counter(key: &str, payload: &[u8]) -> Result<i64, StorageError> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| StorageError::NotACounter {
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ttl_never_expires() {
        let now = Utc::now();
        let bytes = encode(b"payload", None, now);
        let far_future = now + chrono::Duration::days(3650);
        assert_eq!(decode(&bytes, far_future), Decoded::Live(b"payload"));
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        assert_eq!(expiry_millis(Some(Duration::ZERO), Utc::now()), 0);
    }

    #[test]
    fn test_expires_at_deadline() {
        let now = Utc::now();
        let bytes = encode(b"v", Some(Duration::from_secs(60)), now);

        assert_eq!(decode(&bytes, now + chrono::Duration::seconds(59)), Decoded::Live(b"v"));
        assert_eq!(decode(&bytes, now + chrono::Duration::seconds(60)), Decoded::Expired);
    }

    #[test]
    fn test_short_value_is_corrupt() {
        assert_eq!(decode(&[1, 2, 3], Utc::now()), Decoded::Corrupt);
    }

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter("k", b"42").unwrap(), 42);
        assert_eq!(parse_counter("k", b"-3").unwrap(), -3);
        assert!(matches!(
            parse_counter("k", b"{\"a\":1}"),
            Err(StorageError::NotACounter { .. })
        ));
    }
}
