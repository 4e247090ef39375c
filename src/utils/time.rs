//! Timestamp helpers.

use crate::error::{constants, ProtocolError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn current_timestamp_millis() -> Result<i64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|_| ProtocolError::Custom(constants::ERR_SYSTEM_TIME.into()))
}

/// Whether an expiry expressed in epoch milliseconds has passed
pub fn is_expired(expires_at_millis: i64) -> bool {
    current_timestamp_millis()
        .map(|now| now >= expires_at_millis)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_expiry() {
        let now = current_timestamp_millis().unwrap();
        assert!(is_expired(now - 1));
        assert!(!is_expired(now + 60_000));
    }
}
