//! Timestamp normalization.
//!
//! Stored metadata carries `lastModified` either in seconds or in
//! milliseconds depending on which client version wrote it. The
//! heuristic: interpret the value as seconds; if that would place the
//! date past the year 2100, it must already be milliseconds. This must
//! stay bit-for-bit compatible with existing ciphertext, so the cutoff
//! is fixed.

use std::time::{SystemTime, UNIX_EPOCH};

/// Unix seconds for 2100-01-01T00:00:00Z.
const YEAR_2100_UNIX_SECS: u64 = 4_102_444_800;

/// Normalize a raw `lastModified` value to milliseconds since epoch.
pub fn convert_timestamp_to_ms(timestamp: u64) -> u64 {
    if timestamp > YEAR_2100_UNIX_SECS {
        timestamp
    } else {
        timestamp * 1000
    }
}

/// Current Unix time in seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current Unix time in milliseconds.
pub fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_are_scaled_to_ms() {
        assert_eq!(convert_timestamp_to_ms(1_700_000_000), 1_700_000_000_000);
    }

    #[test]
    fn ms_values_pass_through() {
        assert_eq!(convert_timestamp_to_ms(1_700_000_000_000), 1_700_000_000_000);
    }

    #[test]
    fn cutoff_boundary() {
        // Exactly at the cutoff still counts as seconds.
        assert_eq!(
            convert_timestamp_to_ms(YEAR_2100_UNIX_SECS),
            YEAR_2100_UNIX_SECS * 1000
        );
        assert_eq!(
            convert_timestamp_to_ms(YEAR_2100_UNIX_SECS + 1),
            YEAR_2100_UNIX_SECS + 1
        );
    }

    #[test]
    fn zero_stays_zero() {
        assert_eq!(convert_timestamp_to_ms(0), 0);
    }
}
