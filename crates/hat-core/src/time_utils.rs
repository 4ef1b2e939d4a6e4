use std::time::{SystemTime, UNIX_EPOCH};

/// Converts a wall-clock time to Unix milliseconds, clamping pre-epoch values to zero.
pub fn system_time_to_unix_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
