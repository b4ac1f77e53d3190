use std::time::{SystemTime, UNIX_EPOCH};

/// Unix time in whole seconds.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// True once strictly more than `window` seconds separate `since` from `now`.
pub fn is_expired(since: i64, window: i64, now: i64) -> bool {
    now - since > window
}

/// True once `now` has reached `deadline`.
pub fn deadline_reached(deadline: i64, now: i64) -> bool {
    now >= deadline
}
