//! Wall-clock helpers.
//!
//! Session timestamps are Unix milliseconds, matching what clients receive
//! in `updatedAt` and `timerStart`.

use chrono::Utc;

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Advance a stored timestamp to `now_ms`, never moving it backwards.
pub fn bump(previous: i64, now_ms: i64) -> i64 {
    now_ms.max(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_never_decreases() {
        let now = now_ms();
        assert_eq!(bump(now + 60_000, now), now + 60_000);
        assert_eq!(bump(0, now), now);
    }
}
