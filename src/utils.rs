use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Format a `Duration` with automatic unit scaling (`1.94ms`, `2.34s`).
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Log a warning if the elapsed time since `start` exceeds `threshold`.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
    }
}

/// Time elapsed since `ts`, clamped to zero for timestamps in the future.
pub fn age_of(ts: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - ts).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn age_of_clamps_future_timestamps() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let earlier = now - chrono::Duration::minutes(5);
        let later = now + chrono::Duration::minutes(5);
        assert_eq!(age_of(earlier, now), Duration::from_secs(300));
        assert_eq!(age_of(later, now), Duration::ZERO);
    }
}
