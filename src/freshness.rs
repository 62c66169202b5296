//! Staleness policy: when does the harvester count as offline.

use chrono::{DateTime, Duration, Utc};

/// Readings older than this declare the remote sensor system offline.
pub const STALENESS_THRESHOLD_MS: i64 = 120_000;

/// Wall-clock seam so staleness decisions are testable at a pinned instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Connected iff the newest reading is at most the threshold old.
/// The boundary itself counts as connected.
pub fn is_fresh(last_update: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(last_update) <= Duration::milliseconds(STALENESS_THRESHOLD_MS)
}

/// Link status derived from reading recency, not from fetch outcomes.
///
/// A failed poll never flips this to offline on its own; only elapsed time
/// since the last device-side timestamp does.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub last_update: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// Record a newly observed reading timestamp and re-evaluate.
    pub fn record_update(&mut self, timestamp: DateTime<Utc>, now: DateTime<Utc>) {
        self.last_update = Some(timestamp);
        self.is_connected = is_fresh(timestamp, now);
    }

    /// Periodic re-evaluation against the clock. With no reading observed yet
    /// the flag is left alone: initial load is not the same thing as offline.
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_update {
            self.is_connected = is_fresh(last, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn recent_reading_is_fresh() {
        assert!(is_fresh(at(0), at(60)));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        assert!(is_fresh(at(0), at(120)));
        assert!(!is_fresh(at(0), at(121)));
    }

    #[test]
    fn three_minute_old_reading_is_stale() {
        let mut state = ConnectionState::default();
        state.record_update(at(0), at(0));
        assert!(state.is_connected);

        state.refresh(at(180));
        assert!(!state.is_connected);
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        // Device clock slightly ahead of ours; do not flag offline for it.
        assert!(is_fresh(at(30), at(0)));
    }

    #[test]
    fn refresh_without_any_reading_leaves_state_alone() {
        let mut state = ConnectionState::default();
        state.refresh(at(1_000_000));
        assert!(!state.is_connected);
        assert_eq!(state.last_update, None);

        // And an initially-connected flag is also preserved until data shows up.
        let mut state = ConnectionState {
            is_connected: true,
            last_update: None,
        };
        state.refresh(at(1_000_000));
        assert!(state.is_connected);
    }
}
