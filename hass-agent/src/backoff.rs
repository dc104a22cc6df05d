//! Cooldown after a remote rate-limit signal

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Earliest time the next remote call is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backoff {
    next_allowed: Option<DateTime<Utc>>,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress calls until `now + delay`.
    pub fn defer(&mut self, now: DateTime<Utc>, delay: Duration) {
        let next = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay));
        self.next_allowed = Some(next.unwrap_or(DateTime::<Utc>::MAX_UTC));
    }

    /// Whether calls are still suppressed at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.next_allowed, Some(next) if now < next)
    }

    pub fn next_allowed(&self) -> Option<DateTime<Utc>> {
        self.next_allowed
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
    fn test_no_restriction_by_default() {
        let backoff = Backoff::new();
        assert!(!backoff.is_active(at(0)));
        assert!(backoff.next_allowed().is_none());
    }

    #[test]
    fn test_cycles_inside_window_are_skipped() {
        let mut backoff = Backoff::new();
        backoff.defer(at(0), Duration::from_millis(30_000));

        assert!(backoff.is_active(at(5)));
        assert!(backoff.is_active(at(25)));
        assert!(!backoff.is_active(at(31)));
        assert_eq!(backoff.next_allowed(), Some(at(30)));
    }

    #[test]
    fn test_window_end_is_exclusive() {
        let mut backoff = Backoff::new();
        backoff.defer(at(0), Duration::from_secs(30));
        assert!(!backoff.is_active(at(30)));
    }

    #[test]
    fn test_later_signal_replaces_earlier() {
        let mut backoff = Backoff::new();
        backoff.defer(at(0), Duration::from_secs(60));
        backoff.defer(at(10), Duration::from_secs(5));
        assert!(!backoff.is_active(at(16)));
    }
}
