//! Time utilities and constants for rate freshness.

use chrono::{DateTime, Duration, Utc};

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Snapshot time-to-live (30 minutes).
    pub fn rate_ttl() -> Duration {
        Duration::minutes(30)
    }

    /// Upstream fetch timeout (10 seconds).
    pub fn fetch_timeout() -> Duration {
        Duration::seconds(10)
    }
}

/// A timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether something fetched at `fetched_at` has outlived `ttl` at `now`.
///
/// The boundary itself is still fresh: expiry requires the age to strictly
/// exceed the TTL.
pub fn is_older_than(fetched_at: Timestamp, ttl: Duration, now: Timestamp) -> bool {
    now.signed_duration_since(fetched_at) > ttl
}

/// Duration extensions for convenient conversion.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_older_than() {
        let t = now();
        let ttl = constants::rate_ttl();

        assert!(!is_older_than(t, ttl, t + Duration::minutes(10)));
        assert!(!is_older_than(t, ttl, t + ttl));
        assert!(is_older_than(t, ttl, t + ttl + Duration::seconds(1)));
    }

    #[test]
    fn test_negative_duration_as_std() {
        assert_eq!(Duration::seconds(-5).as_std(), std::time::Duration::ZERO);
        assert_eq!(
            constants::fetch_timeout().as_std(),
            std::time::Duration::from_secs(10)
        );
    }
}
