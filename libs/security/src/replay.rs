//! Freshness checks for webhook timestamps.

use time::OffsetDateTime;

pub const DEFAULT_MAX_AGE_SECS: u64 = 300;

/// A delivery timestamp as it arrives: header text or an already numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp<'a> {
    Text(&'a str),
    Seconds(i64),
}

impl<'a> From<&'a str> for Timestamp<'a> {
    fn from(value: &'a str) -> Self {
        Timestamp::Text(value)
    }
}

impl From<i64> for Timestamp<'_> {
    fn from(value: i64) -> Self {
        Timestamp::Seconds(value)
    }
}

impl Timestamp<'_> {
    pub fn unix_seconds(&self) -> Option<i64> {
        match self {
            Timestamp::Seconds(secs) => Some(*secs),
            Timestamp::Text(raw) => raw.trim().parse::<i64>().ok(),
        }
    }
}

/// True when `timestamp` is within `max_age_secs` of the current time, in
/// either direction.
pub fn verify_timestamp<'a>(timestamp: impl Into<Timestamp<'a>>, max_age_secs: u64) -> bool {
    verify_timestamp_at(
        timestamp,
        max_age_secs,
        OffsetDateTime::now_utc().unix_timestamp(),
    )
}

pub fn verify_timestamp_at<'a>(
    timestamp: impl Into<Timestamp<'a>>,
    max_age_secs: u64,
    now_secs: i64,
) -> bool {
    let Some(sent) = timestamp.into().unix_seconds() else {
        return false;
    };
    let skew = i128::from(now_secs) - i128::from(sent);
    skew.unsigned_abs() <= u128::from(max_age_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000;

    #[test]
    fn boundary_is_inclusive() {
        assert!(verify_timestamp_at(NOW - 300, 300, NOW));
        assert!(verify_timestamp_at(NOW + 300, 300, NOW));
        assert!(!verify_timestamp_at(NOW - 301, 300, NOW));
        assert!(!verify_timestamp_at(NOW + 301, 300, NOW));
    }

    #[test]
    fn text_timestamps_are_parsed() {
        let fresh = (NOW - 10).to_string();
        assert!(verify_timestamp_at(fresh.as_str(), 300, NOW));
        assert!(verify_timestamp_at(" 1750000000 ", 300, NOW));
    }

    #[test]
    fn unparsable_timestamps_fail() {
        assert!(!verify_timestamp_at("", 300, NOW));
        assert!(!verify_timestamp_at("yesterday", 300, NOW));
        assert!(!verify_timestamp_at("17500000.5", 300, NOW));
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        assert!(!verify_timestamp_at(i64::MIN, 300, NOW));
        assert!(!verify_timestamp_at(i64::MAX, 300, NOW));
    }

    #[test]
    fn uses_wall_clock_by_default() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        assert!(verify_timestamp(now, DEFAULT_MAX_AGE_SECS));
        assert!(!verify_timestamp(now - 3_600, DEFAULT_MAX_AGE_SECS));
    }
}
