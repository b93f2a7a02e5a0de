use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::error::{CoreError, Result};

/// A point in time as stored by AuthDB.
///
/// Wraps [`OffsetDateTime`]; rendered as RFC 3339 at the boundary and
/// comparable/hashable so records can be ordered and deduplicated by time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub OffsetDateTime);

impl Timestamp {
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(datetime)
    }

    pub fn inner(&self) -> &OffsetDateTime {
        &self.0
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// Milliseconds since the Unix epoch.
    pub fn unix_millis(&self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for Timestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let datetime = OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
            .map_err(|e| {
                CoreError::invalid_timestamp(format!("failed to parse timestamp '{s}': {e}"))
            })?;
        Ok(Timestamp(datetime))
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timestamp::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The current time as a [`Timestamp`].
pub fn now_utc() -> Timestamp {
    Timestamp(OffsetDateTime::now_utc())
}

/// Builds a [`Timestamp`] from milliseconds since the Unix epoch.
pub fn from_unix_millis(millis: i64) -> Result<Timestamp> {
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|e| CoreError::invalid_timestamp(format!("invalid Unix millis {millis}: {e}")))?;
    Ok(Timestamp(datetime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::new(datetime!(2024-03-01 08:15:00 UTC));
        assert_eq!(ts.to_string(), "2024-03-01T08:15:00Z");
    }

    #[test]
    fn test_timestamp_from_str() {
        let ts = Timestamp::from_str("2024-03-01T08:15:00Z").unwrap();
        assert_eq!(ts.0, datetime!(2024-03-01 08:15:00 UTC));
    }

    #[test]
    fn test_timestamp_from_str_with_offset() {
        let ts = Timestamp::from_str("2024-03-01T08:15:00+02:00").unwrap();
        assert_eq!(
            ts.0.to_offset(time::UtcOffset::UTC),
            datetime!(2024-03-01 06:15:00 UTC)
        );
    }

    #[test]
    fn test_timestamp_from_str_invalid() {
        assert!(Timestamp::from_str("not-a-time").is_err());
        assert!(Timestamp::from_str("2024-13-01T00:00:00Z").is_err());
        assert!(Timestamp::from_str("").is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let ts = Timestamp::new(datetime!(2024-03-01 08:15:00 UTC));
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-03-01T08:15:00Z\"");

        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_unix_millis_round_trip() {
        let ts = Timestamp::new(datetime!(2024-03-01 08:15:00.25 UTC));
        let millis = ts.unix_millis();
        assert_eq!(from_unix_millis(millis).unwrap(), ts);
    }

    #[test]
    fn test_from_unix_millis_invalid() {
        assert!(from_unix_millis(i64::MAX).is_err());
    }

    #[test]
    fn test_ordering() {
        let earlier = Timestamp::new(datetime!(2024-03-01 08:15:00 UTC));
        let later = Timestamp::new(datetime!(2024-03-01 08:15:01 UTC));
        assert!(earlier < later);
    }

    #[test]
    fn test_now_utc_is_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        assert!(b >= a);
    }
}
