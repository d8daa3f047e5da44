//! Timestamp codec shared by storage and wire adapters.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Formats a timestamp as fixed-width RFC 3339 UTC with nanosecond precision.
///
/// The value round-trips through `parse_timestamp` unchanged, and
/// lexicographic order of the output equals chronological order, which the
/// store relies on for `start_time <= ?` and `timestamp < ?` comparisons.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses an ISO-8601 timestamp.
///
/// Values with an explicit offset are converted to UTC. Naive values are read
/// in the device-local zone, the way the sensor shim stamps readings.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS.iter().find_map(|format| {
        let naive = NaiveDateTime::parse_from_str(trimmed, format).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn format_is_fixed_width_and_sortable() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap();
        let late = early + Duration::nanoseconds(1_500);

        let early_text = format_timestamp(early);
        let late_text = format_timestamp(late);
        assert_eq!(early_text, "2024-03-01T09:05:00.000000000Z");
        assert_eq!(late_text, "2024-03-01T09:05:00.000001500Z");
        assert_eq!(early_text.len(), late_text.len());
        assert!(early_text < late_text);
    }

    #[test]
    fn sub_millisecond_values_round_trip() {
        let value = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap()
            + Duration::nanoseconds(123_456_789);

        assert_eq!(parse_timestamp(&format_timestamp(value)), Some(value));
    }

    #[test]
    fn parse_converts_offsets_to_utc() {
        let parsed = parse_timestamp("2024-03-01T11:05:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap());
    }

    #[test]
    fn parse_accepts_naive_local_values() {
        assert!(parse_timestamp("2024-03-01T09:05:00.123456").is_some());
        assert!(parse_timestamp("2024-03-01 09:05:00").is_some());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
