use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use super::error::{DomainError, DomainResult};

/// Parses an ISO-8601 timestamp.
///
/// Offsets are honoured when present; a bare `YYYY-MM-DDTHH:MM:SS[.fff]` value is read as UTC,
/// which is how the history service stores its `createdAt` fields.
pub fn parse_timestamp(raw: &str) -> DomainResult<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| DomainError::InvalidTimestamp {
            stage: "parse-timestamp",
            raw: trimmed.to_string(),
        })
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for `DateTime<Utc>` fields carried as ISO-8601 strings.
pub mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn offsetless_timestamps_are_read_as_utc() {
        let parsed = parse_timestamp("2024-05-01T12:30:00.123456").unwrap();
        assert_eq!(parsed.hour(), 12);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn offsets_are_normalized() {
        let parsed = parse_timestamp("2024-05-01T01:00:00+02:00").unwrap();
        assert_eq!(parsed.day(), 30);
        assert_eq!(parsed.hour(), 23);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn formatting_uses_zulu_millis() {
        let parsed = parse_timestamp("2024-05-01T12:30:00Z").unwrap();
        assert_eq!(format_timestamp(&parsed), "2024-05-01T12:30:00.000Z");
    }
}
