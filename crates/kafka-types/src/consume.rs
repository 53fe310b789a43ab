//! Start positions and value formats selectable for a consumption session.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::error::KafkaTypesError;

/// Where a consumption session starts reading each partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumeFrom {
    /// Low watermark of every partition ("earliest")
    Beginning,
    /// High watermark of every partition ("latest"), only new records
    #[default]
    Now,
    LastHour,
    LastDay,
    LastWeek,
    /// The last N records of every partition
    LastRecords(u64),
    /// First record whose timestamp is at or after the instant
    Since(DateTime<Utc>),
}

impl ConsumeFrom {
    /// Timestamp the session should seek to, for time-based positions.
    ///
    /// Relative windows are resolved against `now` so the same session always
    /// uses a single instant for every partition.
    pub fn start_timestamp(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::LastHour => Some(now - Duration::hours(1)),
            Self::LastDay => Some(now - Duration::days(1)),
            Self::LastWeek => Some(now - Duration::weeks(1)),
            Self::Since(ts) => Some(*ts),
            Self::Beginning | Self::Now | Self::LastRecords(_) => None,
        }
    }
}

impl fmt::Display for ConsumeFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginning => write!(f, "beginning"),
            Self::Now => write!(f, "now"),
            Self::LastHour => write!(f, "last-hour"),
            Self::LastDay => write!(f, "last-day"),
            Self::LastWeek => write!(f, "last-week"),
            Self::LastRecords(n) => write!(f, "last:{n}"),
            Self::Since(ts) => write!(f, "since:{}", ts.to_rfc3339()),
        }
    }
}

impl FromStr for ConsumeFrom {
    type Err = KafkaTypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || KafkaTypesError::InvalidStartPosition(s.to_string());

        if let Some(count) = s.strip_prefix("last:") {
            let n = count.trim().parse::<u64>().map_err(|_| invalid())?;
            return Ok(Self::LastRecords(n));
        }
        if let Some(ts) = s.strip_prefix("since:") {
            let ts = DateTime::parse_from_rfc3339(ts.trim()).map_err(|_| invalid())?;
            return Ok(Self::Since(ts.with_timezone(&Utc)));
        }

        match s.to_ascii_lowercase().as_str() {
            "beginning" | "earliest" => Ok(Self::Beginning),
            "now" | "latest" => Ok(Self::Now),
            "last-hour" | "lasthour" => Ok(Self::LastHour),
            "last-day" | "lastday" => Ok(Self::LastDay),
            "last-week" | "lastweek" => Ok(Self::LastWeek),
            _ => Err(invalid()),
        }
    }
}

/// How record values are turned into display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeserializationFormat {
    /// Base64 of the raw bytes
    Raw,
    /// Strict UTF-8
    #[default]
    String,
    /// Confluent-framed Avro resolved through the schema registry
    Avro,
}

impl DeserializationFormat {
    pub fn requires_schema_registry(&self) -> bool {
        matches!(self, Self::Avro)
    }
}

impl fmt::Display for DeserializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::String => write!(f, "string"),
            Self::Avro => write!(f, "avro"),
        }
    }
}

impl FromStr for DeserializationFormat {
    type Err = KafkaTypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "bytes" => Ok(Self::Raw),
            "string" => Ok(Self::String),
            "avro" => Ok(Self::Avro),
            _ => Err(KafkaTypesError::InvalidFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_named_positions() {
        assert_eq!("earliest".parse(), Ok(ConsumeFrom::Beginning));
        assert_eq!("Beginning".parse(), Ok(ConsumeFrom::Beginning));
        assert_eq!("latest".parse(), Ok(ConsumeFrom::Now));
        assert_eq!("last-day".parse(), Ok(ConsumeFrom::LastDay));
        assert_eq!("LastWeek".parse(), Ok(ConsumeFrom::LastWeek));
    }

    #[test]
    fn test_parse_last_records() {
        assert_eq!("last:25".parse(), Ok(ConsumeFrom::LastRecords(25)));
        assert!("last:-1".parse::<ConsumeFrom>().is_err());
        assert!("last:".parse::<ConsumeFrom>().is_err());
    }

    #[test]
    fn test_parse_since_timestamp() {
        let parsed: ConsumeFrom = "since:2024-01-01T10:00:00+02:00".parse().unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(parsed, ConsumeFrom::Since(expected));
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        for from in [
            ConsumeFrom::Beginning,
            ConsumeFrom::Now,
            ConsumeFrom::LastHour,
            ConsumeFrom::LastRecords(3),
            ConsumeFrom::Since(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()),
        ] {
            assert_eq!(from.to_string().parse(), Ok(from));
        }
    }

    #[test]
    fn test_start_timestamp_resolves_relative_windows() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            ConsumeFrom::LastHour.start_timestamp(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 11, 0, 0).unwrap())
        );
        assert_eq!(
            ConsumeFrom::LastWeek.start_timestamp(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap())
        );
        assert_eq!(ConsumeFrom::Beginning.start_timestamp(now), None);
        assert_eq!(ConsumeFrom::LastRecords(10).start_timestamp(now), None);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("AVRO".parse(), Ok(DeserializationFormat::Avro));
        assert_eq!("string".parse(), Ok(DeserializationFormat::String));
        assert_eq!("raw".parse(), Ok(DeserializationFormat::Raw));
        assert!("json".parse::<DeserializationFormat>().is_err());
        assert!(DeserializationFormat::Avro.requires_schema_registry());
        assert!(!DeserializationFormat::Raw.requires_schema_registry());
    }
}
