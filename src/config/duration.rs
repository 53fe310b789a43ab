//! Duration arguments.

use std::time::Duration;

use anyhow::Context;

/// Parse durations like "500ms", "30s", "5m", "2h", "1d" or "300".
///
/// A bare number is a count of seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    // "ms" has to be checked before the single letter units
    let (value, unit_ms) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1_000)
    } else if let Some(num) = s.strip_suffix('m') {
        (num, 60_000)
    } else if let Some(num) = s.strip_suffix('h') {
        (num, 3_600_000)
    } else if let Some(num) = s.strip_suffix('d') {
        (num, 86_400_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration value: {s}"))?;
    let millis = value
        .checked_mul(unit_ms)
        .with_context(|| format!("Duration too large: {s}"))?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration(" 300 ").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("ten").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1w").is_err());
    }
}
