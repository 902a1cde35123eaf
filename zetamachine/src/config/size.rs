//! Human-readable size and duration values (e.g. "1MB", "24h").

use std::time::Duration;
use thiserror::Error;

/// Error parsing a size or duration string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitParseError {
    #[error("Invalid size '{0}' - expected format like '1MB', '512KB', or '4096'")]
    Size(String),

    #[error("Invalid duration '{0}' - expected format like '30s', '10m', '24h', or '500ms'")]
    Duration(String),
}

/// Splits `"12 KB"` into `(12, "kb")`.
fn split_number(s: &str) -> Option<(u64, String)> {
    let s = s.trim();
    let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if digits == 0 {
        return None;
    }
    let number = s[..digits].parse().ok()?;
    Some((number, s[digits..].trim().to_ascii_lowercase()))
}

/// Parses a byte count with an optional binary suffix (K/KB, M/MB, G/GB).
///
/// ```
/// use zetamachine::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("1MB").unwrap(), 1024 * 1024);
/// assert_eq!(parse_size("512 kb").unwrap(), 512 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<usize, UnitParseError> {
    let invalid = || UnitParseError::Size(s.trim().to_string());
    let (number, suffix) = split_number(s).ok_or_else(invalid)?;
    let multiplier: u64 = match suffix.as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        _ => return Err(invalid()),
    };
    number
        .checked_mul(multiplier)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(invalid)
}

/// Formats a byte count with the largest exact suffix.
pub fn format_size(bytes: usize) -> String {
    const UNITS: [(usize, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];
    for (size, suffix) in UNITS {
        if bytes >= size && bytes % size == 0 {
            return format!("{}{}", bytes / size, suffix);
        }
    }
    bytes.to_string()
}

/// Parses a duration: a whole number with an optional unit
/// (ms, s, m, h, d). A bare number is seconds.
///
/// ```
/// use std::time::Duration;
/// use zetamachine::config::parse_duration;
///
/// assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, UnitParseError> {
    let invalid = || UnitParseError::Duration(s.trim().to_string());
    let (number, suffix) = split_number(s).ok_or_else(invalid)?;
    let seconds = |factor: u64| {
        number
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    };
    match suffix.as_str() {
        "ms" => Ok(Duration::from_millis(number)),
        "" | "s" | "sec" | "secs" => seconds(1),
        "m" | "min" | "mins" => seconds(60),
        "h" | "hr" | "hours" => seconds(3600),
        "d" | "day" | "days" => seconds(86_400),
        _ => Err(invalid()),
    }
}

/// Formats a duration with the largest exact unit.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    const UNITS: [(u64, &str); 3] = [(86_400, "d"), (3600, "h"), (60, "m")];
    for (size, suffix) in UNITS {
        if secs >= size && secs % size == 0 {
            return format!("{}{}", secs / size, suffix);
        }
    }
    format!("{}s", secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1k").unwrap(), 1024);
        assert_eq!(parse_size("1MB").unwrap(), 1024 * 1024);
        assert_eq!(parse_size(" 2 GB ").unwrap(), 2 << 30);
        assert_eq!(parse_size("100b").unwrap(), 100);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("1.5MB").is_err());
        assert!(parse_size("-1").is_err());
        assert!(parse_size("3TB").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(1024 * 1024), "1MB");
        assert_eq!(format_size(3 << 30), "3GB");
        assert_eq!(format_size(1536), "1536");
        assert_eq!(format_size(0), "0");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2 days").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1.5h").is_err());
        assert!(parse_duration("5 weeks").is_err());
        assert!(matches!(parse_duration("x"), Err(UnitParseError::Duration(_))));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(90_000)), "25h");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_formatted_values_parse_back() {
        for value in ["1d", "25h", "90s", "250ms"] {
            assert_eq!(format_duration(parse_duration(value).unwrap()), value);
        }
        for value in ["1MB", "512KB", "1000"] {
            assert_eq!(format_size(parse_size(value).unwrap()), value);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Written sizes parse back to the same byte count.
            #[test]
            fn format_size_roundtrips(bytes in 0usize..(1 << 40)) {
                prop_assert_eq!(parse_size(&format_size(bytes)).unwrap(), bytes);
            }

            /// Written durations parse back exactly at millisecond precision.
            #[test]
            fn format_duration_roundtrips(millis in 0u64..10_000_000_000) {
                let duration = Duration::from_millis(millis);
                prop_assert_eq!(parse_duration(&format_duration(duration)).unwrap(), duration);
            }
        }
    }
}
