//! Rate-limit feedback parsed from HTTP response headers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Server-reported rate-limit hints.
///
/// Header names are matched case-insensitively; absent or unparseable
/// headers leave the corresponding field `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitFeedback {
    /// `Retry-After` (seconds).
    pub retry_after: Option<Duration>,
    /// `X-RateLimit-Limit`.
    pub limit: Option<u32>,
    /// `X-RateLimit-Remaining`.
    pub remaining: Option<u32>,
    /// `X-RateLimit-Reset` (Unix seconds or a parseable date string).
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitFeedback {
    /// Parse recognized headers out of a response header map.
    pub fn from_headers(headers: &HashMap<String, String>) -> Self {
        Self {
            retry_after: header_value(headers, "retry-after").and_then(parse_retry_after),
            limit: header_value(headers, "x-ratelimit-limit").and_then(|v| v.parse().ok()),
            remaining: header_value(headers, "x-ratelimit-remaining").and_then(|v| v.parse().ok()),
            reset_at: header_value(headers, "x-ratelimit-reset").and_then(parse_reset),
        }
    }

    /// True when no recognized header was present.
    pub fn is_empty(&self) -> bool {
        self.retry_after.is_none()
            && self.limit.is_none()
            && self.remaining.is_none()
            && self.reset_at.is_none()
    }
}

/// Look up a header by case-insensitive name.
fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
}

/// Parse a `Retry-After` value in seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.parse::<u64>().ok().map(Duration::from_secs)
}

/// Parse a reset timestamp: Unix seconds if numeric, else a date string.
fn parse_reset(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_all_headers() {
        let feedback = RateLimitFeedback::from_headers(&headers(&[
            ("Retry-After", "5"),
            ("X-RateLimit-Limit", "100"),
            ("X-RateLimit-Remaining", "42"),
            ("X-RateLimit-Reset", "1700000000"),
        ]));

        assert_eq!(feedback.retry_after, Some(Duration::from_secs(5)));
        assert_eq!(feedback.limit, Some(100));
        assert_eq!(feedback.remaining, Some(42));
        assert_eq!(
            feedback.reset_at,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let feedback =
            RateLimitFeedback::from_headers(&headers(&[("retry-after", "3"), ("X-RATELIMIT-LIMIT", "9")]));
        assert_eq!(feedback.retry_after, Some(Duration::from_secs(3)));
        assert_eq!(feedback.limit, Some(9));
    }

    #[test]
    fn test_reset_as_date_string() {
        let feedback = RateLimitFeedback::from_headers(&headers(&[(
            "X-RateLimit-Reset",
            "2026-01-01T00:00:30Z",
        )]));
        let expected = DateTime::parse_from_rfc3339("2026-01-01T00:00:30Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(feedback.reset_at, Some(expected));
    }

    #[test]
    fn test_missing_headers_are_noops() {
        let feedback = RateLimitFeedback::from_headers(&headers(&[]));
        assert!(feedback.is_empty());
    }

    #[test]
    fn test_garbage_values_ignored() {
        let feedback = RateLimitFeedback::from_headers(&headers(&[
            ("Retry-After", "soon"),
            ("X-RateLimit-Limit", "-1"),
            ("X-RateLimit-Reset", "whenever"),
        ]));
        assert!(feedback.is_empty());
    }
}
