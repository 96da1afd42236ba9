//! Adapter error classification
//!
//! The one place that looks at adapter message text. Everything past the
//! adapter boundary branches on [`AdapterErrorKind`] only.

use crate::error::AdapterErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;

static RATE_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|rate[\s_-]?limit|too many requests").expect("valid rate-limit pattern")
});

/// Classify a raw adapter message
///
/// Matches `429`, "rate limit" (also `rate_limit`, "ratelimited") and
/// "Too Many Requests", case-insensitively.
#[must_use]
pub fn classify_adapter_message(message: &str) -> AdapterErrorKind {
    if RATE_LIMIT.is_match(message) {
        AdapterErrorKind::RateLimit
    } else {
        AdapterErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_messages() {
        for message in [
            "HTTP 429",
            "Rate limit exceeded",
            "RATE_LIMIT",
            "ratelimited by upstream",
            "Too Many Requests",
            "status=429; retry later",
        ] {
            assert_eq!(classify_adapter_message(message), AdapterErrorKind::RateLimit, "{message}");
        }
    }

    #[test]
    fn other_messages_are_fatal() {
        for message in ["timeout", "HTTP 500", "invalid credentials", "id 14290 missing", ""] {
            assert_eq!(classify_adapter_message(message), AdapterErrorKind::Fatal, "{message}");
        }
    }
}
