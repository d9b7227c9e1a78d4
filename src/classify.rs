//! Error classification (§4.1): map any upstream failure to a four-variant
//! taxonomy plus an optional recommended wait duration.

use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;

/// Four-variant error taxonomy from §3/§4.1, plus `Unknown` as the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Quota,
    Invalid,
    Auth,
    Unknown,
}

/// Result of classifying an upstream failure: a kind plus, for `Quota` only,
/// a non-zero recommended wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub wait: Option<Duration>,
}

impl Classification {
    fn unknown() -> Self {
        Self { kind: ErrorKind::Unknown, wait: None }
    }

    fn simple(kind: ErrorKind) -> Self {
        Self { kind, wait: None }
    }
}

/// The conservative default when no retry-after signal can be found anywhere:
/// a wrong-but-safe over-wait is cheaper than hammering a quota (§4.1 rationale).
pub const DEFAULT_QUOTA_WAIT: Duration = Duration::from_secs(3600);

/// A normalized view of an upstream API failure: optionally a structured HTTP
/// status code, response headers, and a rendered message. This is the "any
/// error value" the spec's classifier takes as input (§4.1), narrowed to the
/// shape this crate's one real upstream (an HTTP messages API, §6) actually
/// produces.
#[derive(Debug, Clone, Default)]
pub struct ApiError {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, headers: Vec::new(), message: message.into() }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn retry_after_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:try again in|wait)\s+(\d+)\s*(second|minute|hour)s?").unwrap()
    })
}

fn retry_after_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)"retry[_-]?after"\s*:\s*(\d+)"#).unwrap())
}

fn unit_to_seconds(unit: &str) -> u64 {
    match unit.to_ascii_lowercase().as_str() {
        "second" => 1,
        "minute" => 60,
        "hour" => 3600,
        _ => 1,
    }
}

/// Extract a recommended wait for a `Quota` classification, in the priority
/// order given by §4.1:
/// 1. `Retry-After` header, integer seconds.
/// 2. `X-RateLimit-Reset` header, Unix-epoch seconds (`reset - now` if positive).
/// 3. A phrase in the message text ("try again in N minutes", "wait N seconds",
///    or a `"retry_after": N` style JSON fragment).
/// 4. [`DEFAULT_QUOTA_WAIT`].
fn extract_retry_after(err: &ApiError) -> Duration {
    if let Some(v) = err.header("retry-after") {
        if let Ok(secs) = v.trim().parse::<u64>() {
            return Duration::from_secs(secs);
        }
    }

    if let Some(v) = err.header("x-ratelimit-reset") {
        if let Ok(reset) = v.trim().parse::<i64>() {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            let delta = reset - now;
            if delta > 0 {
                return Duration::from_secs(delta as u64);
            }
            if delta < 0 {
                tracing::warn!(reset, now, "X-RateLimit-Reset is in the past; possible clock skew");
            }
            // delta == 0 or negative: fall through to message/default.
        }
    }

    if let Some(caps) = retry_after_phrase_re().captures(&err.message) {
        if let Ok(n) = caps[1].parse::<u64>() {
            return Duration::from_secs(n * unit_to_seconds(&caps[2]));
        }
    }

    if let Some(caps) = retry_after_json_re().captures(&err.message) {
        if let Ok(n) = caps[1].parse::<u64>() {
            return Duration::from_secs(n);
        }
    }

    DEFAULT_QUOTA_WAIT
}

/// Classify an upstream failure per §4.1's ordered rules. `None` classifies
/// as `Unknown` with zero wait, matching "a nil/absent error classifies as
/// Unknown".
pub fn classify(err: Option<&ApiError>) -> Classification {
    let Some(err) = err else {
        return Classification::unknown();
    };

    if let Some(status) = err.status {
        return classify_status(status, err);
    }

    classify_message(&err.message, err)
}

fn classify_status(status: u16, err: &ApiError) -> Classification {
    match status {
        429 => Classification { kind: ErrorKind::Quota, wait: Some(extract_retry_after(err)) },
        500..=599 => Classification::simple(ErrorKind::Transient),
        401 | 403 => Classification::simple(ErrorKind::Auth),
        400..=499 => Classification::simple(ErrorKind::Invalid),
        _ => Classification::unknown(),
    }
}

fn classify_message(message: &str, err: &ApiError) -> Classification {
    let lower = message.to_lowercase();

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota") {
        return Classification { kind: ErrorKind::Quota, wait: Some(extract_retry_after(err)) };
    }

    if ["500", "502", "503", "504", "internal server error", "bad gateway", "service unavailable", "gateway timeout"]
        .iter()
        .any(|tok| lower.contains(tok))
    {
        return Classification::simple(ErrorKind::Transient);
    }

    if ["connection refused", "connection reset", "timeout", "temporary failure", "network", "deadline exceeded"]
        .iter()
        .any(|tok| lower.contains(tok))
    {
        return Classification::simple(ErrorKind::Transient);
    }

    if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") || lower.contains("forbidden") {
        return Classification::simple(ErrorKind::Auth);
    }

    if lower.contains("400") || lower.contains("404") || lower.contains("bad request") {
        return Classification::simple(ErrorKind::Invalid);
    }

    Classification::unknown()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_classifies_as_unknown() {
        let c = classify(None);
        assert_eq!(c.kind, ErrorKind::Unknown);
        assert_eq!(c.wait, None);
    }

    #[test]
    fn status_429_is_quota_with_retry_after_header() {
        let err = ApiError::new("rate limited").with_status(429).with_header("Retry-After", "2");
        let c = classify(Some(&err));
        assert_eq!(c.kind, ErrorKind::Quota);
        assert_eq!(c.wait, Some(Duration::from_secs(2)));
    }

    #[test]
    fn status_429_falls_back_to_default_wait() {
        let err = ApiError::new("slow down").with_status(429);
        let c = classify(Some(&err));
        assert_eq!(c.kind, ErrorKind::Quota);
        assert_eq!(c.wait, Some(DEFAULT_QUOTA_WAIT));
    }

    #[test]
    fn status_5xx_is_transient() {
        for status in [500, 502, 503, 504, 599] {
            let err = ApiError::new("oops").with_status(status);
            assert_eq!(classify(Some(&err)).kind, ErrorKind::Transient, "status {status}");
        }
    }

    #[test]
    fn status_401_403_is_auth() {
        for status in [401, 403] {
            let err = ApiError::new("nope").with_status(status);
            assert_eq!(classify(Some(&err)).kind, ErrorKind::Auth, "status {status}");
        }
    }

    #[test]
    fn status_400_and_other_4xx_is_invalid() {
        for status in [400, 404, 422] {
            let err = ApiError::new("bad").with_status(status);
            assert_eq!(classify(Some(&err)).kind, ErrorKind::Invalid, "status {status}");
        }
    }

    #[test]
    fn message_tokens_classify_without_status() {
        assert_eq!(classify(Some(&ApiError::new("Rate Limit exceeded"))).kind, ErrorKind::Quota);
        assert_eq!(classify(Some(&ApiError::new("502 Bad Gateway"))).kind, ErrorKind::Transient);
        assert_eq!(classify(Some(&ApiError::new("Connection reset by peer"))).kind, ErrorKind::Transient);
        assert_eq!(classify(Some(&ApiError::new("403 Forbidden"))).kind, ErrorKind::Auth);
        assert_eq!(classify(Some(&ApiError::new("400 Bad Request"))).kind, ErrorKind::Invalid);
        assert_eq!(classify(Some(&ApiError::new("I have no idea"))).kind, ErrorKind::Unknown);
    }

    #[test]
    fn message_phrase_try_again_in_minutes() {
        let err = ApiError::new("please try again in 12 minutes");
        let c = classify(Some(&err));
        assert_eq!(c.kind, ErrorKind::Quota);
        assert_eq!(c.wait, Some(Duration::from_secs(12 * 60)));
    }

    #[test]
    fn message_phrase_wait_n_seconds() {
        let err = ApiError::new("quota exceeded, wait 30 seconds before retrying");
        let c = classify(Some(&err));
        assert_eq!(c.wait, Some(Duration::from_secs(30)));
    }

    #[test]
    fn message_json_retry_after_field() {
        let err = ApiError::new(r#"{"error":"quota","retry_after": 45}"#);
        let c = classify(Some(&err));
        assert_eq!(c.wait, Some(Duration::from_secs(45)));
    }

    #[test]
    fn x_ratelimit_reset_header_computes_delta() {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let err = ApiError::new("rate limit")
            .with_status(429)
            .with_header("X-RateLimit-Reset", (now + 10).to_string());
        let c = classify(Some(&err));
        // allow scheduling slack between computing `now` here and inside classify()
        let wait = c.wait.unwrap();
        assert!(wait <= Duration::from_secs(10) && wait >= Duration::from_secs(8), "{wait:?}");
    }

    #[test]
    fn x_ratelimit_reset_in_past_falls_back_to_default() {
        let err = ApiError::new("rate limit")
            .with_status(429)
            .with_header("X-RateLimit-Reset", "1");
        let c = classify(Some(&err));
        assert_eq!(c.wait, Some(DEFAULT_QUOTA_WAIT));
    }

    #[test]
    fn retry_after_header_wins_over_message_phrase() {
        let err = ApiError::new("try again in 99 minutes")
            .with_status(429)
            .with_header("Retry-After", "5");
        assert_eq!(classify(Some(&err)).wait, Some(Duration::from_secs(5)));
    }
}
