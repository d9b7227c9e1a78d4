//! Retry configuration (§3) and environment-driven defaults (§6).

use std::env;
use std::time::Duration;

const ENV_MAX_QUOTA_WAIT: &str = "VC_MAX_QUOTA_WAIT";
const DEFAULT_MAX_QUOTA_WAIT: Duration = Duration::from_secs(15 * 60);
const MAX_QUOTA_WAIT_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("backoff_multiplier must be >= 1.0, got {0}")]
    InvalidMultiplier(f64),
    #[error("initial_backoff ({initial:?}) must not exceed max_backoff ({max:?})")]
    InitialExceedsMax { initial: Duration, max: Duration },
}

/// Immutable retry configuration, matching §3's "Retry configuration" fields
/// exactly. Built via [`RetryConfig::builder`], a builder-with-validation
/// pattern so an invalid combination (e.g. `initial_backoff > max_backoff`)
/// is caught at construction rather than silently misbehaving at call time.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub per_attempt_timeout: Duration,
    pub circuit_breaker_enabled: bool,
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub open_timeout: Duration,
    pub max_concurrent_calls: usize,
    pub max_quota_wait: Duration,
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfigBuilder {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    backoff_multiplier: f64,
    per_attempt_timeout: Duration,
    circuit_breaker_enabled: bool,
    failure_threshold: usize,
    success_threshold: usize,
    open_timeout: Duration,
    max_concurrent_calls: usize,
    max_quota_wait: Option<Duration>,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            per_attempt_timeout: Duration::from_secs(60),
            circuit_breaker_enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            max_concurrent_calls: 10,
            max_quota_wait: None,
        }
    }
}

impl RetryConfigBuilder {
    pub fn max_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub fn initial_backoff(mut self, d: Duration) -> Self {
        self.initial_backoff = d;
        self
    }

    pub fn max_backoff(mut self, d: Duration) -> Self {
        self.max_backoff = d;
        self
    }

    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.backoff_multiplier = m;
        self
    }

    pub fn per_attempt_timeout(mut self, d: Duration) -> Self {
        self.per_attempt_timeout = d;
        self
    }

    pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.circuit_breaker_enabled = enabled;
        self
    }

    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.failure_threshold = n;
        self
    }

    pub fn success_threshold(mut self, n: usize) -> Self {
        self.success_threshold = n;
        self
    }

    pub fn open_timeout(mut self, d: Duration) -> Self {
        self.open_timeout = d;
        self
    }

    pub fn max_concurrent_calls(mut self, n: usize) -> Self {
        self.max_concurrent_calls = n;
        self
    }

    /// Explicit override; if unset, `build()` falls back to
    /// [`max_quota_wait_from_env`].
    pub fn max_quota_wait(mut self, d: Duration) -> Self {
        self.max_quota_wait = Some(d);
        self
    }

    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(ConfigError::InitialExceedsMax { initial: self.initial_backoff, max: self.max_backoff });
        }

        Ok(RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
            backoff_multiplier: self.backoff_multiplier,
            per_attempt_timeout: self.per_attempt_timeout,
            circuit_breaker_enabled: self.circuit_breaker_enabled,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_timeout: self.open_timeout,
            max_concurrent_calls: self.max_concurrent_calls,
            max_quota_wait: self.max_quota_wait.unwrap_or_else(max_quota_wait_from_env),
        })
    }
}

/// Parse `VC_MAX_QUOTA_WAIT` (§6): a duration string like `15m` or `2h`.
/// Invalid or unset -> [`DEFAULT_MAX_QUOTA_WAIT`] with a warning for the
/// invalid case. Non-positive -> default. Greater than 24h -> clamped.
pub fn max_quota_wait_from_env() -> Duration {
    match env::var(ENV_MAX_QUOTA_WAIT) {
        Ok(raw) => parse_duration_clamped(&raw),
        Err(_) => DEFAULT_MAX_QUOTA_WAIT,
    }
}

fn parse_duration_clamped(raw: &str) -> Duration {
    match parse_duration_string(raw) {
        Some(d) if d.is_zero() => DEFAULT_MAX_QUOTA_WAIT,
        Some(d) if d > MAX_QUOTA_WAIT_CEILING => MAX_QUOTA_WAIT_CEILING,
        Some(d) => d,
        None => {
            tracing::warn!(raw, "invalid {} value; falling back to default", ENV_MAX_QUOTA_WAIT);
            DEFAULT_MAX_QUOTA_WAIT
        }
    }
}

/// Parse a simple `<number><unit>` duration string: `s`, `m`, `h` units.
fn parse_duration_string(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let unit_index = raw.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (number, unit) = raw.split_at(unit_index);
    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    let seconds = match unit {
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-var tests: `std::env::set_var` is process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_builder_produces_sane_values() {
        let config = RetryConfig::builder().build().unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_quota_wait, DEFAULT_MAX_QUOTA_WAIT);
    }

    #[test]
    fn multiplier_below_one_is_rejected() {
        let err = RetryConfig::builder().backoff_multiplier(0.5).build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMultiplier(_)));
    }

    #[test]
    fn initial_backoff_above_max_is_rejected() {
        let err = RetryConfig::builder()
            .initial_backoff(Duration::from_secs(60))
            .max_backoff(Duration::from_secs(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InitialExceedsMax { .. }));
    }

    #[test]
    fn explicit_max_quota_wait_overrides_env() {
        let config = RetryConfig::builder().max_quota_wait(Duration::from_secs(99)).build().unwrap();
        assert_eq!(config.max_quota_wait, Duration::from_secs(99));
    }

    #[test]
    fn parses_minutes_and_hours() {
        assert_eq!(parse_duration_string("15m"), Some(Duration::from_secs(15 * 60)));
        assert_eq!(parse_duration_string("2h"), Some(Duration::from_secs(2 * 3600)));
        assert_eq!(parse_duration_string("30s"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn invalid_string_falls_back_to_default() {
        assert_eq!(parse_duration_clamped("garbage"), DEFAULT_MAX_QUOTA_WAIT);
        assert_eq!(parse_duration_clamped(""), DEFAULT_MAX_QUOTA_WAIT);
    }

    #[test]
    fn non_positive_falls_back_to_default() {
        assert_eq!(parse_duration_clamped("0m"), DEFAULT_MAX_QUOTA_WAIT);
    }

    #[test]
    fn over_24h_is_clamped() {
        assert_eq!(parse_duration_clamped("48h"), MAX_QUOTA_WAIT_CEILING);
    }

    #[test]
    fn env_var_is_read_when_no_explicit_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var(ENV_MAX_QUOTA_WAIT, "45m");
        let config = RetryConfig::builder().build().unwrap();
        assert_eq!(config.max_quota_wait, Duration::from_secs(45 * 60));
        env::remove_var(ENV_MAX_QUOTA_WAIT);
    }
}
