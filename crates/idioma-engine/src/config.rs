use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Engine settings resolved from the environment. CLI flags override
/// individual fields after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub request_timeout_s: f64,
    pub transport_retries: usize,
    pub retry_backoff_s: f64,
    pub pause_poll_ms: u64,
    /// Per-fragment delay of the offline provider.
    pub dryrun_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: None,
            request_timeout_s: 300.0,
            transport_retries: 2,
            retry_backoff_s: 1.2,
            pause_poll_ms: 200,
            dryrun_delay_ms: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Self {
            api_base: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            api_key: non_empty("GEMINI_API_KEY")
                .or_else(|| non_empty("GOOGLE_API_KEY"))
                .or_else(|| non_empty("API_KEY")),
            model: non_empty("IDIOMA_MODEL"),
            request_timeout_s: parse_clamped(
                non_empty("IDIOMA_REQUEST_TIMEOUT"),
                defaults.request_timeout_s,
                15.0,
                900.0,
            ),
            transport_retries: parse_clamped(
                non_empty("IDIOMA_TRANSPORT_RETRIES"),
                defaults.transport_retries as f64,
                0.0,
                4.0,
            )
            .round() as usize,
            retry_backoff_s: parse_clamped(
                non_empty("IDIOMA_RETRY_BACKOFF"),
                defaults.retry_backoff_s,
                0.1,
                10.0,
            ),
            pause_poll_ms: parse_clamped(
                non_empty("IDIOMA_PAUSE_POLL_MS"),
                defaults.pause_poll_ms as f64,
                50.0,
                1000.0,
            )
            .round() as u64,
            dryrun_delay_ms: parse_clamped(
                non_empty("IDIOMA_DRYRUN_DELAY_MS"),
                defaults.dryrun_delay_ms as f64,
                0.0,
                2000.0,
            )
            .round() as u64,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_s)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn dryrun_fragment_delay(&self) -> Duration {
        Duration::from_millis(self.dryrun_delay_ms)
    }
}

fn parse_clamped(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
