use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.eu.amplitude.com/batch";
pub const DEFAULT_API_KEY_ENV: &str = "API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout", with = "duration_format")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub on_parse_error: ParseErrorStrategy,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            on_parse_error: ParseErrorStrategy::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_concurrency() -> usize {
    100
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

/// What the importer does with a line that cannot be normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorStrategy {
    /// Stop forming batches, drain in-flight uploads, then fail the run.
    #[default]
    Abort,
    /// Log the line number and keep going.
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per batch, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay", with = "duration_format")]
    pub initial_delay: Duration,
    #[serde(default = "default_max_delay", with = "duration_format")]
    pub max_delay: Duration,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Upper bound on the summed retry delays for one batch
    #[serde(default = "default_max_elapsed", with = "duration_format")]
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            max_elapsed: default_max_elapsed(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_max_elapsed() -> Duration {
    Duration::from_secs(300)
}

// Durations are written as "500ms", "30s", "5m" or "1h"
pub(crate) mod duration_format {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }

        let (value_str, unit) = if let Some(v) = s.strip_suffix("ms") {
            (v, "ms")
        } else if let Some(v) = s.strip_suffix('s') {
            (v, "s")
        } else if let Some(v) = s.strip_suffix('m') {
            (v, "m")
        } else if let Some(v) = s.strip_suffix('h') {
            (v, "h")
        } else {
            return Err(format!("invalid duration format: {}", s));
        };

        let value: u64 = value_str
            .trim()
            .parse()
            .map_err(|_| format!("invalid numeric value: {}", value_str))?;

        let secs = match unit {
            "ms" => return Ok(Duration::from_millis(value)),
            "s" => Some(value),
            "m" => value.checked_mul(60),
            "h" => value.checked_mul(3600),
            _ => return Err(format!("unknown unit: {}", unit)),
        };

        secs.map(Duration::from_secs)
            .ok_or_else(|| format!("duration out of range: {}", s))
    }

    pub fn format_duration(d: Duration) -> String {
        if d.subsec_millis() != 0 || d.as_secs() == 0 {
            return format!("{}ms", d.as_millis());
        }
        let secs = d.as_secs();
        if secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}
