use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::alerts::pushover::DEFAULT_API_URL;
use crate::alerts::AlertPolicy;
use crate::backoff::BackoffPolicy;
use crate::cli::Cli;
use crate::detection::DetectionConfig;

/// A credential that must never reach the logs.
#[derive(Clone, PartialEq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub nightscout_url: String,
    pub nightscout_token: Secret,
    pub pushover_user_key: Secret,
    pub pushover_api_token: Secret,
    pub pushover_api_url: String,
    pub poll_interval_seconds: u64,
    pub request_timeout: StdDuration,
    pub detection: DetectionConfig,
    pub alert_policy: AlertPolicy,
    pub backoff: BackoffPolicy,
    pub max_consecutive_failures: Option<u32>,
    pub unavailable_notify_after: u32,
    pub state_db_url: String,
    pub entries_count: u32,
    pub treatments_count: u32,
    pub annotate_nightscout: bool,
    pub metrics_addr: Option<SocketAddr>,
}

/// Reads one setting, distinguishing "unset" from "unparsable".
struct Settings<F> {
    lookup: F,
}

impl<F> Settings<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, String> {
        self.get(key).ok_or_else(|| format!("{} is required", key))
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T, String> {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|_| format!("{} must be a valid {}", key, std::any::type_name::<T>())),
            None => Ok(default),
        }
    }

    fn optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, String> {
        self.get(key)
            .map(|raw| raw.parse::<T>().map_err(|_| format!("{} is invalid: {}", key, raw)))
            .transpose()
    }

    fn positive(&self, key: &str, default: u64) -> Result<u64, String> {
        let value = self.parsed(key, default)?;
        if value == 0 {
            return Err(format!("{} must be greater than zero", key));
        }
        Ok(value)
    }

    fn minutes(&self, key: &str, default: u64) -> Result<Duration, String> {
        let minutes = self.positive(key, default)?;
        i64::try_from(minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| format!("{} is out of range", key))
    }

    fn hours(&self, key: &str, default: u64) -> Result<Duration, String> {
        let hours = self.positive(key, default)?;
        i64::try_from(hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| format!("{} is out of range", key))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build and validate configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = Settings { lookup };

        let nightscout_url = s.required("NIGHTSCOUT_URL")?;
        if !(nightscout_url.starts_with("http://") || nightscout_url.starts_with("https://")) {
            return Err(format!("Invalid NIGHTSCOUT_URL: {}", nightscout_url));
        }

        let rise_threshold_mgdl: f64 = s.parsed("RISE_THRESHOLD_MGDL", 40.0)?;
        if !rise_threshold_mgdl.is_finite() || rise_threshold_mgdl <= 0.0 {
            return Err("RISE_THRESHOLD_MGDL must be a positive number".to_string());
        }

        let ignore_carbs_grams: f64 = s.parsed("IGNORE_CARBS_GRAMS", 15.0)?;
        if !ignore_carbs_grams.is_finite() || ignore_carbs_grams < 0.0 {
            return Err("IGNORE_CARBS_GRAMS must not be negative".to_string());
        }

        let detection = DetectionConfig {
            rise_threshold_mgdl,
            rise_window: s.minutes("RISE_WINDOW_MINUTES", 60)?,
            bolus_lookback: s.minutes("BOLUS_LOOKBACK_MINUTES", 60)?,
            max_gap: s.minutes("MAX_GAP_MINUTES", 10)?,
            ignore_carbs_grams,
        };

        let alert_policy = AlertPolicy {
            cooldown: s.minutes("COOLDOWN_MINUTES", 120)?,
            fingerprint_bucket: s.minutes("FINGERPRINT_BUCKET_MINUTES", 30)?,
            escalation_threshold: s.parsed("ESCALATION_THRESHOLD", 2)?,
            retention: s.hours("STATE_RETENTION_HOURS", 48)?,
        };
        if alert_policy.retention < alert_policy.cooldown {
            return Err("STATE_RETENTION_HOURS must cover COOLDOWN_MINUTES".to_string());
        }

        let multiplier: f64 = s.parsed("BACKOFF_MULTIPLIER", 2.0)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err("BACKOFF_MULTIPLIER must be at least 1.0".to_string());
        }
        let backoff = BackoffPolicy {
            base: StdDuration::from_secs(s.positive("BACKOFF_BASE_SECONDS", 10)?),
            multiplier,
            cap: StdDuration::from_secs(s.positive("BACKOFF_MAX_SECONDS", 600)?),
            jitter: 0.1,
        };
        if backoff.base > backoff.cap {
            return Err("BACKOFF_BASE_SECONDS must not exceed BACKOFF_MAX_SECONDS".to_string());
        }

        Ok(Self {
            nightscout_url,
            nightscout_token: Secret(s.required("NIGHTSCOUT_TOKEN")?),
            pushover_user_key: Secret(s.required("PUSHOVER_USER_KEY")?),
            pushover_api_token: Secret(s.required("PUSHOVER_API_TOKEN")?),
            pushover_api_url: s
                .get("PUSHOVER_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            poll_interval_seconds: s.positive("POLL_INTERVAL_SECONDS", 300)?,
            request_timeout: StdDuration::from_secs(s.positive("REQUEST_TIMEOUT_SECONDS", 15)?),
            detection,
            alert_policy,
            backoff,
            max_consecutive_failures: s.optional("MAX_CONSECUTIVE_FAILURES")?,
            unavailable_notify_after: s.parsed("UNAVAILABLE_NOTIFY_AFTER", 6)?,
            state_db_url: s
                .get("STATE_DB_URL")
                .unwrap_or_else(|| "sqlite://missed-bolus-state.db".to_string()),
            entries_count: s.parsed("ENTRIES_COUNT", 60)?,
            treatments_count: s.parsed("TREATMENTS_COUNT", 50)?,
            annotate_nightscout: s.parsed("ANNOTATE_NIGHTSCOUT", false)?,
            metrics_addr: s.optional("METRICS_ADDR")?,
        })
    }

    /// Command-line flags take precedence over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), String> {
        if let Some(interval) = cli.poll_interval {
            if interval == 0 {
                return Err("--poll-interval must be greater than zero".to_string());
            }
            self.poll_interval_seconds = interval;
        }
        if let Some(url) = &cli.state_db {
            self.state_db_url = url.clone();
        }
        if let Some(addr) = cli.metrics_addr {
            self.metrics_addr = Some(addr);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.poll_interval_seconds)
    }

    /// How far back each cycle fetches.
    pub fn lookback_span(&self) -> Duration {
        self.detection.required_span()
    }
}
