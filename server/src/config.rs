use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::ClockTime;
use crate::services::schedule::ScheduleRules;
use crate::sync::SyncSettings;

/// Environment variable holding the departures endpoint
pub const API_URL_ENV: &str = "API_GATEWAY_URL";

/// Timetable shown while no upstream departures are available
pub const DEFAULT_FALLBACK_TIMES: [&str; 20] = [
    "05:10", "05:47", "06:15", "06:31", "06:53", "07:10", "07:25", "07:45", "08:06", "08:25",
    "08:45", "09:01", "09:17", "09:32", "09:46", "10:01", "10:15", "10:31", "10:46", "11:01",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Departures endpoint. Overridden by `API_GATEWAY_URL`.
    pub api_url: String,
    /// IANA name of the timezone the board runs in
    pub timezone: String,
    pub fetch_interval_secs: u64,
    pub display_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub default_destination: String,
    pub default_platform: String,
    pub fallback_times: Vec<String>,
    pub listen_addr: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    pub cors_permissive: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            timezone: "Australia/Melbourne".to_string(),
            fetch_interval_secs: 5 * 60,
            display_interval_secs: 60,
            request_timeout_secs: 15,
            connect_timeout_secs: 5,
            default_destination: "Flinders Street".to_string(),
            default_platform: "1".to_string(),
            fallback_times: DEFAULT_FALLBACK_TIMES.iter().map(|t| t.to_string()).collect(),
            listen_addr: "127.0.0.1:3000".to_string(),
            cors_origins: Vec::new(),
            cors_permissive: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.as_ref().display(), "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply `API_GATEWAY_URL` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_api_url(std::env::var(API_URL_ENV).ok())
    }

    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url {
            self.api_url = url;
        }
        self
    }

    pub fn parsed_timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("timezone {:?}: {}", self.timezone, e)))
    }

    pub fn fallback_table(&self) -> Result<Vec<ClockTime>, ConfigError> {
        self.fallback_times
            .iter()
            .map(|t| {
                t.parse()
                    .map_err(|e| ConfigError::Invalid(format!("fallback_times: {}", e)))
            })
            .collect()
    }

    pub fn schedule_rules(&self) -> Result<ScheduleRules, ConfigError> {
        Ok(ScheduleRules {
            timezone: self.parsed_timezone()?,
            fallback: self.fallback_table()?,
            default_destination: self.default_destination.clone(),
            default_platform: self.default_platform.clone(),
        })
    }

    pub fn sync_settings(&self) -> Result<SyncSettings, ConfigError> {
        Ok(SyncSettings {
            rules: self.schedule_rules()?,
            fetch_interval: positive_secs("fetch_interval_secs", self.fetch_interval_secs)?,
            display_interval: positive_secs("display_interval_secs", self.display_interval_secs)?,
        })
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        positive_secs("request_timeout_secs", self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Result<Duration, ConfigError> {
        positive_secs("connect_timeout_secs", self.connect_timeout_secs)
    }
}

fn positive_secs(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid(format!("{} must be greater than zero", field)));
    }
    Ok(Duration::from_secs(secs))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        let settings = config.sync_settings().unwrap();

        assert_eq!(settings.rules.timezone, chrono_tz::Australia::Melbourne);
        assert_eq!(settings.rules.fallback.len(), 20);
        assert_eq!(settings.fetch_interval, Duration::from_secs(300));
        assert_eq!(settings.display_interval, Duration::from_secs(60));
        assert_eq!(config.api_url, "");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "api_url: https://example.com/departures\nfallback_times: [\"06:00\", \"06:30\"]\n",
        )
        .unwrap();

        assert_eq!(config.api_url, "https://example.com/departures");
        assert_eq!(config.timezone, "Australia/Melbourne");
        assert_eq!(config.fallback_table().unwrap().len(), 2);
        assert_eq!(config.default_platform, "1");
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let config = Config {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.schedule_rules(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_fallback_time_rejected() {
        let config = Config {
            fallback_times: vec!["05:10".to_string(), "5:47".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.fallback_table(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Config {
            display_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.sync_settings(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_api_url_override() {
        let config = Config::default().with_api_url(Some("https://example.com".to_string()));
        assert_eq!(config.api_url, "https://example.com");

        let config = config.with_api_url(None);
        assert_eq!(config.api_url, "https://example.com");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_or_default("/nonexistent/departure-board.yaml").unwrap();
        assert_eq!(config.fetch_interval_secs, 300);
    }
}
