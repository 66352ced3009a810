//! Process configuration.
//!
//! Built once at startup from the environment (a `.env` file is honoured) and
//! then handed by reference to the components that need it. Nothing reads
//! ambient settings after this point.

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use log::LevelFilter;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::delay_manager::{DelayBounds, DelayCategory, DelaySpec};
use crate::error::ConfigError;

const DEFAULT_TIMEZONE: &str = "America/New_York";
const DEFAULT_DAYS: &str = "Mon-Fri";
const DEFAULT_START: &str = "09:00";
const DEFAULT_END: &str = "16:30";
const DEFAULT_BASE_URL: &str = "https://www.linkedin.com";
const DEFAULT_PROFILE_MARKER: &str = "/in/";

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Permitted weekdays plus a `[start, end)` time-of-day range in one timezone.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub timezone: Tz,
}

impl TimeWindow {
    pub fn new(days: Vec<Weekday>, start: NaiveTime, end: NaiveTime, timezone: Tz) -> Result<Self, ConfigError> {
        if days.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SCRAPER_OPERATING_DAYS",
                reason: "at least one weekday is required".into(),
            });
        }
        if start >= end {
            return Err(ConfigError::Invalid {
                key: "SCRAPER_END",
                reason: format!("end {} must be after start {}", end, start),
            });
        }
        Ok(TimeWindow { days, start, end, timezone })
    }
}

#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub structured: PathBuf,
    pub tabular: PathBuf,
    pub dedup: PathBuf,
}

impl StoragePaths {
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        StoragePaths {
            structured: data_dir.join("profiles.jsonl"),
            tabular: data_dir.join("profiles.csv"),
            dedup: data_dir.join("processed_targets.txt"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    pub login_url: String,
    /// Path fragment that marks a link as a profile link.
    pub profile_marker: String,
    pub request_timeout: Duration,
    /// Only meaningful to a browser-backed driver. The HTTP driver fetches
    /// static pages and ignores it.
    pub headless: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Option<Credentials>,
    pub window: TimeWindow,
    pub delays: DelaySpec,
    pub storage: StoragePaths,
    pub site: SiteConfig,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Loads `.env` if present, then reads the `SCRAPER_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let credentials = match (get("SCRAPER_EMAIL"), get("SCRAPER_PASSWORD")) {
            (Some(email), Some(password)) => Some(Credentials { email, password }),
            _ => None,
        };

        let tz_name = get("SCRAPER_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = tz_name
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(tz_name.clone()))?;

        let days = parse_weekdays(&get("SCRAPER_OPERATING_DAYS").unwrap_or_else(|| DEFAULT_DAYS.into()))?;
        let start = parse_time_of_day(
            "SCRAPER_START",
            &get("SCRAPER_START").unwrap_or_else(|| DEFAULT_START.into()),
        )?;
        let end = parse_time_of_day("SCRAPER_END", &get("SCRAPER_END").unwrap_or_else(|| DEFAULT_END.into()))?;
        let window = TimeWindow::new(days, start, end, timezone)?;

        let mut delays = DelaySpec::default();
        for category in DelayCategory::ALL {
            let key = category.env_key();
            if let Some(raw) = get(key) {
                delays.set(category, parse_bounds(key, &raw)?);
            }
        }

        let data_dir = get("SCRAPER_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data"));
        let mut storage = StoragePaths::in_dir(&data_dir);
        if let Some(name) = get("SCRAPER_JSON_FILE") {
            storage.structured = data_dir.join(name);
        }
        if let Some(name) = get("SCRAPER_CSV_FILE") {
            storage.tabular = data_dir.join(name);
        }
        if let Some(name) = get("SCRAPER_DEDUP_FILE") {
            storage.dedup = data_dir.join(name);
        }

        let base_url = get("SCRAPER_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();
        let login_url = get("SCRAPER_LOGIN_URL").unwrap_or_else(|| format!("{}/login", base_url));
        let request_timeout = match get("SCRAPER_REQUEST_TIMEOUT") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| ConfigError::Invalid {
                key: "SCRAPER_REQUEST_TIMEOUT",
                reason: format!("'{}' is not a whole number of seconds", raw),
            })?),
            None => Duration::from_secs(10),
        };
        let headless = match get("SCRAPER_HEADLESS") {
            Some(raw) => parse_bool("SCRAPER_HEADLESS", &raw)?,
            None => false,
        };

        let log_level = match get("SCRAPER_LOG_LEVEL") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "SCRAPER_LOG_LEVEL",
                reason: format!("unknown level '{}'", raw),
            })?,
            None => LevelFilter::Info,
        };
        let log_file = get("SCRAPER_LOG_FILE").map(PathBuf::from);

        Ok(Config {
            credentials,
            window,
            delays,
            storage,
            site: SiteConfig {
                base_url,
                login_url,
                profile_marker: get("SCRAPER_PROFILE_MARKER").unwrap_or_else(|| DEFAULT_PROFILE_MARKER.into()),
                request_timeout,
                headless,
            },
            log_level,
            log_file,
        })
    }

    pub fn credentials(&self) -> Result<&Credentials, ConfigError> {
        self.credentials.as_ref().ok_or(ConfigError::Missing("SCRAPER_EMAIL / SCRAPER_PASSWORD"))
    }
}

/// Accepts `Mon-Fri`, `Sat-Mon` (wrapping), `Mon,Wed,Fri` and mixtures of both.
pub fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { key: "SCRAPER_OPERATING_DAYS", reason };
    let parse_day = |s: &str| {
        s.trim()
            .parse::<Weekday>()
            .map_err(|_| invalid(format!("unknown weekday '{}'", s.trim())))
    };

    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((from, to)) = part.split_once('-') {
            let from = parse_day(from)?;
            let to = parse_day(to)?;
            let mut day = from;
            loop {
                if !days.contains(&day) {
                    days.push(day);
                }
                if day == to {
                    break;
                }
                day = day.succ();
            }
        } else {
            let day = parse_day(part)?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
    }

    if days.is_empty() {
        return Err(invalid("no weekdays given".into()));
    }
    Ok(days)
}

pub fn parse_time_of_day(key: &'static str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a HH:MM time", raw),
        })
}

/// `min-max` in seconds, fractions allowed.
pub fn parse_bounds(key: &'static str, raw: &str) -> Result<DelayBounds, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid { key, reason };
    let (min, max) = raw
        .split_once('-')
        .ok_or_else(|| invalid(format!("'{}' is not in min-max form", raw)))?;
    let secs = |s: &str| -> Result<Duration, ConfigError> {
        let value: f64 = s.trim().parse().map_err(|_| invalid(format!("'{}' is not a number", s.trim())))?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(format!("'{}' must be a non-negative number", s.trim())));
        }
        Duration::try_from_secs_f64(value).map_err(|_| invalid(format!("'{}' is out of range", s.trim())))
    };
    DelayBounds::new(secs(min)?, secs(max)?).ok_or_else(|| invalid(format!("minimum exceeds maximum in '{}'", raw)))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a boolean", raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_office_hours() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.window.days.len(), 5);
        assert_eq!(config.window.start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.window.end, NaiveTime::from_hms_opt(16, 30, 0).unwrap());
        assert_eq!(config.window.timezone, chrono_tz::America::New_York);
        assert_eq!(config.log_level, LevelFilter::Info);
        assert!(config.credentials.is_none());
        assert!(config.credentials().is_err());
        assert_eq!(config.site.login_url, "https://www.linkedin.com/login");
        assert_eq!(config.storage.dedup, PathBuf::from("data").join("processed_targets.txt"));
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("SCRAPER_EMAIL", "me@example.com"),
            ("SCRAPER_PASSWORD", "hunter2"),
            ("SCRAPER_TIMEZONE", "Europe/Berlin"),
            ("SCRAPER_OPERATING_DAYS", "Sat-Mon"),
            ("SCRAPER_START", "07:15"),
            ("SCRAPER_END", "12:00"),
            ("SCRAPER_DELAY_SCROLL", "0.5-1.5"),
            ("SCRAPER_DATA_DIR", "/tmp/out"),
            ("SCRAPER_HEADLESS", "yes"),
            ("SCRAPER_LOG_LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(config.window.days, vec![Weekday::Sat, Weekday::Sun, Weekday::Mon]);
        assert_eq!(config.window.timezone, chrono_tz::Europe::Berlin);
        let scroll = config.delays.bounds(DelayCategory::Scroll);
        assert_eq!(scroll.min, Duration::from_millis(500));
        assert_eq!(scroll.max, Duration::from_millis(1500));
        assert_eq!(config.storage.structured, PathBuf::from("/tmp/out/profiles.jsonl"));
        assert!(config.site.headless);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert!(!format!("{:?}", config.credentials().unwrap()).contains("hunter2"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config_from(&[("SCRAPER_TIMEZONE", "Mars/Olympus")]),
            Err(ConfigError::UnknownTimezone(_))
        ));
        assert!(config_from(&[("SCRAPER_START", "17:00")]).is_err());
        assert!(config_from(&[("SCRAPER_DELAY_INTER_TARGET", "600-60")]).is_err());
        assert!(config_from(&[("SCRAPER_OPERATING_DAYS", "Funday")]).is_err());
        assert!(matches!(
            config_from(&[("SCRAPER_DELAY_SCROLL", "1e30-1e31")]),
            Err(ConfigError::Invalid { key: "SCRAPER_DELAY_SCROLL", .. })
        ));
    }

    #[test]
    fn weekday_lists_and_ranges_combine() {
        let days = parse_weekdays("Mon, Wed-Thu, Mon").unwrap();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Thu]);
    }
}
