use crate::bucket::{Resolution, TimeBucketer};
use crate::error::{AppError, Result};
use crate::generators::RateTolerance;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interval spec, e.g. "5-minutes", "1-days", "1-months"
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// IANA time zone the local calendar follows
    #[serde(default = "default_location")]
    pub location: String,
    /// Instant intervals are counted from. Defaults to local midnight of
    /// 1970-01-01 at `location`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<DateTime<Utc>>,
    #[serde(default)]
    pub average: AverageConfig,
}

/// Accepted spacing between readings for average rates, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageConfig {
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: i64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: i64,
}

impl Default for AverageConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
        }
    }
}

fn default_resolution() -> String {
    "5-minutes".into()
}

fn default_location() -> String {
    "Europe/Copenhagen".into()
}

fn default_min_interval_secs() -> i64 {
    240
}

fn default_max_interval_secs() -> i64 {
    360
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            location: default_location(),
            origin: None,
            average: AverageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration text, then apply `METER_*` overrides and validate.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        // An empty document yields all defaults.
        let mut config: Config = if expanded.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };

        if let Ok(resolution) = std::env::var("METER_RESOLUTION") {
            config.resolution = resolution;
        }
        if let Ok(location) = std::env::var("METER_LOCATION") {
            config.location = location;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.resolution
            .parse::<Resolution>()
            .map_err(|e| AppError::Config(format!("resolution: {}", e)))?;
        self.time_zone()?;
        self.tolerance()?;
        Ok(())
    }

    pub fn time_zone(&self) -> Result<Tz> {
        self.location
            .parse::<Tz>()
            .map_err(|e| AppError::Config(format!("unknown location '{}': {}", self.location, e)))
    }

    pub fn origin(&self) -> Result<DateTime<Utc>> {
        if let Some(origin) = self.origin {
            return Ok(origin);
        }
        let tz = self.time_zone()?;
        tz.with_ymd_and_hms(1970, 1, 1, 0, 0, 0)
            .earliest()
            .map(|midnight| midnight.with_timezone(&Utc))
            .ok_or_else(|| AppError::Config(format!("no local midnight in {}", self.location)))
    }

    pub fn bucketer(&self) -> Result<TimeBucketer> {
        TimeBucketer::new(self.time_zone()?, self.origin()?)
    }

    pub fn tolerance(&self) -> Result<RateTolerance> {
        let (min, max) = (self.average.min_interval_secs, self.average.max_interval_secs);
        if min <= 0 || min > max {
            return Err(AppError::Config(format!(
                "average interval bounds must satisfy 0 < min <= max, got {} / {}",
                min, max
            )));
        }
        RateTolerance::new(TimeDelta::seconds(min), TimeDelta::seconds(max))
            .map_err(|e| AppError::Config(e.to_string()))
    }
}

/// Expand environment variables written as $(VAR_NAME) or ${VAR_NAME}.
/// Unset variables are left as written.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$(?:\(([A-Z_][A-Z0-9_]*)\)|\{([A-Z_][A-Z0-9_]*)\})")
        .map_err(|e| AppError::Config(e.to_string()))?;

    let expanded = re.replace_all(content, |cap: &regex::Captures| {
        let name = cap
            .get(1)
            .or_else(|| cap.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| cap[0].to_string())
    });

    Ok(expanded.into_owned())
}
