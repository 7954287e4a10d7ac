//! Configuration module for the auction-pulse application.
//!
//! Values come from an optional `auction-pulse.toml` followed by raw
//! environment variables, so `WAREHOUSE_URL=...` overrides the file.

use anyhow::{Context, bail};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

use crate::refresh::TotalFailurePolicy;

pub const CONFIG_FILE: &str = "auction-pulse.toml";

/// Main application configuration
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// Log level for the application crate (`trace`..`error`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deployment name reported by the health probe (`dev`, `prod`).
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Connection string for the analytics warehouse. Required.
    pub warehouse_url: String,
    #[serde(default = "default_stats_table")]
    pub stats_table: String,
    #[serde(default = "default_country_table")]
    pub country_table: String,
    #[serde(default = "default_excluded_countries")]
    pub excluded_countries: Vec<String>,

    /// When set, the fast tier lives in Redis instead of process memory.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    #[serde(
        default = "default_cache_ttl",
        deserialize_with = "deserialize_duration"
    )]
    pub cache_ttl: Duration,

    #[serde(
        default = "default_refresh_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub refresh_interval: Duration,
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub fetch_timeout: Duration,
    #[serde(default)]
    pub total_failure_policy: TotalFailurePolicy,
    /// The refresh is reported healthy if it last succeeded within this window.
    #[serde(
        default = "default_health_window",
        deserialize_with = "deserialize_duration"
    )]
    pub health_window: Duration,

    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
    /// Bearer token for `POST /api/admin/refresh`; the endpoint is disabled without it.
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_app_env() -> String {
    "dev".to_string()
}

fn default_stats_table() -> String {
    "usmart.auction_stats".to_string()
}

fn default_country_table() -> String {
    "usmart.auction_stats_cntry".to_string()
}

fn default_excluded_countries() -> Vec<String> {
    crate::source::DEFAULT_EXCLUDED_COUNTRIES
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_cache_file() -> PathBuf {
    PathBuf::from(crate::cache::file::DEFAULT_PATH)
}

fn default_cache_ttl() -> Duration {
    crate::cache::DEFAULT_TTL
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_health_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

impl Config {
    /// Load from the default file and the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::raw()),
        )
    }

    /// Extract and validate from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment.extract().context("Failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.warehouse_url.trim().is_empty() {
            bail!("WAREHOUSE_URL must not be empty");
        }
        validate_table_name(&self.stats_table).context("Invalid STATS_TABLE")?;
        validate_table_name(&self.country_table).context("Invalid COUNTRY_TABLE")?;
        if self.cache_ttl.is_zero() {
            bail!("CACHE_TTL must be greater than zero");
        }
        if self.refresh_interval.is_zero() {
            bail!("REFRESH_INTERVAL must be greater than zero");
        }
        if self.fetch_timeout.is_zero() {
            bail!("FETCH_TIMEOUT must be greater than zero");
        }
        Ok(())
    }
}

/// Check that `name` is a plain, optionally schema-qualified SQL identifier.
///
/// Table names are interpolated into queries, so anything beyond
/// `[A-Za-z_][A-Za-z0-9_$]*` segments joined by `.` is refused.
pub fn validate_table_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("table name is empty");
    }
    for segment in name.split('.') {
        let mut chars = segment.chars();
        let Some(first) = chars.next() else {
            bail!("table name '{name}' has an empty segment");
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            bail!("table name '{name}' segment '{segment}' must start with a letter or '_'");
        }
        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
            bail!("table name '{name}' contains invalid character '{bad}'");
        }
    }
    Ok(())
}

/// Parse a duration like `"300"`, `"420s"`, `"5m"` or `"1h"`. Bare numbers are seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ]);
    let parsed = parser
        .parse(input.trim())
        .map_err(|e| format!("invalid duration '{input}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{input}': {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(body: &str) -> anyhow::Result<Config> {
        Config::from_figment(Figment::new().merge(Toml::string(body)))
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("300"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("420s"), Ok(Duration::from_secs(420)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn table_names() {
        assert!(validate_table_name("auction_stats").is_ok());
        assert!(validate_table_name("usmart.auction_stats_cntry").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("usmart.").is_err());
        assert!(validate_table_name("1stats").is_err());
        assert!(validate_table_name("stats; DROP TABLE x").is_err());
        assert!(validate_table_name("`proj.ds.tbl`").is_err());
    }

    #[test]
    fn defaults_fill_everything_but_the_warehouse() {
        let config = from_toml(r#"warehouse_url = "postgres://localhost/warehouse""#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache_ttl, Duration::from_secs(420));
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.total_failure_policy, TotalFailurePolicy::WriteEmpty);
        assert_eq!(config.cache_file, PathBuf::from("cache/auction_data.json"));
        assert!(config.excluded_countries.iter().any(|c| c == "Cuba"));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn missing_warehouse_url_is_fatal() {
        assert!(from_toml("port = 9000").is_err());
        assert!(from_toml(r#"warehouse_url = "  ""#).is_err());
    }

    #[test]
    fn durations_accept_numbers_and_strings() {
        let config = from_toml(
            r#"
            warehouse_url = "postgres://localhost/warehouse"
            refresh_interval = "2m"
            cache_ttl = 600
            total_failure_policy = "keep_previous"
            "#,
        )
        .unwrap();
        assert_eq!(config.refresh_interval, Duration::from_secs(120));
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(
            config.total_failure_policy,
            TotalFailurePolicy::KeepPrevious
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(
            from_toml(
                r#"
                warehouse_url = "postgres://localhost/warehouse"
                refresh_interval = "0s"
                "#
            )
            .is_err()
        );
    }
}
