use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::care::config::MonitoringPolicy;
use crate::cli::Cli;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_NOTIFY_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Where urgent alerts are POSTed. `None` means log only.
    pub alert_webhook_url: Option<String>,
    pub notify_timeout_seconds: u64,
    pub policy: MonitoringPolicy,
}

impl Config {
    /// Process environment with command-line flags layered on top.
    pub fn load(cli: &Cli) -> Result<Self, String> {
        Self::from_sources(cli, |key| env::var(key).ok())
    }

    /// Flags win over `lookup`; required keys are checked after layering.
    pub fn from_sources<F>(cli: &Cli, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|key| cli.value_for(key).or_else(|| lookup(key)))
    }

    /// Build the config from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or("DATABASE_URL is required")?;
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let alert_webhook_url = lookup("ALERT_WEBHOOK_URL").filter(|url| !url.trim().is_empty());
        let notify_timeout_seconds =
            parse_or(&lookup, "NOTIFY_TIMEOUT_SECONDS", DEFAULT_NOTIFY_TIMEOUT_SECONDS)?;

        let defaults = MonitoringPolicy::default();
        let policy = MonitoringPolicy {
            immediate_interval_minutes: parse_or(
                &lookup,
                "IMMEDIATE_INTERVAL_MINUTES",
                defaults.immediate_interval_minutes,
            )?,
            immediate_window_minutes: parse_or(
                &lookup,
                "IMMEDIATE_WINDOW_MINUTES",
                defaults.immediate_window_minutes,
            )?,
            immediate_observation_target: parse_or(
                &lookup,
                "IMMEDIATE_OBSERVATION_TARGET",
                defaults.immediate_observation_target,
            )?,
            default_shift_frequency_minutes: parse_or(
                &lookup,
                "DEFAULT_SHIFT_FREQUENCY_MINUTES",
                defaults.default_shift_frequency_minutes,
            )?,
            min_shift_frequency_minutes: parse_or(
                &lookup,
                "MIN_SHIFT_FREQUENCY_MINUTES",
                defaults.min_shift_frequency_minutes,
            )?,
            max_shift_frequency_minutes: parse_or(
                &lookup,
                "MAX_SHIFT_FREQUENCY_MINUTES",
                defaults.max_shift_frequency_minutes,
            )?,
        };
        policy.validate().map_err(|err| err.to_string())?;

        Ok(Self {
            database_url,
            bind_addr,
            alert_webhook_url,
            notify_timeout_seconds,
            policy,
        })
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_seconds)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, "DATABASE_URL is required");
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "sqlite::memory:")]))
            .unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.alert_webhook_url, None);
        assert_eq!(config.notify_timeout_seconds, 5);
        assert_eq!(config.policy, MonitoringPolicy::default());
    }

    #[test]
    fn policy_overrides_are_read_and_validated() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("IMMEDIATE_OBSERVATION_TARGET", "4"),
            ("DEFAULT_SHIFT_FREQUENCY_MINUTES", "180"),
        ]))
        .unwrap();
        assert_eq!(config.policy.immediate_observation_target, 4);
        assert_eq!(config.policy.default_shift_frequency_minutes, 180);

        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("MIN_SHIFT_FREQUENCY_MINUTES", "500"),
        ]))
        .unwrap_err();
        assert!(err.contains("exceeds maximum"));
    }

    #[test]
    fn non_numeric_override_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("NOTIFY_TIMEOUT_SECONDS", "soon"),
        ]))
        .unwrap_err();
        assert_eq!(err, "NOTIFY_TIMEOUT_SECONDS must be a valid number");
    }

    #[test]
    fn blank_webhook_means_log_only() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("ALERT_WEBHOOK_URL", "  "),
        ]))
        .unwrap();
        assert_eq!(config.alert_webhook_url, None);
    }

    fn cli(database_url: Option<&str>, alert_webhook_url: Option<&str>) -> Cli {
        Cli {
            database_url: database_url.map(str::to_string),
            bind_addr: None,
            alert_webhook_url: alert_webhook_url.map(str::to_string),
        }
    }

    #[test]
    fn cli_overrides_environment() {
        let config = Config::from_sources(
            &cli(Some("sqlite://care.db"), Some("https://hooks.example.com/alerts")),
            lookup_from(&[("DATABASE_URL", "sqlite::memory:")]),
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite://care.db");
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(
            config.alert_webhook_url.as_deref(),
            Some("https://hooks.example.com/alerts")
        );
    }

    #[test]
    fn cli_database_url_alone_satisfies_requirement() {
        let config = Config::from_sources(&cli(Some("sqlite://care.db"), None), lookup_from(&[]))
            .unwrap();
        assert_eq!(config.database_url, "sqlite://care.db");

        let err = Config::from_sources(&cli(None, None), lookup_from(&[])).unwrap_err();
        assert_eq!(err, "DATABASE_URL is required");
    }
}
