//! Environment variable names used by this crate for convenient
//! configuration of the hook from services.
//!
//! These are purely helpers; [`LogHook`](crate::hook::LogHook) itself
//! never reads the environment.

use crate::bulk::BulkConfig;
use crate::delivery::StrategyKind;
use crate::hook::{default_host, HookConfig};
use crate::severity::Severity;
use std::str::FromStr;
use std::time::Duration;

/// Backend DSN, e.g. `elasticsearch://127.0.0.1:9200/logs`.
pub const ES_HOOK_DSN_ENV: &str = "ES_HOOK_DSN";

/// Index name used when the DSN does not name one.
pub const ES_HOOK_INDEX_ENV: &str = "ES_HOOK_INDEX";

/// Host identifier stamped on documents. Defaults to the hostname.
pub const ES_HOOK_HOST_ENV: &str = "ES_HOOK_HOST";

/// Minimum severity (`panic` .. `trace`).
pub const ES_HOOK_LEVEL_ENV: &str = "ES_HOOK_LEVEL";

/// Delivery strategy: `sync`, `async` or `bulk`.
pub const ES_HOOK_STRATEGY_ENV: &str = "ES_HOOK_STRATEGY";

/// Number of bulk workers.
pub const ES_HOOK_BULK_WORKERS_ENV: &str = "ES_HOOK_BULK_WORKERS";

/// Seconds between bulk flushes.
pub const ES_HOOK_FLUSH_INTERVAL_SECS_ENV: &str = "ES_HOOK_FLUSH_INTERVAL_SECS";

/// Optional cap on queued bulk documents.
pub const ES_HOOK_MAX_PENDING_ENV: &str = "ES_HOOK_MAX_PENDING";

/// Optional cap on concurrent detached writes.
pub const ES_HOOK_MAX_IN_FLIGHT_ENV: &str = "ES_HOOK_MAX_IN_FLIGHT";

/// Default index when neither the DSN nor [`ES_HOOK_INDEX_ENV`] names one.
pub const DEFAULT_INDEX: &str = "logs";

/// Value of `key` in the process environment, or `default` when unset.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Error returned when a configuration value cannot be used.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: &'static str },

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl HookConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BulkConfig::default();

        let flush_interval = parse_opt::<u64, _>(&lookup, ES_HOOK_FLUSH_INTERVAL_SECS_ENV)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.flush_interval);

        Ok(HookConfig {
            host: lookup(ES_HOOK_HOST_ENV).unwrap_or_else(default_host),
            min_level: parse_opt::<Severity, _>(&lookup, ES_HOOK_LEVEL_ENV)?.unwrap_or(Severity::Info),
            strategy: parse_opt::<StrategyKind, _>(&lookup, ES_HOOK_STRATEGY_ENV)?.unwrap_or_default(),
            max_in_flight: parse_opt(&lookup, ES_HOOK_MAX_IN_FLIGHT_ENV)?,
            bulk: BulkConfig {
                workers: parse_opt(&lookup, ES_HOOK_BULK_WORKERS_ENV)?.unwrap_or(defaults.workers),
                flush_interval,
                max_pending: parse_opt(&lookup, ES_HOOK_MAX_PENDING_ENV)?,
            },
        })
    }
}

fn parse_opt<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = HookConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.min_level, Severity::Info);
        assert_eq!(cfg.strategy, StrategyKind::Sync);
        assert_eq!(cfg.bulk, BulkConfig::default());
        assert_eq!(cfg.max_in_flight, None);
        assert!(!cfg.host.is_empty());
    }

    #[test]
    fn reads_every_setting() {
        let cfg = HookConfig::from_lookup(lookup(&[
            (ES_HOOK_HOST_ENV, "api-7"),
            (ES_HOOK_LEVEL_ENV, "warn"),
            (ES_HOOK_STRATEGY_ENV, "bulk"),
            (ES_HOOK_BULK_WORKERS_ENV, "5"),
            (ES_HOOK_FLUSH_INTERVAL_SECS_ENV, "2"),
            (ES_HOOK_MAX_PENDING_ENV, "1000"),
            (ES_HOOK_MAX_IN_FLIGHT_ENV, "64"),
        ]))
        .unwrap();

        assert_eq!(cfg.host, "api-7");
        assert_eq!(cfg.min_level, Severity::Warn);
        assert_eq!(cfg.strategy, StrategyKind::Bulk);
        assert_eq!(cfg.bulk.workers, 5);
        assert_eq!(cfg.bulk.flush_interval, Duration::from_secs(2));
        assert_eq!(cfg.bulk.max_pending, Some(1000));
        assert_eq!(cfg.max_in_flight, Some(64));
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = HookConfig::from_lookup(lookup(&[(ES_HOOK_BULK_WORKERS_ENV, "three")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key, .. } if key == ES_HOOK_BULK_WORKERS_ENV));

        let err = HookConfig::from_lookup(lookup(&[(ES_HOOK_LEVEL_ENV, "loud")])).unwrap_err();
        assert!(err.to_string().contains(ES_HOOK_LEVEL_ENV));
    }
}
