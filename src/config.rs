use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Server settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Directory holding the WAL file.
    pub data_dir: PathBuf,
    /// Prometheus listener; disabled when unset.
    pub metrics_port: Option<u16>,
    /// Appends since the last compaction before the compactor rewrites the WAL.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub max_in_flight: usize,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8000,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            max_in_flight: 512,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Environment variables:
    /// - `UNIBOOK_BIND` (default `0.0.0.0`)
    /// - `UNIBOOK_PORT` (default 8000)
    /// - `UNIBOOK_DATA_DIR` (default `./data`)
    /// - `UNIBOOK_METRICS_PORT` (unset = no exporter)
    /// - `UNIBOOK_COMPACT_THRESHOLD` (default 1000)
    /// - `UNIBOOK_COMPACT_INTERVAL_SECS` (default 60)
    /// - `UNIBOOK_MAX_IN_FLIGHT` (default 512)
    /// - `UNIBOOK_REQUEST_TIMEOUT_SECS` (default 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let compact_interval_secs: u64 = parse(&lookup, "UNIBOOK_COMPACT_INTERVAL_SECS")?
            .unwrap_or(defaults.compact_interval.as_secs());
        let request_timeout_secs: u64 = parse(&lookup, "UNIBOOK_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout.as_secs());
        let max_in_flight: usize =
            parse(&lookup, "UNIBOOK_MAX_IN_FLIGHT")?.unwrap_or(defaults.max_in_flight);

        if compact_interval_secs == 0 {
            return Err(ConfigError::Zero { var: "UNIBOOK_COMPACT_INTERVAL_SECS" });
        }
        if request_timeout_secs == 0 {
            return Err(ConfigError::Zero { var: "UNIBOOK_REQUEST_TIMEOUT_SECS" });
        }
        if max_in_flight == 0 {
            return Err(ConfigError::Zero { var: "UNIBOOK_MAX_IN_FLIGHT" });
        }

        Ok(Self {
            bind: lookup("UNIBOOK_BIND").unwrap_or(defaults.bind),
            port: parse(&lookup, "UNIBOOK_PORT")?.unwrap_or(defaults.port),
            data_dir: lookup("UNIBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parse(&lookup, "UNIBOOK_METRICS_PORT")?,
            compact_threshold: parse(&lookup, "UNIBOOK_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            compact_interval: Duration::from_secs(compact_interval_secs),
            max_in_flight,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("unibook.wal")
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
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
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:8000");
        assert_eq!(config.wal_path(), PathBuf::from("./data/unibook.wal"));
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("UNIBOOK_BIND", "127.0.0.1"),
            ("UNIBOOK_PORT", "9000"),
            ("UNIBOOK_DATA_DIR", "/var/lib/unibook"),
            ("UNIBOOK_METRICS_PORT", "9100"),
            ("UNIBOOK_COMPACT_THRESHOLD", "50"),
            ("UNIBOOK_COMPACT_INTERVAL_SECS", "5"),
            ("UNIBOOK_MAX_IN_FLIGHT", "64"),
            ("UNIBOOK_REQUEST_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/unibook"));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.compact_interval, Duration::from_secs(5));
        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = Config::from_lookup(lookup(&[("UNIBOOK_PORT", "eighty")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "UNIBOOK_PORT",
                value: "eighty".into()
            }
        );
        assert!(Config::from_lookup(lookup(&[("UNIBOOK_PORT", "70000")])).is_err());
    }

    #[test]
    fn zero_limits_rejected() {
        let err = Config::from_lookup(lookup(&[("UNIBOOK_MAX_IN_FLIGHT", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::Zero { var: "UNIBOOK_MAX_IN_FLIGHT" });
    }
}
