// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::constants::{
    CHECKPOINT_DB, CHECKPOINT_INTERVAL, DEFAULT_STREAM_URL, FIELDS_FILE, QUEUE_CHECK_INTERVAL,
    SYSLOG_PORT, WORKER_COUNT,
};
use crate::errors::ConfigError;
use crate::ingest::StreamConfig;
use crate::supervisor::SupervisorConfig;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Bridge configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bearer token for the log stream
    pub api_key: String,
    /// Cluster id, sent as `cid`
    pub cluster_id: String,
    /// Stream base URL, without query string
    pub stream_url: String,
    /// Collector host
    pub syslog_server: String,
    pub syslog_port: u16,
    /// Ordered output field list, one name per line
    pub fields_file: PathBuf,
    /// SQLite file holding the checkpoint
    pub checkpoint_db: PathBuf,
    pub worker_count: usize,
    /// Records with a `ts` between two checkpoint writes
    pub checkpoint_interval: u64,
    pub queue_check_interval: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            cluster_id: String::new(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            syslog_server: String::new(),
            syslog_port: SYSLOG_PORT,
            fields_file: PathBuf::from(FIELDS_FILE),
            checkpoint_db: PathBuf::from(CHECKPOINT_DB),
            worker_count: WORKER_COUNT,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            queue_check_interval: QUEUE_CHECK_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let config = Self {
            api_key: required("PPOD_API_KEY")?,
            cluster_id: required("PPOD_CLUSTER_ID")?,
            stream_url: lookup("PPOD_STREAM_URL").unwrap_or(defaults.stream_url),
            syslog_server: required("PPOD_SYSLOG_SERVER")?,
            syslog_port: parse_or(&lookup, "PPOD_SYSLOG_PORT", defaults.syslog_port)?,
            fields_file: lookup("PPOD_FIELDS_FILE").map_or(defaults.fields_file, PathBuf::from),
            checkpoint_db: lookup("PPOD_CHECKPOINT_DB")
                .map_or(defaults.checkpoint_db, PathBuf::from),
            worker_count: parse_or(&lookup, "PPOD_WORKER_COUNT", defaults.worker_count)?,
            checkpoint_interval: parse_or(
                &lookup,
                "PPOD_CHECKPOINT_INTERVAL",
                defaults.checkpoint_interval,
            )?,
            queue_check_interval: Duration::from_secs(parse_or(
                &lookup,
                "PPOD_QUEUE_CHECK_INTERVAL",
                defaults.queue_check_interval.as_secs(),
            )?),
            log_level: lookup("PPOD_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("PPOD_API_KEY", &self.api_key),
            ("PPOD_CLUSTER_ID", &self.cluster_id),
            ("PPOD_SYSLOG_SERVER", &self.syslog_server),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} cannot be empty")));
            }
        }

        let url = Url::parse(&self.stream_url).map_err(|e| {
            ConfigError::Invalid(format!("invalid stream URL '{}': {e}", self.stream_url))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid(format!(
                "stream URL must use ws or wss, got '{}'",
                url.scheme()
            )));
        }

        if self.syslog_port == 0 {
            return Err(ConfigError::Invalid(
                "syslog port must be greater than 0".to_string(),
            ));
        }

        if self.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "worker count must be greater than 0".to_string(),
            ));
        }

        if self.checkpoint_interval == 0 {
            return Err(ConfigError::Invalid(
                "checkpoint interval must be greater than 0".to_string(),
            ));
        }

        if self.queue_check_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "queue check interval must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// `host:port` of the syslog collector.
    #[must_use]
    pub fn collector_addr(&self) -> String {
        format!("{}:{}", self.syslog_server, self.syslog_port)
    }

    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        let mut stream = StreamConfig::new(&self.stream_url, &self.cluster_id, &self.api_key);
        stream.checkpoint_interval = self.checkpoint_interval;
        stream
    }

    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(self.stream_config(), self.collector_addr());
        config.worker_count = self.worker_count;
        config.queue_check_interval = self.queue_check_interval;
        config
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{key} has invalid value '{raw}'"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> BridgeConfig {
        BridgeConfig {
            api_key: "token".to_string(),
            cluster_id: "acme_hosted".to_string(),
            syslog_server: "collector.local".to_string(),
            ..Default::default()
        }
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("PPOD_API_KEY", "token"),
        ("PPOD_CLUSTER_ID", "acme_hosted"),
        ("PPOD_SYSLOG_SERVER", "collector.local"),
    ];

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.stream_url, DEFAULT_STREAM_URL);
        assert_eq!(config.syslog_port, 514);
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.checkpoint_interval, 10_000);
        assert_eq!(config.queue_check_interval, Duration::from_secs(300));
        assert_eq!(config.fields_file, PathBuf::from("LR_Syslog_Fields.txt"));
        assert_eq!(config.checkpoint_db, PathBuf::from("runtime_cfg.sqlite"));
        assert_eq!(config.collector_addr(), "collector.local:514");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PPOD_SYSLOG_PORT", "1514"),
            ("PPOD_WORKER_COUNT", "8"),
            ("PPOD_CHECKPOINT_INTERVAL", "50"),
            ("PPOD_QUEUE_CHECK_INTERVAL", "10"),
            ("PPOD_LOG_LEVEL", "DEBUG"),
            ("PPOD_STREAM_URL", "ws://127.0.0.1:9000/v1/stream"),
        ]);
        let config = BridgeConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.syslog_port, 1514);
        assert_eq!(config.log_level, "debug");

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.worker_count, 8);
        assert_eq!(supervisor.collector_addr, "collector.local:1514");
        assert_eq!(supervisor.queue_check_interval, Duration::from_secs(10));
        assert_eq!(supervisor.stream.checkpoint_interval, 50);
        assert_eq!(supervisor.stream.url, "ws://127.0.0.1:9000/v1/stream");
        assert_eq!(supervisor.stream.cluster_id, "acme_hosted");
    }

    #[test]
    fn test_missing_required() {
        let err = BridgeConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PPOD_SYSLOG_SERVER")));
    }

    #[test]
    fn test_unparseable_number() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("PPOD_SYSLOG_PORT", "syslog"));
        let err = BridgeConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate_empty_required() {
        let config = BridgeConfig {
            api_key: "   ".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_numbers() {
        for config in [
            BridgeConfig {
                syslog_port: 0,
                ..valid()
            },
            BridgeConfig {
                worker_count: 0,
                ..valid()
            },
            BridgeConfig {
                checkpoint_interval: 0,
                ..valid()
            },
            BridgeConfig {
                queue_check_interval: Duration::ZERO,
                ..valid()
            },
        ] {
            assert!(config.validate().is_err(), "{config:?} should be invalid");
        }
    }

    #[test]
    fn test_validate_stream_url() {
        let config = BridgeConfig {
            stream_url: "https://logstream.proofpoint.com/v1/stream".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            stream_url: "not a url".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let config = BridgeConfig {
                log_level: level.to_string(),
                ..valid()
            };
            assert!(
                config.validate().is_ok(),
                "Log level '{}' should be valid",
                level
            );
        }

        let config = BridgeConfig {
            log_level: "verbose".to_string(),
            ..valid()
        };
        assert!(config.validate().is_err());
    }
}
