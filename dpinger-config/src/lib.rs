//! TOML configuration loading for dpinger.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// default number of echo requests per measurement burst
pub const DEFAULT_PROBES: u32 = 4;
/// fallback ping interval applied only when a host spec omits one
pub const DEFAULT_PING_INTERVAL_SEC: u32 = 5;
/// default path to dpinger's config file
pub static DEFAULT_CONFIG_PATH: &str = "./dpinger.toml";

/// top-level dpinger configuration, parsed from a TOML file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub log: LogConfig,
    /// echo requests per measurement burst
    #[serde(default = "default_probes")]
    pub probes: u32,
    /// fallback interval (seconds) used only when a host spec omits one
    #[serde(default = "default_ping_interval", rename = "default-ping-interval-sec")]
    pub default_ping_interval_sec: u32,
}

fn default_probes() -> u32 {
    DEFAULT_PROBES
}

fn default_ping_interval() -> u32 {
    DEFAULT_PING_INTERVAL_SEC
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NatsConfig {
    pub url: String,
    #[serde(rename = "db-chan")]
    pub db_chan: String,
    #[serde(rename = "ping-chan")]
    pub ping_chan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogConfig {
    pub dir: String,
    #[serde(default)]
    pub debug: bool,
}

impl AppConfig {
    /// read and parse the config file at `path`
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to find config at {}", path.display()))?;
        Self::parse_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// parse config from an in-memory TOML string
    pub fn parse_str(s: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(s).context("invalid TOML in config")?;
        debug!(?config, "parsed config");
        Ok(config)
    }

    /// fallback scheduling interval as a `Duration`
    pub fn default_ping_interval(&self) -> Duration {
        Duration::from_secs(self.default_ping_interval_sec as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [nats]
        url = "nats://127.0.0.1:4222"
        db-chan = "dpinger.db"
        ping-chan = "dpinger.ping"

        [log]
        dir = "/var/log/dpinger"
        debug = true
    "#;

    #[test]
    fn parses_sample_config() {
        let cfg = AppConfig::parse_str(SAMPLE).unwrap();
        assert_eq!(cfg.nats.url, "nats://127.0.0.1:4222");
        assert_eq!(cfg.nats.db_chan, "dpinger.db");
        assert_eq!(cfg.nats.ping_chan, "dpinger.ping");
        assert_eq!(cfg.log.dir, "/var/log/dpinger");
        assert!(cfg.log.debug);
        assert_eq!(cfg.probes, DEFAULT_PROBES);
        assert_eq!(cfg.default_ping_interval_sec, DEFAULT_PING_INTERVAL_SEC);
    }

    #[test]
    fn defaults_log_debug_to_false() {
        let sample = r#"
            [nats]
            url = "nats://127.0.0.1:4222"
            db-chan = "dpinger.db"
            ping-chan = "dpinger.ping"

            [log]
            dir = "/var/log/dpinger"
        "#;
        let cfg = AppConfig::parse_str(sample).unwrap();
        assert!(!cfg.log.debug);
    }

    #[test]
    fn missing_file_errors_with_path_context() {
        let err = AppConfig::parse("/nonexistent/dpinger.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/dpinger.toml"));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = AppConfig::parse_str("not valid toml {{{").unwrap_err();
        assert!(format!("{err:#}").contains("invalid TOML"));
    }

    #[test]
    fn probes_override_is_honored() {
        let sample = r#"
            probes = 8
            default-ping-interval-sec = 10

            [nats]
            url = "nats://127.0.0.1:4222"
            db-chan = "dpinger.db"
            ping-chan = "dpinger.ping"

            [log]
            dir = "/var/log/dpinger"
        "#;
        let cfg = AppConfig::parse_str(sample).unwrap();
        assert_eq!(cfg.probes, 8);
        assert_eq!(cfg.default_ping_interval_sec, 10);
        assert_eq!(cfg.default_ping_interval(), Duration::from_secs(10));
    }
}
