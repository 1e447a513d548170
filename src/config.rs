use crate::acceptor::DEFAULT_BACKLOG;
use crate::error::ProxyError;
use crate::proxy::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_allowed_ports() -> Vec<u16> {
    vec![80, 443]
}

pub const DEFAULT_AUDIT_LOG: &str = "NetworkLog.txt";

fn default_audit_log() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_AUDIT_LOG))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    // Receive size per read; routing only ever sees this much of a request
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_allowed_ports")]
    pub allowed_ports: Vec<u16>,
    // None leaves outbound connects unbounded
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    // null sends audit events to the `audit` log target instead
    #[serde(default = "default_audit_log")]
    pub audit_log: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backlog: default_backlog(),
            buffer_size: default_buffer_size(),
            allowed_ports: default_allowed_ports(),
            connect_timeout_secs: None,
            audit_log: default_audit_log(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.buffer_size == 0 {
            return Err(ProxyError::Config("buffer_size must be greater than zero".to_string()));
        }
        if self.backlog == 0 {
            return Err(ProxyError::Config("backlog must be greater than zero".to_string()));
        }
        if self.allowed_ports.is_empty() {
            return Err(ProxyError::Config("allowed_ports must not be empty".to_string()));
        }
        if self.connect_timeout_secs == Some(0) {
            return Err(ProxyError::Config("connect_timeout_secs must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.backlog, 100);
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.allowed_ports, vec![80, 443]);
        assert_eq!(config.audit_log, Some(PathBuf::from("NetworkLog.txt")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "listen_addr": "127.0.0.1:3128" }"#).unwrap();
        assert_eq!(config.listen_addr.port(), 3128);
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.audit_log, Some(PathBuf::from(DEFAULT_AUDIT_LOG)));

        let config: Config = serde_json::from_str(r#"{ "audit_log": null }"#).unwrap();
        assert!(config.audit_log.is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxy.json");
        let path = path.to_str().unwrap();

        let config = Config {
            connect_timeout_secs: Some(5),
            audit_log: Some(PathBuf::from("proxy-audit.txt")),
            logging: LoggingConfig {
                level: LogLevel::Debug,
                format: LogFormat::Json,
            },
            ..Config::default()
        };
        config.to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.connect_timeout_secs, Some(5));
        assert_eq!(loaded.audit_log, Some(PathBuf::from("proxy-audit.txt")));
        assert_eq!(loaded.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validation_errors() {
        let zero_buffer = Config { buffer_size: 0, ..Config::default() };
        assert!(zero_buffer.validate().is_err());

        let zero_backlog = Config { backlog: 0, ..Config::default() };
        assert!(zero_backlog.validate().is_err());

        let zero_timeout = Config { connect_timeout_secs: Some(0), ..Config::default() };
        assert!(zero_timeout.validate().is_err());
    }
}
