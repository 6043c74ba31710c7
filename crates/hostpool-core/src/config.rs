//! hostpool.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub catalog: CatalogConfig,
    pub import: ImportConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8480,
            data_dir: PathBuf::from("/var/lib/hostpool"),
        }
    }
}

/// Background status sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Sweep interval (e.g., "5m").
    pub interval: String,
    /// Operator recorded on status-change log entries.
    pub operator: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: "5m".to_string(),
            operator: "hostpool-sync".to_string(),
        }
    }
}

/// Addresses (`host:port`) of the external catalogs used by import and sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub cmdb_addr: Option<String>,
    pub job_addr: Option<String>,
    pub cloud_addr: Option<String>,
    pub timeout: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cmdb_addr: None,
            job_addr: None,
            cloud_addr: None,
            timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Hosts per external catalog call.
    pub batch_size: usize,
    /// Attempts per batch before surfacing an external catalog error.
    pub max_attempts: u32,
    pub retry_delay: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 3,
            retry_delay: "1s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

impl PoolConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PoolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn sync_interval(&self) -> Duration {
        parse_duration(&self.sync.interval).unwrap_or(Duration::from_secs(300))
    }

    pub fn catalog_timeout(&self) -> Duration {
        parse_duration(&self.catalog.timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn import_retry_delay(&self) -> Duration {
        parse_duration(&self.import.retry_delay).unwrap_or(Duration::from_secs(1))
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip_through_toml() {
        let config = PoolConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("batch_size = 100"));

        let parsed: PoolConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, 8480);
        assert_eq!(parsed.import.max_attempts, 3);
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[server]
port = 9000
"#;
        let config: PoolConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.data_dir, PathBuf::from("/var/lib/hostpool"));
        assert!(config.sync.enabled);
        assert!(config.catalog.cmdb_addr.is_none());
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_catalog_and_log() {
        let toml_str = r#"
[catalog]
cmdb_addr = "10.0.0.5:80"
job_addr = "10.0.0.6:80"
timeout = "3s"

[log]
format = "json"
filter = "debug"
"#;
        let config: PoolConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.catalog.cmdb_addr.as_deref(), Some("10.0.0.5:80"));
        assert_eq!(config.catalog_timeout(), Duration::from_secs(3));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_durations_fall_back() {
        let mut config = PoolConfig::default();
        config.sync.interval = "soon".to_string();
        config.import.retry_delay = "".to_string();
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
        assert_eq!(config.import_retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("x"), None);
    }
}
