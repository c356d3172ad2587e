//! Server settings loaded from YAML.

use crate::log::DEFAULT_MAX_ENTRIES;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9091
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub listen: ListenConfig,

    /// Answer with the best below-threshold candidate when nothing matches
    #[serde(default)]
    pub allow_partial_mapping: bool,

    #[serde(default = "default_max_request_log_count")]
    pub max_request_log_count: usize,

    /// Drop log entries older than this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_log_expiration_secs: Option<u64>,

    /// Seed for probability draws; random when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,

    /// JSON array of mappings imported at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings_file: Option<PathBuf>,
}

fn default_max_request_log_count() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            allow_partial_mapping: false,
            max_request_log_count: default_max_request_log_count(),
            request_log_expiration_secs: None,
            random_seed: None,
            mappings_file: None,
        }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.listen.host.trim().is_empty() {
            anyhow::bail!("listen.host must not be empty");
        }
        if self.max_request_log_count == 0 {
            anyhow::bail!("max_request_log_count must be at least 1");
        }
        if self.request_log_expiration_secs == Some(0) {
            anyhow::bail!("request_log_expiration_secs must be positive when set");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_settings() {
        let yaml = r#"
listen:
  host: 0.0.0.0
  port: 8080
allow_partial_mapping: true
max_request_log_count: 50
request_log_expiration_secs: 300
random_seed: 42
mappings_file: ./mappings.json
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.listen_addr(), "0.0.0.0:8080");
        assert!(settings.allow_partial_mapping);
        assert_eq!(settings.max_request_log_count, 50);
        assert_eq!(settings.random_seed, Some(42));
        assert_eq!(settings.mappings_file, Some(PathBuf::from("./mappings.json")));
    }

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.listen.port, 9091);
        assert!(!settings.allow_partial_mapping);
        assert_eq!(settings.max_request_log_count, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_validate_rejects_zero_log_size() {
        let settings = Settings {
            max_request_log_count: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen:\n  port: 7000").unwrap();
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.listen.port, 7000);

        assert!(Settings::from_file("/nonexistent/mockwire.yaml").is_err());
    }
}
