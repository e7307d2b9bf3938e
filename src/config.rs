use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Central configuration for apiprobe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub probe: ProbeConfig,
    pub rules: ReplyRules,
    pub limits: LimitsConfig,
}

/// What gets sent to each candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Path the probe request is POSTed to.
    pub api_path: String,
    /// JSON payload of the probe request.
    pub payload: serde_json::Value,
    /// Headers sent with every probe request.
    pub headers: BTreeMap<String, String>,
    /// Port assumed for input lines that carry no port.
    pub default_port: u16,
}

/// Rules the classifier applies to a 200 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyRules {
    /// Every word must appear in the response text for an `ok` verdict.
    pub include_words: Vec<String>,
    /// A match anywhere in the response text means garbled output.
    pub fail_regex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub timeout_ms: u64,
    pub concurrency: usize,
    /// Latencies above this are recorded as anomalous rather than trusted.
    pub max_latency_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "*/*".to_string());
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.9".to_string());

        Self {
            probe: ProbeConfig {
                api_path: "/translate".to_string(),
                payload: serde_json::json!({
                    "text": "Hello, world!",
                    "source_lang": "EN",
                    "target_lang": "ZH",
                }),
                headers,
                default_port: 1188,
            },
            rules: ReplyRules {
                include_words: vec!["你好".to_string(), "世界".to_string()],
                fail_regex: r"[\[\]{}()0-9]".to_string(),
            },
            limits: LimitsConfig {
                timeout_ms: 10_000,
                concurrency: 64,
                max_latency_ms: 60_000,
            },
        }
    }
}

impl Config {
    /// Load configuration from the standard config directory
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to the standard config directory
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("apiprobe");
        path.push("config.json");
        path
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.limits.timeout_ms == 0 {
            return Err(anyhow::anyhow!("timeout_ms must be greater than 0"));
        }

        if self.limits.concurrency == 0 {
            return Err(anyhow::anyhow!("concurrency must be greater than 0"));
        }

        if self.probe.default_port == 0 {
            return Err(anyhow::anyhow!("default_port must be greater than 0"));
        }

        if !self.probe.api_path.starts_with('/') {
            return Err(anyhow::anyhow!("api_path must start with '/'"));
        }

        if let Err(e) = Regex::new(&self.rules.fail_regex) {
            return Err(anyhow::anyhow!(
                "fail_regex '{}' does not compile: {}",
                self.rules.fail_regex,
                e
            ));
        }

        Ok(())
    }

    /// Create a minimal config for testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let mut config = Self::default();
        config.limits.timeout_ms = 100;
        config.limits.concurrency = 4;
        config.rules.include_words = vec!["hello".to_string()];
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.limits.timeout_ms, deserialized.limits.timeout_ms);
        assert_eq!(config.probe.api_path, deserialized.probe.api_path);
        assert_eq!(config.rules.include_words, deserialized.rules.include_words);
    }

    #[test]
    fn test_bad_regex_rejected() {
        let mut config = Config::test_config();
        config.rules.fail_regex = "[unclosed".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::test_config();
        config.limits.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
