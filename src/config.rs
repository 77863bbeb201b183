use crate::error::{BeatError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\??([^}:-]+)(?::-([^}]*))?\}").expect("env var pattern is valid")
});

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub beat: BeatConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BeatConfig {
    #[serde(with = "humantime_serde", default = "default_period")]
    pub period: Duration,
    #[serde(default)]
    pub bootstrap_servers: String,
    /// Topics to monitor. Absent or empty means every topic known at start-up.
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    /// Groups to monitor. Absent means every group known at start-up; an
    /// explicit empty list monitors no group at all.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub topic_blacklist: Vec<String>,
    #[serde(default)]
    pub group_blacklist: Vec<String>,
    #[serde(with = "humantime_serde", default = "default_kafka_timeout")]
    pub kafka_timeout: Duration,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_max_concurrent_groups")]
    pub max_concurrent_groups: usize,
    #[serde(default)]
    pub client_properties: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Write every event as a JSON line to stdout.
    #[serde(default = "default_true")]
    pub stdout: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_period() -> Duration {
    Duration::from_secs(1)
}

fn default_kafka_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_concurrent_groups() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { stdout: true }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        if !Path::new(path).exists() {
            return Err(BeatError::Config(format!(
                "Configuration file not found: {path}"
            )));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        let content = Self::substitute_env_vars(content);

        let config: Config = toml::from_str(&content)
            .map_err(|e| BeatError::Config(format!("TOML parse error: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn substitute_env_vars(content: &str) -> String {
        // ${VAR}, ${?VAR}: value or empty string
        // ${VAR:-default}: value or "default"
        ENV_VAR_PATTERN
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default_value = caps.get(2).map_or("", |m| m.as_str());
                std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
            })
            .to_string()
    }

    pub fn validate(&self) -> Result<()> {
        self.beat.validate()
    }
}

impl BeatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(BeatError::Config(
                "bootstrap_servers must name at least one cluster address".to_string(),
            ));
        }

        if self.period.is_zero() {
            return Err(BeatError::Config("period must be greater than zero".to_string()));
        }

        if self.max_concurrent_fetches == 0 || self.max_concurrent_groups == 0 {
            return Err(BeatError::Config(
                "max_concurrent_fetches and max_concurrent_groups must be at least 1".to_string(),
            ));
        }

        self.compile_filters()?;
        Ok(())
    }

    /// Explicitly configured topics, `None` when they must be discovered.
    pub fn explicit_topics(&self) -> Option<&[String]> {
        self.topics
            .as_deref()
            .filter(|topics| !topics.is_empty())
    }

    pub fn explicit_groups(&self) -> Option<&[String]> {
        self.groups.as_deref()
    }

    pub fn compile_filters(&self) -> Result<DiscoveryFilters> {
        let topic_blacklist = self
            .topic_blacklist
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let group_blacklist = self
            .group_blacklist
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DiscoveryFilters {
            topic_blacklist,
            group_blacklist,
        })
    }
}

/// Exclusion patterns applied to discovered topic and group names only.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilters {
    pub topic_blacklist: Vec<Regex>,
    pub group_blacklist: Vec<Regex>,
}

impl DiscoveryFilters {
    pub fn keeps_topic(&self, topic: &str) -> bool {
        !self.topic_blacklist.iter().any(|r| r.is_match(topic))
    }

    pub fn keeps_group(&self, group: &str) -> bool {
        !self.group_blacklist.iter().any(|r| r.is_match(group))
    }
}
