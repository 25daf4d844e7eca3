//! Demo configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RELAY_*)
//! - TOML configuration file
//! - `--config <path>` on the command line

use anyhow::{Context, Result};
use relay_core::{RouterConfig, Topic};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Router settings.
    #[serde(default)]
    pub router: RouterConfig,

    /// Publisher and subscriber settings for `relay run`.
    #[serde(default)]
    pub demo: DemoConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Demo traffic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Topics to publish to and subscribe on.
    #[serde(default = "default_topics")]
    pub topics: Vec<Topic>,

    /// Delay between two published messages, per topic.
    #[serde(default = "default_publish_interval")]
    pub publish_interval_ms: u64,

    /// Messages published per topic. `0` publishes until Ctrl+C.
    #[serde(default = "default_message_count")]
    pub message_count: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_topics() -> Vec<Topic> {
    vec![Topic::new("users.created").expect("static topic name is valid")]
}

fn default_publish_interval() -> u64 {
    std::env::var("RELAY_PUBLISH_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(500)
}

fn default_message_count() -> u64 {
    std::env::var("RELAY_MESSAGE_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5)
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            demo: DemoConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            publish_interval_ms: default_publish_interval(),
            message_count: default_message_count(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// `RELAY_TOPICS` names an invalid topic.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_paths()?,
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn from_default_paths() -> Result<Self> {
        let config_paths = [
            "relay.toml",
            "/etc/relay/relay.toml",
            "~/.config/relay/relay.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(topics) = std::env::var("RELAY_TOPICS") {
            self.demo.topics = parse_topic_list(&topics).context("Invalid RELAY_TOPICS")?;
        }
        Ok(())
    }
}

/// Parse a comma separated topic list.
fn parse_topic_list(list: &str) -> Result<Vec<Topic>> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| Topic::new(name).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Dispatch;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.router.subscription_capacity, 200);
        assert_eq!(config.router.dispatch, Dispatch::Spawn);
        assert_eq!(config.demo.topics, vec![Topic::new("users.created").unwrap()]);
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [router]
            subscription_capacity = 64
            dispatch = "inline"

            [demo]
            topics = ["users", "orders.placed"]
            message_count = 0

            [metrics]
            enabled = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.router.subscription_capacity, 64);
        assert_eq!(config.router.dispatch, Dispatch::Inline);
        assert_eq!(config.demo.topics.len(), 2);
        assert_eq!(config.demo.topics[1].as_str(), "orders.placed");
        assert_eq!(config.demo.message_count, 0);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_config_rejects_invalid_topic() {
        let toml_str = r#"
            [demo]
            topics = ["users", "bad topic"]
        "#;

        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_parse_topic_list() {
        let topics = parse_topic_list("users, orders ,,events.v2").unwrap();
        let names: Vec<&str> = topics.iter().map(Topic::as_str).collect();
        assert_eq!(names, vec!["users", "orders", "events.v2"]);

        assert!(parse_topic_list("users,no/slash").is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/relay.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
