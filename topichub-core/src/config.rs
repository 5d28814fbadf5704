use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub redis: RedisConfig,
    pub replication: ReplicationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1234,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Deployment zone tag. Channel names are namespaced with it so
    /// deployments in different zones never collide on a topic name.
    pub zone: String,
    /// Bound on the identity-generation retry loop. Exhaustion is a fatal
    /// configuration error, not a runtime hazard.
    pub identity_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            zone: "rome".to_string(),
            identity_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Empty URL selects the in-memory provider (single-node mode).
    pub url: String,
    pub operation_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            operation_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Long-poll timeout for the listener's receive call, in seconds.
    pub poll_timeout_seconds: u64,
    /// Capacity of the outbound snapshot queue. Snapshots are dropped with
    /// a warning when full.
    pub publish_queue_capacity: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            poll_timeout_seconds: 20,
            publish_queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration with priority:
    /// 1. Environment variables (`TOPICHUB_*`, highest)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TOPICHUB")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Validate configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.registry.zone.is_empty() {
            errors.push("registry.zone must not be empty".to_string());
        }
        if self.registry.identity_attempts == 0 {
            errors.push("registry.identity_attempts must be at least 1".to_string());
        }
        if self.replication.poll_timeout_seconds == 0 {
            errors.push("replication.poll_timeout_seconds must be at least 1".to_string());
        }
        if self.replication.publish_queue_capacity == 0 {
            errors.push("replication.publish_queue_capacity must be at least 1".to_string());
        }
        if self.logging.format != "json" && self.logging.format != "pretty" {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP listen address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get Redis URL
    #[must_use]
    pub fn redis_url(&self) -> &str {
        &self.redis.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 1234);
        assert_eq!(config.registry.zone, "rome");
        assert_eq!(config.registry.identity_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 1234,
            },
            ..Config::default()
        };
        assert_eq!(config.http_address(), "127.0.0.1:1234");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.registry.identity_attempts = 0;
        config.logging.format = "xml".to_string();
        let errors = config.validate().expect_err("should fail validation");
        assert_eq!(errors.len(), 2);
    }
}
