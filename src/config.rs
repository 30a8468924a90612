//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ReplicaError;

/// Main replica configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaConfig {
    pub feed: FeedConfig,
    pub notifications: PageConfig,
    pub comments: PageConfig,
    pub reconciliation: ReconciliationConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,
}

/// Feed pagination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Items requested per page from each source (default: 25)
    pub page_size: u32,
    /// Sort order for the explore source (default: "TOP_COMMENTED")
    pub explore_sort: String,
    /// Publication kinds requested from the explore source
    pub publication_kinds: Vec<String>,
}

/// Single-source pagination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    /// Items requested per page (default: 25)
    pub page_size: u32,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
    /// Polls before giving up (default: 5)
    pub max_attempts: u32,
    /// Wait before each poll in seconds (default: 5)
    pub interval_seconds: u64,
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Publication metadata configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// Application id stamped into publication metadata
    pub app_id: String,
    /// Locale stamped into publication metadata
    pub locale: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig {
                page_size: 25,
                explore_sort: "TOP_COMMENTED".to_string(),
                publication_kinds: vec![
                    "POST".to_string(),
                    "COMMENT".to_string(),
                    "MIRROR".to_string(),
                ],
            },
            notifications: PageConfig { page_size: 25 },
            comments: PageConfig { page_size: 25 },
            reconciliation: ReconciliationConfig {
                max_attempts: 5,
                interval_seconds: 5,
            },
            publish: PublishConfig {
                app_id: "feed-replica".to_string(),
                locale: "en".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl ReplicaConfig {
    /// Load configuration from files and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEED_REPLICA__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, ReplicaError> {
        use config::{Environment, File};

        let config = Self::builder_with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEED_REPLICA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ReplicaError::from(e).recorded())?;

        Self::finish(config)
    }

    /// Load configuration from an explicit file layered over the defaults
    pub fn from_file(path: &Path) -> Result<Self, ReplicaError> {
        use config::File;

        let config = Self::builder_with_defaults()?
            .add_source(File::from(path))
            .build()
            .map_err(|e| ReplicaError::from(e).recorded())?;

        Self::finish(config)
    }

    fn builder_with_defaults()
    -> Result<config::ConfigBuilder<config::builder::DefaultState>, ReplicaError> {
        let builder = config::Config::builder()
            .set_default("feed.page_size", 25)?
            .set_default("feed.explore_sort", "TOP_COMMENTED")?
            .set_default("feed.publication_kinds", vec!["POST", "COMMENT", "MIRROR"])?
            .set_default("notifications.page_size", 25)?
            .set_default("comments.page_size", 25)?
            .set_default("reconciliation.max_attempts", 5)?
            .set_default("reconciliation.interval_seconds", 5)?
            .set_default("publish.app_id", "feed-replica")?
            .set_default("publish.locale", "en")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;
        Ok(builder)
    }

    fn finish(config: config::Config) -> Result<Self, ReplicaError> {
        let replica_config: Self = config
            .try_deserialize()
            .map_err(|e| ReplicaError::Config(e.to_string()).recorded())?;
        replica_config.validate()?;
        Ok(replica_config)
    }

    /// Check value ranges; failures are counted in `errors_total`
    pub(crate) fn validate(&self) -> Result<(), ReplicaError> {
        self.check().map_err(ReplicaError::recorded)
    }

    fn check(&self) -> Result<(), ReplicaError> {
        for (key, page_size) in [
            ("feed.page_size", self.feed.page_size),
            ("notifications.page_size", self.notifications.page_size),
            ("comments.page_size", self.comments.page_size),
        ] {
            if page_size == 0 {
                return Err(ReplicaError::Config(format!(
                    "{key} must be greater than 0"
                )));
            }
        }

        if self.reconciliation.max_attempts == 0 {
            return Err(ReplicaError::Config(
                "reconciliation.max_attempts must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ReplicaError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        if self.reconciliation.interval_seconds == 0 {
            tracing::warn!("reconciliation.interval_seconds=0 polls the remote back to back");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ReplicaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconciliation.interval(), Duration::from_secs(5));
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let mut config = ReplicaConfig::default();
        config.comments.page_size = 0;

        let error = config
            .validate()
            .expect_err("zero page size must fail");
        assert!(matches!(
            error,
            ReplicaError::Config(message) if message.contains("comments.page_size")
        ));
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut config = ReplicaConfig::default();
        config.reconciliation.max_attempts = 0;

        assert!(matches!(
            config.validate(),
            Err(ReplicaError::Config(message)) if message.contains("max_attempts")
        ));
    }

    #[test]
    fn validation_failures_are_counted() {
        use crate::metrics::ERRORS_TOTAL;

        let before = ERRORS_TOTAL.with_label_values(&["config"]).get();
        let mut config = ReplicaConfig::default();
        config.feed.page_size = 0;

        assert!(config.validate().is_err());
        assert!(ERRORS_TOTAL.with_label_values(&["config"]).get() > before);
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = ReplicaConfig::default();
        config.logging.format = "xml".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[feed]\npage_size = 10\n\n[reconciliation]\nmax_attempts = 3"
        )
        .unwrap();

        let config = ReplicaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.feed.page_size, 10);
        assert_eq!(config.reconciliation.max_attempts, 3);
        // Untouched keys keep their defaults
        assert_eq!(config.reconciliation.interval_seconds, 5);
        assert_eq!(config.feed.explore_sort, "TOP_COMMENTED");
        assert_eq!(config.feed.publication_kinds.len(), 3);
    }
}
