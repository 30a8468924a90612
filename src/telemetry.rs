//! Tracing subscriber setup

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::ReplicaError;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), ReplicaError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("feed_replica={}", logging.level).into());

    let result = if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    };

    result.map_err(|e| ReplicaError::Internal(anyhow::anyhow!(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };

        assert!(init_tracing(&logging).is_ok());
        assert!(matches!(
            init_tracing(&logging),
            Err(ReplicaError::Internal(_))
        ));
    }
}
