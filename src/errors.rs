use std::{path::PathBuf, time::Duration};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuoterError>;

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Failures reported by an [`ExchangeAdapter`](crate::exchange::ExchangeAdapter).
///
/// The quoting core never looks inside these: every variant is treated as a
/// transient fault of the current cycle.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("exchange request failed: {0}")]
    Request(String),
    #[error("order rejected by exchange: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum QuoterError {
    #[error("market data unavailable: {0}")]
    MarketDataUnavailable(String),
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("invalid config: {field}: {why}")]
    ConfigurationInvalid { field: &'static str, why: String },
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    ConfigToml(#[from] toml::de::Error),
    #[error(transparent)]
    ConfigJson(#[from] serde_json::Error),
}

impl QuoterError {
    pub fn invalid_config(field: &'static str, why: impl Into<String>) -> Self {
        QuoterError::ConfigurationInvalid {
            field,
            why: why.into(),
        }
    }

    /// Startup faults that must keep the process from quoting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QuoterError::ConfigurationInvalid { .. }
                | QuoterError::ConfigIo { .. }
                | QuoterError::ConfigToml(_)
                | QuoterError::ConfigJson(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QuoterError::MarketDataUnavailable(_) => "market_data_unavailable",
            QuoterError::Adapter(AdapterError::Timeout { .. }) => "adapter_timeout",
            QuoterError::Adapter(_) => "adapter_error",
            _ => "configuration_invalid",
        }
    }
}
