//! Startup and shutdown errors of the service process.

use podium_core::{ConfigError, PodiumError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Podium(#[from] PodiumError),

    #[error("Failed to initialize telemetry: {0}")]
    Telemetry(String),

    #[error("Signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
