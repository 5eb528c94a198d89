//! Error types for Podium operations

use crate::identity::{LeaderboardName, PlayerId};
use thiserror::Error;

/// Fast-path cache (ranked set / detail store) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },

    #[error("Cache transaction aborted at step {step}: {reason}")]
    TransactionAborted { step: usize, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Source-of-record errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },

    #[error("Upsert rejected for {leaderboard}/{player_id}: {reason}")]
    UpsertRejected {
        leaderboard: String,
        player_id: String,
        reason: String,
    },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Input validation errors. Raised before any I/O.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid range [{start}, {end}]: {reason}")]
    InvalidRange { start: u64, end: u64, reason: String },
}

/// Write-behind relay and messaging errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("Delivery of intention {intention} failed after {attempts} attempts: {reason}")]
    DeliveryFailed {
        intention: String,
        attempts: u32,
        reason: String,
    },

    #[error("Malformed intention payload: {reason}")]
    Malformed { reason: String },

    #[error("Channel {channel} failed: {reason}")]
    Channel { channel: String, reason: String },

    #[error("Durable log {stream} failed: {reason}")]
    Log { stream: String, reason: String },

    #[error("Broker queue {queue} failed: {reason}")]
    Broker { queue: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Error categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    CacheUnavailable,
    StoreUnavailable,
    RelayDeliveryFailure,
    Cancelled,
    Config,
}

/// Master error type for all Podium errors.
#[derive(Debug, Clone, Error)]
pub enum PodiumError {
    #[error("Player {player_id} not found on leaderboard {leaderboard}")]
    NotFound {
        leaderboard: LeaderboardName,
        player_id: PlayerId,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl PodiumError {
    pub fn not_found(leaderboard: &LeaderboardName, player_id: &PlayerId) -> Self {
        PodiumError::NotFound {
            leaderboard: leaderboard.clone(),
            player_id: player_id.clone(),
        }
    }

    pub fn cache_unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PodiumError::Cache(CacheError::Unavailable {
            operation: operation.into(),
            reason: reason.into(),
        })
    }

    pub fn store_unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        PodiumError::Store(StoreError::Unavailable {
            operation: operation.into(),
            reason: reason.into(),
        })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PodiumError::NotFound { .. } => ErrorKind::NotFound,
            PodiumError::Cache(_) => ErrorKind::CacheUnavailable,
            PodiumError::Store(_) => ErrorKind::StoreUnavailable,
            PodiumError::Validation(_) => ErrorKind::InvalidArgument,
            PodiumError::Relay(_) => ErrorKind::RelayDeliveryFailure,
            PodiumError::Config(_) => ErrorKind::Config,
            PodiumError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether a relay may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PodiumError::Store(StoreError::Unavailable { .. } | StoreError::LockPoisoned)
        )
    }
}

/// Result type alias for Podium operations.
pub type PodiumResult<T> = Result<T, PodiumError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = PodiumError::not_found(
            &LeaderboardName::global(),
            &PlayerId::new("p9").unwrap(),
        );
        let msg = format!("{}", err);
        assert!(msg.contains("p9"));
        assert!(msg.contains("global"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_cache_error_display_transaction_aborted() {
        let err = CacheError::TransactionAborted {
            step: 3,
            reason: "publish failed".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("step 3"));
        assert!(msg.contains("publish failed"));
    }

    #[test]
    fn test_relay_error_display_delivery_failed() {
        let err = RelayError::DeliveryFailed {
            intention: "abc".to_string(),
            attempts: 4,
            reason: "store down".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("abc"));
        assert!(msg.contains("4 attempts"));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PodiumError::cache_unavailable("get_score", "refused").kind(),
            ErrorKind::CacheUnavailable
        );
        assert_eq!(
            PodiumError::store_unavailable("upsert", "timeout").kind(),
            ErrorKind::StoreUnavailable
        );
        let validation = PodiumError::from(ValidationError::RequiredFieldMissing {
            field: "player_id".to_string(),
        });
        assert_eq!(validation.kind(), ErrorKind::InvalidArgument);
        let relay = PodiumError::from(RelayError::Malformed {
            reason: "eof".to_string(),
        });
        assert_eq!(relay.kind(), ErrorKind::RelayDeliveryFailure);
        assert_eq!(PodiumError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_only_store_unavailability_is_retryable() {
        assert!(PodiumError::store_unavailable("upsert", "timeout").is_retryable());
        assert!(!PodiumError::cache_unavailable("set_score", "down").is_retryable());
        assert!(!PodiumError::from(RelayError::Malformed {
            reason: "bad".to_string()
        })
        .is_retryable());
        assert!(!PodiumError::Cancelled.is_retryable());
    }
}
