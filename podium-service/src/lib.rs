//! Podium Service - Composition Root
//!
//! Loads configuration, installs telemetry and wires stores, engine, write
//! strategy and relays into a [`Podium`] the `podiumd` binary runs.

pub mod error;
pub mod telemetry;
pub mod wiring;

pub use error::{ServiceError, ServiceResult};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, DEFAULT_LOG_FILTER};
pub use wiring::{Podium, SourceBackend};
