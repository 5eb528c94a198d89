//! podiumd entry point
//!
//! Builds the service from environment configuration, runs the relay worker
//! until Ctrl-C, then stops every relay and logs what each delivered.

use podium_core::PodiumConfig;
use podium_service::{init_tracing, Podium, ServiceResult, SourceBackend, TelemetryConfig};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let telemetry = TelemetryConfig::from_env()?;
    init_tracing(&telemetry)?;

    let config = PodiumConfig::from_env()?;
    let backend = SourceBackend::from_env()?;
    tracing::info!(
        strategy = %config.strategy.write_strategy,
        source_backend = %backend,
        "Starting podiumd"
    );

    let podium = Podium::build(&config, backend.open()).await?;
    let running = podium.worker.clone().start();

    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");

    for report in running.shutdown().await {
        tracing::info!(
            relay = %report.kind,
            name = %report.name,
            applied = report.applied,
            retried = report.retried,
            dead_lettered = report.dead_lettered,
            dropped = report.dropped,
            "Relay report"
        );
    }

    signal?;
    Ok(())
}
