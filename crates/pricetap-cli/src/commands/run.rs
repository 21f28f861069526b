use pricetap_core::PriceService;
use serde_json::Value;
use tokio::signal;

use crate::error::CliError;

/// Collect on the configured cadence until Ctrl-C or SIGTERM.
pub async fn run(service: &PriceService) -> Result<Value, CliError> {
    service.start_scheduler();
    tracing::info!("pricetap running, press Ctrl-C to stop");

    shutdown_signal().await;
    tracing::info!("shutting down");
    service.shutdown().await;

    Ok(serde_json::to_value(service.scheduler_status())?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => tracing::error!(%error, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
