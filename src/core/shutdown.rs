use tokio::signal;

async fn interrupt() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

/// Resolves when SIGINT or SIGTERM arrives; drives axum's graceful shutdown.
pub(crate) async fn shutdown_signal() {
    tokio::select! {
        _ = interrupt() => tracing::info!("Received interrupt, shutting down"),
        _ = terminate() => tracing::info!("Received SIGTERM, shutting down"),
    }
}
