//! Graceful Shutdown Handler
//!
//! Handles OS signals and performs graceful shutdown of the application.

use super::{Application, InitializerOptions, Result, StageRegistry};
use std::process::ExitCode;
use tokio::signal;

/// Name of the bootstrap initializer installed by
/// [`ApplicationBuilder::exit_on_signal`](super::ApplicationBuilder::exit_on_signal)
pub const SHUTDOWN_HANDLERS: &str = "app.shutdownHandlers";

/// Handles graceful shutdown of the application
///
/// ShutdownHandler listens for OS signals (SIGINT, SIGTERM, SIGHUP) and
/// runs the application's shutdown, reporting the outcome as an exit code.
///
/// # Example
///
/// ```rust,ignore
/// use bootstage::lifecycle::ShutdownHandler;
///
/// app.start().await?;
/// let code = ShutdownHandler::new(app.clone()).wait_for_shutdown().await;
/// return code;
/// ```
pub struct ShutdownHandler {
    app: Application,
}

impl ShutdownHandler {
    /// Create a new ShutdownHandler
    pub fn new(app: Application) -> Self {
        Self { app }
    }

    /// Wait for a shutdown signal, then shut the application down
    pub async fn wait_for_shutdown(&self) -> ExitCode {
        shutdown_signal().await;
        self.shutdown().await
    }

    /// Shut the application down and report how it went
    pub async fn shutdown(&self) -> ExitCode {
        let outcome = self.app.shutdown().await;
        match &outcome {
            Ok(()) => tracing::info!("Shutdown completed cleanly"),
            Err(e) => tracing::error!("Could not shutdown cleanly: {}", e),
        }
        exit_code(&outcome)
    }
}

/// Process status for an operation outcome: 0 on success, 1 on failure
pub fn exit_status<T>(outcome: &Result<T>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// [`exit_status`] as an [`ExitCode`]
pub fn exit_code<T>(outcome: &Result<T>) -> ExitCode {
    ExitCode::from(exit_status(outcome))
}

/// Register the bootstrap initializer that exits the process after a
/// signal-triggered shutdown
pub(crate) fn install(stages: &StageRegistry<Application>) -> Result<()> {
    let Some(first) = stages.order().first() else {
        return Ok(());
    };

    stages
        .up(first)?
        .initializer_sync(SHUTDOWN_HANDLERS, InitializerOptions::new(), |app| {
            tokio::spawn(async move {
                shutdown_signal().await;
                let outcome = app.shutdown().await;
                std::process::exit(i32::from(exit_status(&outcome)));
            });
            Ok(())
        });
    Ok(())
}

/// Create a future that completes when a shutdown signal is received
///
/// This is a standalone function that can be used without a ShutdownHandler.
///
/// # Example
///
/// ```rust,ignore
/// use bootstage::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         println!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = unix_signal(signal::unix::SignalKind::terminate(), "SIGTERM");
    #[cfg(unix)]
    let hangup = unix_signal(signal::unix::SignalKind::hangup(), "SIGHUP");

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
        _ = hangup => {
            tracing::info!("Received SIGHUP signal");
        },
    }
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind, label: &str) {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to install {} handler: {}", label, e);
            std::future::pending::<()>().await;
        }
    }
}
