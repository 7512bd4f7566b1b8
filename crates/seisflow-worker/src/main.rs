use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;

use seisflow_api_client::{AuthError, ProjectUploader};
use seisflow_core::{Config, ErrorMetadata};
use seisflow_infra::{init_telemetry, EmailService, Mailer, NoopMailer, NotificationDispatcher};
use seisflow_processing::ArchivePipeline;
use seisflow_worker::{QueueConsumer, SubmissionHandler};

/// Listens for Ctrl+C (SIGINT) and SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down after the in-flight message completes");
}

/// Auth-invalid failures abort startup; transient ones are retried lazily by the first upload.
fn check_startup_auth(result: Result<(), AuthError>, step: &str) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if !e.is_recoverable() => {
            tracing::error!(
                error = %e,
                error_code = e.error_code(),
                "Backend {} failed with a configuration problem",
                step
            );
            Err(e).with_context(|| format!("Backend {} failed", step))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                error_code = e.error_code(),
                "Backend {} failed, will retry on first submission",
                step
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    init_telemetry(config.log_format, &config.environment)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    config.validate()?;

    let (tokens, uploader) =
        seisflow_api_client::connect(&config.backend).context("Failed to create backend client")?;

    check_startup_auth(
        tokens.get_valid_access_token().await.map(|_| ()),
        "login",
    )?;
    if config.backend.preflight_probe {
        check_startup_auth(tokens.probe().await.map(|_| ()), "token probe")?;
    }

    let mailer: Arc<dyn Mailer> = match EmailService::from_config(&config.email)
        .context("Failed to configure email")?
    {
        Some(service) => Arc::new(service),
        None => Arc::new(NoopMailer),
    };
    let notifier = Arc::new(NotificationDispatcher::new(
        mailer,
        config.email.internal_recipients.clone(),
        config.email.bcc_recipients.clone(),
        config.download_base_url.clone(),
    ));

    let uploader: Arc<dyn ProjectUploader> = Arc::new(uploader);
    let handler = Arc::new(SubmissionHandler::new(
        Arc::new(ArchivePipeline::new()),
        uploader,
        notifier,
        config.work_dir.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    tracing::info!(
        environment = %config.environment,
        work_dir = %config.work_dir.display(),
        "Seisflow worker started"
    );
    let mut consumer = QueueConsumer::new(config.broker.clone(), handler);
    consumer.run(shutdown_rx).await?;
    Ok(())
}
