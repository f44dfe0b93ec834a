use anyhow::{Context, Result};
use frownbully_core::{Config, DetectionStore, InferenceClient};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

mod logging;
mod notifier;
mod pipeline;
mod settings;

use notifier::DesktopNotifier;
use pipeline::{CameraSource, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let log_path = logging::init(&config.log_dir)?;

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id);

    async move {
        tracing::info!(log = %log_path.display(), "frownbullyd starting");

        // Fail fast on anything the loop cannot recover from.
        let inference = config
            .inference()
            .context("no API key configured (set FROWNBULLY_API_KEY or api_key in config.toml)")?;
        let classifier = InferenceClient::new(inference)?;

        let store = DetectionStore::open(&config.db_path)?
            .with_notification_threshold(config.alert_threshold);

        let source = CameraSource::new(settings::capture_settings(&config));
        let alerter = DesktopNotifier::new(config.notification_timeout);

        let cancel = CancellationToken::new();
        tokio::spawn(wait_for_shutdown(cancel.clone()));

        tracing::info!(
            device = %config.camera_device,
            db = %config.db_path.display(),
            model = %config.model_id,
            "frownbullyd ready"
        );

        let mut pipeline = Pipeline::new(
            source,
            classifier,
            store,
            alerter,
            settings::pipeline_settings(&config),
        );
        pipeline.run(cancel).await;

        tracing::info!("frownbullyd terminated by user");
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn wait_for_shutdown(token: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    tracing::info!("shutdown signal received");
    token.cancel();
}
