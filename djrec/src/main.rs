use anyhow::Context;
use djconfig::{Config, get_config};
use djrecorder::{
    Recorder, RecorderConfigExt, StatusClient, StreamClient, notifier_for, spawn_status_poller,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// RUST_LOG wins over the configured level
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .get_log_min_level()
            .unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();
    init_logging(&config);

    let settings = config
        .recorder_settings()
        .context("Invalid recorder configuration")?;

    info!(
        config = %config.get_config_dir(),
        output = %settings.output_dir.display(),
        metadata = %settings.metadata_source,
        "djrec starting"
    );

    // ========== Clients ==========

    let status = StatusClient::builder()
        .url(&settings.status_url)
        .idle_dj(&settings.idle_dj)
        .timeout(settings.request_timeout)
        .user_agent(&settings.user_agent)
        .build()
        .await
        .context("Cannot build status client")?;

    let stream = StreamClient::with_options(
        &settings.stream_url,
        &settings.user_agent,
        settings.request_timeout,
    )
    .context("Cannot build stream client")?;

    let notifier = notifier_for(settings.hook.clone());

    // ========== Polling & recording ==========

    let cancel = CancellationToken::new();
    let (mut statuses, poller) =
        spawn_status_poller(Arc::new(status), settings.poll_interval, cancel.clone());

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping");
            ctrl_c.cancel();
        }
    });

    let mut recorder = Recorder::new(settings, Arc::new(stream), notifier);
    let result = recorder.run(&mut statuses, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = poller.await {
        tracing::warn!("Status poller failed: {}", e);
    }

    result.context("Recording stopped")?;
    info!("djrec stopped");
    Ok(())
}
