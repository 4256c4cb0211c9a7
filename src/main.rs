use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use image_processor::app;
use image_processor::config::settings::AppConfig;
use image_processor::workers::processor::ImageWorker;

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("image_processor=info")))
        .init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting image processor...");

    let config = AppConfig::new().context("Invalid configuration")?;
    let state = app::create_state(&config).await?;

    let cancel = CancellationToken::new();
    let worker = ImageWorker::new(state, config.worker.clone());
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run(cancel).await }
    });

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, waiting for worker to finish");
    cancel.cancel();
    handle.await.context("Worker task panicked")?;

    Ok(())
}
