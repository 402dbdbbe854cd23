use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::delivery::DeliveryService;
use crate::recording::RecordingPipeline;
use crate::storage::RecordingUploader;
use anyhow::{Context, Result};
use tracing::info;

pub async fn run_service() -> Result<()> {
    info!("Starting bbb-recording service");

    let config = Config::load()?;
    std::fs::create_dir_all(&config.storage.downloads_dir).with_context(|| {
        format!(
            "Failed to create downloads directory {:?}",
            config.storage.downloads_dir
        )
    })?;
    info!("Downloads directory: {:?}", config.storage.downloads_dir);
    if config.delivery.download_server.is_empty() {
        info!("delivery.download_server is not set, download links will be relative");
    }

    let pipeline = RecordingPipeline::from_config(&config)?;
    let delivery = DeliveryService::from_config(&config.delivery);
    let uploader = RecordingUploader::new(&config.remote_storage)?;

    let state = AppState::new(pipeline, delivery, uploader);
    ApiServer::new(&config.api, state).start().await
}
