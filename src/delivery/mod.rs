//! Delivery notification for finished recordings.
//!
//! One notice per working directory: the `EMAIL_SENT.txt` marker is written
//! after a successful send and turns every later attempt into a no-op.

pub mod metadata;
pub mod notice;
pub mod notifier;

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DeliveryConfig;
use crate::recording::{Asset, WorkingDirectory};

pub use metadata::{format_start_time, read_start_time};
pub use notice::{
    download_link, render_message, upload_link, validate_recipient, DeliveryNotice,
};
pub use notifier::{notifier_from_config, LogNotifier, Notifier, ShellCommandNotifier};

const UNKNOWN_START_TIME: &str = "unknown";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read start time from {path:?}: {message}")]
    Metadata { path: PathBuf, message: String },
    #[error("start time {0} is out of range")]
    InvalidStartTime(i64),
    #[error("invalid url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("{0:?} is not a valid recipient")]
    InvalidRecipient(String),
    #[error("notification failed: {0}")]
    Notify(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    AlreadySent,
}

/// Sends `message` unless `workdir` carries the sent marker, then writes it.
pub async fn deliver_once(
    workdir: &WorkingDirectory,
    notifier: &dyn Notifier,
    notice: &DeliveryNotice,
    message: &str,
) -> Result<DeliveryStatus, DeliveryError> {
    let marker = workdir.email_marker_path();
    if marker.is_file() {
        info!("email was already sent for {}", workdir.run_key());
        return Ok(DeliveryStatus::AlreadySent);
    }

    notifier.send(notice, message).await?;

    tokio::fs::write(&marker, b"")
        .await
        .map_err(|source| DeliveryError::Io {
            path: marker.clone(),
            source,
        })?;
    Ok(DeliveryStatus::Sent)
}

/// Builds and sends the notice for a finished working directory.
pub struct DeliveryService {
    config: DeliveryConfig,
    notifier: Box<dyn Notifier>,
}

impl DeliveryService {
    pub fn new(config: DeliveryConfig, notifier: Box<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.clone(), notifier_from_config(config))
    }

    pub fn download_link(&self, run_key: &str) -> String {
        download_link(&self.config.download_server, run_key)
    }

    pub async fn notify(
        &self,
        workdir: &WorkingDirectory,
        recipient: &str,
        meeting_name: &str,
    ) -> Result<DeliveryStatus, DeliveryError> {
        let start_time = self.start_time(workdir);
        let notice = DeliveryNotice::new(
            &self.config,
            recipient,
            meeting_name,
            workdir.run_key(),
            start_time,
        )?;
        let message = render_message(&notice, &self.config.sender, &self.config.subject);
        deliver_once(workdir, self.notifier.as_ref(), &notice, &message).await
    }

    fn start_time(&self, workdir: &WorkingDirectory) -> String {
        let metadata = workdir.path(Asset::Metadata.relative_path());
        match read_start_time(&metadata).and_then(format_start_time) {
            Ok(time) => time,
            Err(err) => {
                warn!("Sending notice without start time: {}", err);
                UNKNOWN_START_TIME.to_string()
            }
        }
    }
}
