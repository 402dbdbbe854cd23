//! Upload of finished recordings into a user's remote (WebDAV) drive.

pub mod credentials;
pub mod webdav;

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::RemoteStorageConfig;

pub use credentials::XBearer;
pub use webdav::WebDavClient;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("the url {url} cannot be accessed: {message}")]
    Unreachable { url: String, message: String },
    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// Every incremental prefix of `folder_path`, empty segments skipped:
/// `"a//b/"` gives `["a", "a/b"]`.
pub fn expand_folder_path(folder_path: &str) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    for segment in folder_path.split('/').filter(|segment| !segment.is_empty()) {
        let next = match expanded.last() {
            Some(parent) => format!("{}/{}", parent, segment),
            None => segment.to_string(),
        };
        expanded.push(next);
    }
    expanded
}

pub struct RecordingUploader {
    client: Client,
    config: RemoteStorageConfig,
}

impl RecordingUploader {
    pub fn new(config: &RemoteStorageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Creates `folder_path` folder by folder in the user's drive, downloads
    /// `recording_url` and stores it there. Returns the upload status code.
    pub async fn upload_recording(
        &self,
        bearer: &XBearer,
        folder_path: &str,
        recording_url: &str,
    ) -> Result<u16, StorageError> {
        let webdav = WebDavClient::new(self.client.clone(), &self.config, bearer);

        let folders = expand_folder_path(folder_path);
        for folder in &folders {
            webdav.create_folder(folder).await?;
        }
        let target = folders.last().map(String::as_str).unwrap_or("");

        let (file_name, body) = webdav.get_file(recording_url).await?;
        info!(
            "Uploading {} ({} bytes) to {}/{}",
            file_name,
            body.len(),
            bearer.user,
            target
        );
        webdav.upload_file(target, &file_name, body).await
    }
}
