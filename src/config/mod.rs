use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub presentation: PresentationConfig,
    pub storage: StorageConfig,
    pub fetcher: FetcherConfig,
    pub merge: MergeConfig,
    pub delivery: DeliveryConfig,
    pub remote_storage: RemoteStorageConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Host (optionally with port) serving `/presentation/<meeting_id>/`.
    pub server: String,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            server: "bbb.local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent directory of every per-meeting working directory.
    pub downloads_dir: PathBuf,
    /// Playback template bundle copied into each finished working directory.
    pub template_dir: Option<PathBuf>,
    pub template_version: String,
    /// Container extension of the combined deliverable.
    pub output_format: String,
    /// Output base name used when the run key is a bare meeting id.
    pub default_output_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: global::downloads_dir()
                .unwrap_or_else(|_| PathBuf::from("downloadedMeetings")),
            template_dir: None,
            template_version: "3.1.1".to_string(),
            output_format: "mp4".to_string(),
            default_output_name: "combine-output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloaderKind {
    /// Use curl when it is installed, plain HTTP otherwise.
    #[default]
    Auto,
    Curl,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub downloader: DownloaderKind,
    /// Upper bound for a single asset transfer.
    pub timeout_seconds: u64,
    pub show_progress: bool,
    pub accept_invalid_certs: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            downloader: DownloaderKind::Auto,
            timeout_seconds: 3600,
            show_progress: false,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Both tracks are scaled to this height before being stacked.
    pub height: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Public base URL the downloads directory is served from.
    pub download_server: String,
    /// Public base URL of this service, used to build upload links.
    pub public_api_url: String,
    /// Remote storage folder suggested in upload links.
    pub recording_folder: String,
    pub sender: String,
    pub subject: String,
    /// Shell command receiving the rendered message on stdin (e.g. `sendmail -t`).
    /// Notices are only logged when empty.
    pub notify_command: String,
    pub notify_timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            download_server: String::new(),
            public_api_url: "http://127.0.0.1:8000".to_string(),
            recording_folder: "Recordings".to_string(),
            sender: String::new(),
            subject: "Dirección de descarga de la grabación".to_string(),
            notify_command: String::new(),
            notify_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteStorageConfig {
    pub api_url: String,
    pub webdav_api: String,
    pub timeout_seconds: u64,
}

impl Default for RemoteStorageConfig {
    fn default() -> Self {
        Self {
            api_url: "https://nextcloud.local".to_string(),
            webdav_api: "remote.php/dav".to_string(),
            timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let mut config = Self::default();
            config.save()?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let mut config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.apply_env_overrides();

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Deployment environment variables win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup("BBB_SERVER") {
            self.presentation.server = server;
        }
        if let Some(server) = lookup("DOWNLOAD_SERVER") {
            self.delivery.download_server = server;
        }
        if let Some(url) = lookup("NEXT_CLOUD_API_URL") {
            self.remote_storage.api_url = url;
        }
        if let Some(api) = lookup("NEXT_CLOUD_WEBDAV_API") {
            self.remote_storage.webdav_api = api;
        }
        if let Some(host) = lookup("API_HOST") {
            self.api.host = host;
        }
        if let Some(raw) = lookup("API_PORT") {
            match raw.parse::<u16>() {
                Ok(port) => self.api.port = port,
                Err(_) => warn!("Ignoring invalid API_PORT value {:?}", raw),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
