//! Asset retrieval from the presentation server.
//!
//! Downloads the fixed asset set of a meeting strictly in order. Every
//! transfer is bracketed by two ledger writes (pending, then result) so a
//! crashed run shows exactly which asset it was working on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::error::{FetchError, PipelineError};
use super::ledger::{self, RunLedger};
use super::workdir::WorkingDirectory;
use crate::config::{DownloaderKind, FetcherConfig};

/// One of the fixed files requested from `base_url`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Metadata,
    PrimaryVideo,
    SecondaryVideo,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Metadata, Asset::PrimaryVideo, Asset::SecondaryVideo];

    pub fn relative_path(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata.xml",
            Self::PrimaryVideo => "video/webcams.mp4",
            Self::SecondaryVideo => "deskshare/deskshare.mp4",
        }
    }
}

/// Whether both tracks should be merged or the primary track shipped alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineDecision {
    Merge,
    PrimaryOnly,
}

impl CombineDecision {
    pub fn is_merge(&self) -> bool {
        matches!(self, Self::Merge)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Retrieves `url` into `dest`. A failed transfer leaves nothing at `dest`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// In-process HTTP download with optional progress reporting.
pub struct HttpTransport {
    client: Client,
    show_progress: bool,
}

impl HttpTransport {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            show_progress: config.show_progress,
        })
    }

    fn progress_bar(&self, total: Option<u64>, url: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let bar = match total {
            Some(len) => ProgressBar::new(len),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) = ProgressStyle::with_template(
            "Download |{bar:30}| {eta} {bytes}/{total_bytes} at {bytes_per_sec} {msg}",
        ) {
            bar.set_style(style);
        }
        bar.set_message(url.rsplit('/').next().unwrap_or_default().to_string());
        Some(bar)
    }

    async fn write_body(
        response: &mut reqwest::Response,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressBar>,
    ) -> Result<(), FetchError> {
        let io_error = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| request_error(url, err))?
        {
            file.write_all(&chunk).await.map_err(io_error)?;
            if let Some(bar) = progress {
                bar.inc(chunk.len() as u64);
            }
        }
        file.flush().await.map_err(io_error)?;
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| request_error(url, err))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let progress = self.progress_bar(response.content_length(), url);
        let result = Self::write_body(&mut response, url, dest, progress.as_ref()).await;
        if let Some(bar) = progress {
            bar.finish_and_clear();
        }
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    FetchError::Request {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Delegates transfers to an installed `curl` binary.
pub struct CurlTransport {
    program: String,
    timeout_seconds: u64,
    insecure: bool,
}

impl CurlTransport {
    pub fn new(program: impl Into<String>, config: &FetcherConfig) -> Self {
        Self {
            program: program.into(),
            timeout_seconds: config.timeout_seconds,
            insecure: config.accept_invalid_certs,
        }
    }

    /// Locates curl on `PATH`.
    pub fn detect(config: &FetcherConfig) -> Option<Self> {
        which::which("curl")
            .ok()
            .map(|path| Self::new(path.to_string_lossy().to_string(), config))
    }
}

#[async_trait]
impl Transport for CurlTransport {
    fn name(&self) -> &'static str {
        "curl"
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(["--silent", "--show-error", "--location", "--fail"])
            .args(["--max-time", &self.timeout_seconds.to_string()])
            .args(["--write-out", "%{http_code}"])
            .arg("--output")
            .arg(dest);
        if self.insecure {
            command.arg("--insecure");
        }
        command.arg(url);

        let output = command.output().await.map_err(|err| FetchError::Downloader {
            url: url.to_string(),
            message: format!("failed to launch {}: {}", self.program, err),
        })?;

        if output.status.success() {
            return Ok(());
        }

        let _ = tokio::fs::remove_file(dest).await;
        let http_code = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<u16>()
            .unwrap_or(0);
        match http_code {
            404 => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            code if code >= 400 => Err(FetchError::Status {
                url: url.to_string(),
                status: code,
            }),
            _ => Err(FetchError::Downloader {
                url: url.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// Picks the transport strategy named by `config`.
pub fn select_transport(config: &FetcherConfig) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match config.downloader {
        DownloaderKind::Http => Box::new(HttpTransport::new(config)?),
        DownloaderKind::Curl => Box::new(
            CurlTransport::detect(config).context("downloader = \"curl\" but curl is not installed")?,
        ),
        DownloaderKind::Auto => match CurlTransport::detect(config) {
            Some(curl) => Box::new(curl),
            None => {
                warn!("curl not found, using the built-in HTTP downloader instead");
                Box::new(HttpTransport::new(config)?)
            }
        },
    };
    info!("Using {} downloader", transport.name());
    Ok(transport)
}

/// Result of one fetch pass.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub ledger: RunLedger,
    pub decision: CombineDecision,
}

pub struct AssetFetcher {
    transport: Box<dyn Transport>,
}

impl AssetFetcher {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &FetcherConfig) -> Result<Self> {
        Ok(Self::new(select_transport(config)?))
    }

    /// Downloads every asset into `workdir`. Transport failures are logged and
    /// skipped; only ledger persistence errors abort.
    pub async fn fetch_all(
        &self,
        base_url: &str,
        workdir: &WorkingDirectory,
        ledger: RunLedger,
    ) -> Result<FetchOutcome, PipelineError> {
        let mut decision = CombineDecision::Merge;
        let mut ledger = ledger;
        let total = Asset::ALL.len();

        for (index, asset) in Asset::ALL.iter().enumerate() {
            let relative = asset.relative_path();
            info!("[{}/{}] Downloading {}", index + 1, total, relative);

            let url = format!("{}{}", base_url, relative);
            let dest = workdir.path(relative);
            debug!("{} -> {:?}", url, dest);

            ledger = ledger.file_marked(relative, false);
            ledger::save(workdir, &ledger)?;

            match self.transport.fetch(&url, &dest).await {
                Ok(()) => {
                    ledger = ledger.file_marked(relative, true);
                    ledger::save(workdir, &ledger)?;
                }
                Err(err) if err.is_not_found() => {
                    if *asset == Asset::SecondaryVideo {
                        decision = CombineDecision::PrimaryOnly;
                    }
                    warn!("Did not download {} because of 404 error", relative);
                }
                Err(err) => {
                    error!("Failed to download {}: {}", relative, err);
                }
            }
        }

        Ok(FetchOutcome { ledger, decision })
    }
}

/// Stamps the ledger with the start time, runs the fetch and stamps the end.
pub(crate) async fn fetch_with_timestamps(
    fetcher: &AssetFetcher,
    base_url: &str,
    workdir: &WorkingDirectory,
    ledger: RunLedger,
) -> Result<FetchOutcome, PipelineError> {
    let ledger = ledger.download_started(Utc::now());
    ledger::save(workdir, &ledger)?;

    let outcome = fetcher.fetch_all(base_url, workdir, ledger).await?;

    let ledger = outcome.ledger.download_finished(Utc::now());
    ledger::save(workdir, &ledger)?;
    Ok(FetchOutcome {
        ledger,
        decision: outcome.decision,
    })
}
