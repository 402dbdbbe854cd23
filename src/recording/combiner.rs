//! Turns the downloaded tracks into one deliverable video and its archive.

use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::{MergeError, PipelineError};
use super::fetcher::{Asset, CombineDecision};
use super::identity::is_meeting_id;
use super::workdir::WorkingDirectory;
use crate::config::{MergeConfig, StorageConfig};

/// Paths of the artifacts written by one combine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineOutput {
    pub video: PathBuf,
    pub archive: PathBuf,
}

/// Side-by-side composition of two recordings into one file.
#[async_trait]
pub trait MergeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn merge(&self, left: &Path, right: &Path, output: &Path) -> Result<(), MergeError>;
}

pub struct FfmpegMerge {
    config: MergeConfig,
}

impl FfmpegMerge {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Check if FFmpeg is available on the system.
    pub fn is_available(&self) -> bool {
        which::which(&self.config.ffmpeg_path).is_ok()
    }

    async fn has_audio(&self, input: &Path) -> bool {
        let output = tokio::process::Command::new(&self.config.ffprobe_path)
            .args(["-v", "error", "-select_streams", "a"])
            .args(["-show_entries", "stream=index", "-of", "csv=p=0"])
            .arg(input)
            .output()
            .await;
        match output {
            Ok(output) if output.status.success() => !output.stdout.trim_ascii().is_empty(),
            Ok(_) => false,
            Err(err) => {
                // Without ffprobe, assume the track carries audio and let ffmpeg decide.
                warn!("Failed to probe {:?} for audio: {}", input, err);
                true
            }
        }
    }
}

/// Filter graph stacking both inputs at `height`, plus the audio mapping for
/// whichever inputs carry sound.
fn build_filter(height: u32, left_audio: bool, right_audio: bool) -> (String, Option<String>) {
    let mut filter = format!(
        "[0:v]scale=-2:{height}[left];[1:v]scale=-2:{height}[right];[left][right]hstack=inputs=2[v]"
    );
    let audio_map = match (left_audio, right_audio) {
        (true, true) => {
            filter.push_str(";[0:a][1:a]amix=inputs=2:duration=longest[a]");
            Some("[a]".to_string())
        }
        (true, false) => Some("0:a".to_string()),
        (false, true) => Some("1:a".to_string()),
        (false, false) => None,
    };
    (filter, audio_map)
}

#[async_trait]
impl MergeBackend for FfmpegMerge {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn merge(&self, left: &Path, right: &Path, output: &Path) -> Result<(), MergeError> {
        let left_audio = self.has_audio(left).await;
        let right_audio = self.has_audio(right).await;
        let (filter, audio_map) = build_filter(self.config.height, left_audio, right_audio);
        debug!("ffmpeg filter graph: {}", filter);

        let mut command = tokio::process::Command::new(&self.config.ffmpeg_path);
        command
            .args(["-hide_banner", "-nostdin", "-n"])
            .arg("-i")
            .arg(left)
            .arg("-i")
            .arg(right)
            .args(["-filter_complex", &filter])
            .args(["-map", "[v]"]);
        if let Some(map) = &audio_map {
            command.args(["-map", map]);
            command.args(["-c:a", &self.config.audio_codec]);
        }
        command.args(["-c:v", &self.config.video_codec]).arg(output);

        let result = command.output().await.map_err(|source| MergeError::Spawn {
            program: self.config.ffmpeg_path.clone(),
            source,
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(MergeError::Failed {
                program: self.config.ffmpeg_path.clone(),
                status: result.status.to_string(),
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }

        if !output.exists() {
            return Err(MergeError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

pub struct Combiner {
    backend: Box<dyn MergeBackend>,
    output_format: String,
    default_output_name: String,
}

impl Combiner {
    pub fn new(backend: Box<dyn MergeBackend>, storage: &StorageConfig) -> Self {
        Self {
            backend,
            output_format: storage.output_format.clone(),
            default_output_name: storage.default_output_name.clone(),
        }
    }

    /// Output base name: the run key, unless it is a bare meeting id.
    pub fn output_base(&self, run_key: &str) -> String {
        if is_meeting_id(run_key) {
            info!("Extracted meeting id from {}", run_key);
            info!("Setting output file name to {}", self.default_output_name);
            self.default_output_name.clone()
        } else {
            run_key.to_string()
        }
    }

    pub async fn combine(
        &self,
        workdir: &WorkingDirectory,
        decision: CombineDecision,
    ) -> Result<CombineOutput, PipelineError> {
        let run_key = workdir.run_key();
        let base = self.output_base(run_key);
        let video = workdir.path(&format!("{}.{}", base, self.output_format));
        let archive = workdir.path(&format!("{}.zip", run_key));
        let primary = workdir.path(Asset::PrimaryVideo.relative_path());

        match decision {
            CombineDecision::Merge => {
                if video.exists() {
                    warn!("{:?} already found. Aborting.", video);
                    return Err(PipelineError::OutputAlreadyExists(video));
                }
                let secondary = workdir.path(Asset::SecondaryVideo.relative_path());
                if !(primary.is_file() && secondary.is_file()) {
                    return Err(PipelineError::RequiredAssetsMissing {
                        run_key: run_key.to_string(),
                    });
                }
                info!(
                    "Merging {:?} and {:?} with {}",
                    secondary,
                    primary,
                    self.backend.name()
                );
                self.backend.merge(&secondary, &primary, &video).await?;
            }
            CombineDecision::PrimaryOnly => {
                if !primary.is_file() {
                    return Err(PipelineError::RequiredAssetsMissing {
                        run_key: run_key.to_string(),
                    });
                }
                info!("No desktop sharing track, using {:?} as is", primary);
                tokio::fs::rename(&primary, &video)
                    .await
                    .map_err(|err| PipelineError::io(&primary, err))?;
            }
        }

        archive_file(&video, &archive).await?;
        info!("Created archive {:?}", archive);
        Ok(CombineOutput { video, archive })
    }
}

/// Writes `source` as the single deflated entry of a new zip at `archive`.
pub async fn archive_file(source: &Path, archive: &Path) -> Result<PathBuf, PipelineError> {
    let source = source.to_path_buf();
    let archive = archive.to_path_buf();
    let task_archive = archive.clone();
    tokio::task::spawn_blocking(move || write_zip(&source, &task_archive))
        .await
        .map_err(|err| PipelineError::Archive {
            path: archive.clone(),
            message: err.to_string(),
        })??;
    Ok(archive)
}

fn write_zip(source: &Path, archive: &Path) -> Result<(), PipelineError> {
    let archive_error = |message: String| PipelineError::Archive {
        path: archive.to_path_buf(),
        message,
    };

    let entry_name = source
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| archive_error(format!("{:?} has no file name", source)))?;
    let mut input = File::open(source).map_err(|err| PipelineError::io(source, err))?;
    let size = input
        .metadata()
        .map_err(|err| PipelineError::io(source, err))?
        .len();
    let output = File::create(archive).map_err(|err| PipelineError::io(archive, err))?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64);
    let mut zip = ZipWriter::new(output);
    zip.start_file(entry_name, options)
        .map_err(|err| archive_error(err.to_string()))?;
    std::io::copy(&mut input, &mut zip).map_err(|err| PipelineError::io(archive, err))?;
    zip.finish().map_err(|err| archive_error(err.to_string()))?;
    Ok(())
}
