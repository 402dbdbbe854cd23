//! Per-meeting orchestration: parse, resume check, acquisition, finalize,
//! and the one-shot combine recovery.

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use super::combiner::{CombineOutput, Combiner, FfmpegMerge};
use super::error::PipelineError;
use super::fetcher::{fetch_with_timestamps, AssetFetcher, CombineDecision};
use super::identity::{is_plain_name, run_key, MeetingIdentity, MeetingRequest};
use super::ledger::{self, RunLedger};
use super::workdir::WorkingDirectory;
use crate::config::Config;

/// Pipeline settings derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub downloads_dir: PathBuf,
    pub presentation_server: String,
    pub template_dir: Option<PathBuf>,
    pub template_version: String,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            downloads_dir: config.storage.downloads_dir.clone(),
            presentation_server: config.presentation.server.clone(),
            template_dir: config.storage.template_dir.clone(),
            template_version: config.storage.template_version.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Parse,
    CheckComplete,
    Prepare,
    Fetch,
    Finalize,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parse => "parse",
            Self::CheckComplete => "check-complete",
            Self::Prepare => "prepare",
            Self::Fetch => "fetch",
            Self::Finalize => "finalize",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of [`RecordingPipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// `None` when a previous run had already completed.
    pub combine_decision: Option<CombineDecision>,
    pub run_key: String,
    pub already_existed: bool,
}

/// Result of [`RecordingPipeline::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub run: RunOutcome,
    /// Set when this invocation produced a fresh deliverable.
    pub output: Option<CombineOutput>,
}

pub struct RecordingPipeline {
    config: PipelineConfig,
    fetcher: AssetFetcher,
    combiner: Combiner,
}

impl RecordingPipeline {
    pub fn new(config: PipelineConfig, fetcher: AssetFetcher, combiner: Combiner) -> Self {
        Self {
            config,
            fetcher,
            combiner,
        }
    }

    /// Wires the configured downloader and the ffmpeg merge backend.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = AssetFetcher::from_config(&config.fetcher)?;
        let merge = FfmpegMerge::new(config.merge.clone());
        if !merge.is_available() {
            warn!(
                "{} not found, combining two tracks will fail",
                config.merge.ffmpeg_path
            );
        }
        let combiner = Combiner::new(Box::new(merge), &config.storage);
        Ok(Self::new(
            PipelineConfig::from_config(config),
            fetcher,
            combiner,
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn workdir_for(&self, run_key: &str) -> WorkingDirectory {
        WorkingDirectory::new(&self.config.downloads_dir, run_key)
    }

    /// Persisted ledger of `run_key`, if any run ever wrote one.
    pub fn ledger_for(&self, run_key: &str) -> Result<Option<RunLedger>, PipelineError> {
        Ok(ledger::load(&self.checked_workdir(run_key)?)?)
    }

    /// Working directory of a caller supplied key, refused when the key is
    /// not a single path component.
    pub fn checked_workdir(&self, run_key: &str) -> Result<WorkingDirectory, PipelineError> {
        if !is_plain_name(run_key) {
            return Err(PipelineError::InvalidName(run_key.to_string()));
        }
        Ok(self.workdir_for(run_key))
    }

    /// Working directory key `request` resolves to.
    pub fn run_key_for(&self, request: &MeetingRequest) -> Result<String, PipelineError> {
        let (_, workdir) = self.resolve(request)?;
        Ok(workdir.run_key().to_string())
    }

    fn resolve(
        &self,
        request: &MeetingRequest,
    ) -> Result<(MeetingIdentity, WorkingDirectory), PipelineError> {
        let identity = MeetingIdentity::parse(&request.input_url, &self.config.presentation_server)?;
        debug!("Base url: {}", identity.base_url);
        let workdir = self.workdir_for(&run_key(request, &identity)?);
        debug!("Folder path: {:?}", workdir.root());
        Ok((identity, workdir))
    }

    /// Acquires the meeting's assets, or returns immediately when a previous
    /// run already completed for the same run key.
    pub async fn run(&self, request: &MeetingRequest) -> Result<RunOutcome, PipelineError> {
        debug!("Stage {}", Stage::Parse);
        let (identity, workdir) = self.resolve(request)?;

        debug!("Stage {}", Stage::CheckComplete);
        if ledger::is_complete(&workdir) {
            info!("{} was already downloaded, skipping", workdir.run_key());
            debug!("Stage {}", Stage::Done);
            return Ok(RunOutcome {
                combine_decision: None,
                run_key: workdir.run_key().to_string(),
                already_existed: true,
            });
        }

        let decision = self.acquire(request, &identity, &workdir).await?;
        Ok(RunOutcome {
            combine_decision: Some(decision),
            run_key: workdir.run_key().to_string(),
            already_existed: false,
        })
    }

    /// PREPARE, FETCH and FINALIZE for one working directory.
    async fn acquire(
        &self,
        request: &MeetingRequest,
        identity: &MeetingIdentity,
        workdir: &WorkingDirectory,
    ) -> Result<CombineDecision, PipelineError> {
        debug!("Stage {}", Stage::Prepare);
        workdir.create()?;
        let ledger = RunLedger::new(request, identity);
        ledger::save(workdir, &ledger)?;

        debug!("Stage {}", Stage::Fetch);
        let outcome =
            fetch_with_timestamps(&self.fetcher, &identity.base_url, workdir, ledger).await?;

        debug!("Stage {}", Stage::Finalize);
        let ledger = self.copy_template(workdir, outcome.ledger)?;
        ledger::save(workdir, &ledger)?;
        ledger::mark_complete(workdir)?;
        let ledger = ledger.completed();
        ledger::save(workdir, &ledger)?;

        info!("Finished downloading {}", workdir.run_key());
        debug!("Stage {}", Stage::Done);
        Ok(outcome.decision)
    }

    fn copy_template(
        &self,
        workdir: &WorkingDirectory,
        ledger: RunLedger,
    ) -> Result<RunLedger, PipelineError> {
        match &self.config.template_dir {
            Some(template) => {
                let copied = workdir.copy_template(template)?;
                debug!("Copied {} template files from {:?}", copied, template);
                Ok(ledger.template_copied(Some(self.config.template_version.clone())))
            }
            None => {
                debug!("No playback template configured");
                Ok(ledger)
            }
        }
    }

    /// Combines the tracks of `run_key` without any recovery.
    pub async fn combine(
        &self,
        run_key: &str,
        decision: CombineDecision,
    ) -> Result<CombineOutput, PipelineError> {
        self.combiner
            .combine(&self.checked_workdir(run_key)?, decision)
            .await
    }

    /// Combines once; on failure the working directory is discarded, the
    /// meeting acquired again and combine attempted one last time. A second
    /// failure leaves the directory removed. An existing deliverable is never
    /// discarded: `OutputAlreadyExists` is terminal, the same class as an
    /// unparseable url, and skips recovery.
    pub async fn combine_with_recovery(
        &self,
        request: &MeetingRequest,
        decision: CombineDecision,
    ) -> Result<CombineOutput, PipelineError> {
        let (identity, workdir) = self.resolve(request)?;

        let first = match self.combiner.combine(&workdir, decision).await {
            Ok(output) => return Ok(output),
            Err(err @ PipelineError::OutputAlreadyExists(_)) => return Err(err),
            Err(err) => err,
        };

        warn!(
            "Combine failed for {}: {}. Removing {:?} and retrying once",
            workdir.run_key(),
            first,
            workdir.root()
        );
        workdir.remove()?;

        let retry = async {
            let decision = self.acquire(request, &identity, &workdir).await?;
            self.combiner.combine(&workdir, decision).await
        };
        match retry.await {
            Ok(output) => Ok(output),
            Err(err) => {
                error!("Combine retry failed for {}: {}", workdir.run_key(), err);
                if let Err(cleanup) = workdir.remove() {
                    warn!("Failed to remove {:?}: {}", workdir.root(), cleanup);
                }
                Err(err)
            }
        }
    }

    /// `run` followed by combine-with-recovery when the assets were freshly
    /// acquired.
    pub async fn process(&self, request: &MeetingRequest) -> Result<ProcessOutcome, PipelineError> {
        let run = self.run(request).await?;
        let output = match run.combine_decision {
            Some(decision) => Some(self.combine_with_recovery(request, decision).await?),
            None => None,
        };
        Ok(ProcessOutcome { run, output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::recording::test_support::{FakeMerge, FakeReply, FakeTransport};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const MEETING_ID: &str = "0123456789abcdef0123456789abcdef01234567-1700000000000";

    fn request() -> MeetingRequest {
        MeetingRequest::new(
            format!("https://bbb.example.org/playback/presentation/2.3/{MEETING_ID}"),
            "Weekly",
        )
    }

    fn config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            downloads_dir: dir.path().join("meetings"),
            presentation_server: "media.example.org".to_string(),
            template_dir: None,
            template_version: "3.1.1".to_string(),
        }
    }

    fn pipeline(
        config: PipelineConfig,
        transport: FakeTransport,
        merge: FakeMerge,
    ) -> RecordingPipeline {
        RecordingPipeline::new(
            config,
            AssetFetcher::new(Box::new(transport)),
            Combiner::new(Box::new(merge), &StorageConfig::default()),
        )
    }

    fn fake_parts() -> (FakeTransport, Arc<Mutex<Vec<String>>>, FakeMerge, Arc<Mutex<u32>>) {
        let transport = FakeTransport::default();
        let fetches = transport.calls();
        let merge = FakeMerge::default();
        let merges = merge.calls();
        (transport, fetches, merge, merges)
    }

    #[tokio::test]
    async fn test_run_acquires_and_finalizes() {
        let dir = TempDir::new().unwrap();
        let (transport, fetches, merge, _) = fake_parts();
        let pipeline = pipeline(config(&dir), transport, merge);

        let outcome = pipeline.run(&request()).await.unwrap();

        assert_eq!(outcome.run_key, "Weekly-00000");
        assert_eq!(outcome.combine_decision, Some(CombineDecision::Merge));
        assert!(!outcome.already_existed);
        assert_eq!(fetches.lock().unwrap().len(), 3);
        assert_eq!(
            fetches.lock().unwrap()[0],
            format!("https://media.example.org/presentation/{MEETING_ID}/metadata.xml")
        );

        let workdir = pipeline.workdir_for("Weekly-00000");
        assert!(ledger::is_complete(&workdir));
        let ledger = pipeline.ledger_for("Weekly-00000").unwrap().unwrap();
        assert!(ledger.all_done);
        assert!(ledger.download_completed);
        assert_eq!(ledger.detected_platform_version, "2.3");
        assert!(ledger.copied_template_version.is_none());
    }

    #[tokio::test]
    async fn test_run_skips_completed_meeting() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let workdir = WorkingDirectory::new(&config.downloads_dir, "Weekly-00000");
        std::fs::create_dir_all(workdir.root()).unwrap();
        ledger::mark_complete(&workdir).unwrap();
        let (transport, fetches, merge, _) = fake_parts();
        let pipeline = pipeline(config, transport, merge);

        let outcome = pipeline.run(&request()).await.unwrap();

        assert!(outcome.already_existed);
        assert_eq!(outcome.combine_decision, None);
        assert!(fetches.lock().unwrap().is_empty());
        assert!(!workdir.video_dir().exists());
        assert!(!workdir.ledger_path().exists());
    }

    #[tokio::test]
    async fn test_run_rejects_unparseable_url() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let downloads = config.downloads_dir.clone();
        let (transport, fetches, merge, _) = fake_parts();
        let pipeline = pipeline(config, transport, merge);

        let result = pipeline
            .run(&MeetingRequest::new("https://bbb.example.org/nothing", "Weekly"))
            .await;

        assert!(matches!(result, Err(PipelineError::IdentifierNotFound(_))));
        assert!(fetches.lock().unwrap().is_empty());
        assert!(!downloads.exists());
    }

    #[tokio::test]
    async fn test_traversing_name_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let downloads = config.downloads_dir.clone();
        let victim = dir.path().join("victim-00000");
        std::fs::create_dir_all(&victim).unwrap();
        std::fs::write(victim.join("precious.txt"), "keep").unwrap();
        let transport = FakeTransport::default();
        let fetches = transport.calls();
        let pipeline = pipeline(config, transport, FakeMerge::failing(2));
        let request = MeetingRequest::new(request().input_url, "../victim");

        let result = pipeline.process(&request).await;

        assert!(matches!(result, Err(PipelineError::InvalidName(_))));
        assert!(fetches.lock().unwrap().is_empty());
        assert!(!downloads.exists());
        assert_eq!(std::fs::read_to_string(victim.join("precious.txt")).unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_caller_supplied_keys_must_be_plain() {
        let dir = TempDir::new().unwrap();
        let (transport, _, merge, merges) = fake_parts();
        let pipeline = pipeline(config(&dir), transport, merge);

        let combined = pipeline.combine("../victim-00000", CombineDecision::Merge).await;
        assert!(matches!(combined, Err(PipelineError::InvalidName(_))));
        assert!(matches!(
            pipeline.ledger_for(".."),
            Err(PipelineError::InvalidName(_))
        ));
        assert_eq!(*merges.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_records_template_version() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("player");
        std::fs::create_dir_all(&template).unwrap();
        std::fs::write(template.join("index.html"), "player").unwrap();
        let config = PipelineConfig {
            template_dir: Some(template),
            ..config(&dir)
        };
        let (transport, _, merge, _) = fake_parts();
        let pipeline = pipeline(config, transport, merge);

        pipeline.run(&request()).await.unwrap();

        let workdir = pipeline.workdir_for("Weekly-00000");
        assert!(workdir.path("index.html").is_file());
        let ledger = pipeline.ledger_for("Weekly-00000").unwrap().unwrap();
        assert_eq!(ledger.copied_template_version.as_deref(), Some("3.1.1"));
    }

    #[tokio::test]
    async fn test_missing_template_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            template_dir: Some(dir.path().join("absent")),
            ..config(&dir)
        };
        let (transport, _, merge, _) = fake_parts();
        let pipeline = pipeline(config, transport, merge);

        let result = pipeline.run(&request()).await;

        assert!(matches!(result, Err(PipelineError::Template(_))));
        assert!(!ledger::is_complete(&pipeline.workdir_for("Weekly-00000")));
    }

    #[tokio::test]
    async fn test_process_primary_only() {
        let dir = TempDir::new().unwrap();
        let transport =
            FakeTransport::default().reply("deskshare/deskshare.mp4", FakeReply::NotFound);
        let merge = FakeMerge::default();
        let merges = merge.calls();
        let pipeline = pipeline(config(&dir), transport, merge);

        let outcome = pipeline.process(&request()).await.unwrap();

        assert_eq!(outcome.run.combine_decision, Some(CombineDecision::PrimaryOnly));
        let output = outcome.output.unwrap();
        assert!(output.video.ends_with("Weekly-00000/Weekly-00000.mp4"));
        assert!(output.archive.is_file());
        assert_eq!(*merges.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_process_completed_meeting_produces_nothing() {
        let dir = TempDir::new().unwrap();
        let (transport, _, merge, merges) = fake_parts();
        let pipeline = pipeline(config(&dir), transport, merge);
        pipeline.process(&request()).await.unwrap();

        let second = pipeline.process(&request()).await.unwrap();

        assert!(second.run.already_existed);
        assert!(second.output.is_none());
        assert_eq!(*merges.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recovery_reacquires_and_retries_once() {
        let dir = TempDir::new().unwrap();
        let transport = FakeTransport::default();
        let fetches = transport.calls();
        let merge = FakeMerge::failing(1);
        let merges = merge.calls();
        let pipeline = pipeline(config(&dir), transport, merge);

        let run = pipeline.run(&request()).await.unwrap();
        let workdir = pipeline.workdir_for(&run.run_key);
        std::fs::write(workdir.path("leftover.tmp"), b"partial").unwrap();

        let output = pipeline
            .combine_with_recovery(&request(), CombineDecision::Merge)
            .await
            .unwrap();

        assert!(output.archive.is_file());
        assert_eq!(*merges.lock().unwrap(), 2);
        assert_eq!(fetches.lock().unwrap().len(), 6);
        assert!(!workdir.path("leftover.tmp").exists());
        assert!(ledger::is_complete(&workdir));
    }

    #[tokio::test]
    async fn test_recovery_gives_up_after_second_failure() {
        let dir = TempDir::new().unwrap();
        let (transport, _, _, _) = fake_parts();
        let merge = FakeMerge::failing(2);
        let merges = merge.calls();
        let pipeline = pipeline(config(&dir), transport, merge);
        pipeline.run(&request()).await.unwrap();

        let result = pipeline
            .combine_with_recovery(&request(), CombineDecision::Merge)
            .await;

        assert!(matches!(result, Err(PipelineError::Merge(_))));
        assert_eq!(*merges.lock().unwrap(), 2);
        assert!(!pipeline.workdir_for("Weekly-00000").exists());
    }

    #[tokio::test]
    async fn test_recovery_keeps_existing_deliverable() {
        let dir = TempDir::new().unwrap();
        let (transport, fetches, merge, merges) = fake_parts();
        let pipeline = pipeline(config(&dir), transport, merge);
        pipeline.run(&request()).await.unwrap();
        let workdir = pipeline.workdir_for("Weekly-00000");
        std::fs::write(workdir.path("Weekly-00000.mp4"), b"previous").unwrap();

        let result = pipeline
            .combine_with_recovery(&request(), CombineDecision::Merge)
            .await;

        assert!(matches!(result, Err(PipelineError::OutputAlreadyExists(_))));
        assert_eq!(*merges.lock().unwrap(), 0);
        assert_eq!(fetches.lock().unwrap().len(), 3);
        assert!(workdir.path("Weekly-00000.mp4").is_file());
    }
}
