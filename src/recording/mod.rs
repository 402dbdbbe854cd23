//! Recording acquisition and assembly pipeline.
//!
//! A meeting URL is parsed into an identity, its assets are downloaded into
//! a per-meeting working directory with a persisted ledger, and the two video
//! tracks are combined into one archived deliverable.

pub mod combiner;
pub mod error;
pub mod fetcher;
pub mod identity;
pub mod ledger;
pub mod pipeline;
pub mod workdir;

#[cfg(test)]
pub(crate) mod test_support;

pub use combiner::{archive_file, CombineOutput, Combiner, FfmpegMerge, MergeBackend};
pub use error::{FetchError, LedgerError, MergeError, PipelineError, TemplateError};
pub use fetcher::{
    select_transport, Asset, AssetFetcher, CombineDecision, CurlTransport, FetchOutcome,
    HttpTransport, Transport,
};
pub use identity::{is_meeting_id, is_plain_name, run_key, MeetingIdentity, MeetingRequest};
pub use ledger::RunLedger;
pub use pipeline::{PipelineConfig, ProcessOutcome, RecordingPipeline, RunOutcome};
pub use workdir::WorkingDirectory;
