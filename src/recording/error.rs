//! Error taxonomy of the acquisition and assembly pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single asset transfer. Never fatal for the whole fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} returned 404")]
    NotFound { url: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("external downloader failed for {url}: {message}")]
    Downloader { url: String, message: String },
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to access ledger {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ledger {path:?} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template directory {0:?} does not exist")]
    SourceMissing(PathBuf),
    #[error("failed to copy template into {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("merge produced no output at {0:?}")]
    MissingOutput(PathBuf),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("meeting id could not be found in url {0:?}")]
    IdentifierNotFound(String),

    #[error("{0:?} cannot be used as a recording name")]
    InvalidName(String),

    #[error("video files not found for {run_key}, this meeting might not be supported")]
    RequiredAssetsMissing { run_key: String },

    #[error("{0:?} already exists, refusing to overwrite")]
    OutputAlreadyExists(PathBuf),

    #[error("failed to prepare {path:?}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("combine failed: {0}")]
    Merge(#[from] MergeError),

    #[error("failed to archive {path:?}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("filesystem operation on {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
