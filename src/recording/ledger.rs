//! Persisted progress record of one acquisition run.
//!
//! The ledger is rewritten in full after every durable step. It is
//! informational: the completion sentinel next to it is what marks a
//! working directory as fully downloaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::error::LedgerError;
use super::identity::{MeetingIdentity, MeetingRequest};
use super::workdir::WorkingDirectory;

pub const LEDGER_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLedger {
    pub version: String,
    pub all_done: bool,
    pub input_url: String,
    pub requested_name: String,
    pub base_url: String,
    pub meeting_id: String,
    pub detected_platform_version: String,
    #[serde(default)]
    pub download_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_completed: bool,
    #[serde(default)]
    pub downloaded_files: BTreeMap<String, bool>,
    #[serde(default)]
    pub copied_template_version: Option<String>,
}

impl RunLedger {
    pub fn new(request: &MeetingRequest, identity: &MeetingIdentity) -> Self {
        Self {
            version: LEDGER_VERSION.to_string(),
            all_done: false,
            input_url: request.input_url.clone(),
            requested_name: request.requested_name.clone(),
            base_url: identity.base_url.clone(),
            meeting_id: identity.meeting_id.clone(),
            detected_platform_version: identity.platform_version.clone(),
            download_start_time: None,
            download_end_time: None,
            download_completed: false,
            downloaded_files: BTreeMap::new(),
            copied_template_version: None,
        }
    }

    pub fn download_started(self, at: DateTime<Utc>) -> Self {
        Self {
            download_start_time: Some(at),
            download_completed: false,
            downloaded_files: BTreeMap::new(),
            ..self
        }
    }

    pub fn file_marked(mut self, relative_path: &str, downloaded: bool) -> Self {
        self.downloaded_files
            .insert(relative_path.to_string(), downloaded);
        self
    }

    pub fn download_finished(self, at: DateTime<Utc>) -> Self {
        Self {
            download_end_time: Some(at),
            download_completed: true,
            ..self
        }
    }

    pub fn template_copied(self, version: Option<String>) -> Self {
        Self {
            copied_template_version: version,
            ..self
        }
    }

    pub fn completed(self) -> Self {
        Self {
            all_done: true,
            ..self
        }
    }

    pub fn is_downloaded(&self, relative_path: &str) -> bool {
        self.downloaded_files
            .get(relative_path)
            .copied()
            .unwrap_or(false)
    }
}

/// Reads the ledger of `workdir`, `None` when no run ever wrote one.
pub fn load(workdir: &WorkingDirectory) -> Result<Option<RunLedger>, LedgerError> {
    let path = workdir.ledger_path();
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).map_err(|source| LedgerError::Io {
        path: path.clone(),
        source,
    })?;
    let ledger = serde_json::from_str(&content)
        .map_err(|source| LedgerError::Malformed { path, source })?;
    Ok(Some(ledger))
}

/// Overwrites the whole ledger file. Single writer per working directory.
pub fn save(workdir: &WorkingDirectory, ledger: &RunLedger) -> Result<(), LedgerError> {
    let path = workdir.ledger_path();
    let content = serde_json::to_string_pretty(ledger).map_err(|source| LedgerError::Malformed {
        path: path.clone(),
        source,
    })?;
    write_file(&path, content.as_bytes())
}

/// Only the sentinel's existence counts, never its content.
pub fn is_complete(workdir: &WorkingDirectory) -> bool {
    workdir.sentinel_path().is_file()
}

pub fn mark_complete(workdir: &WorkingDirectory) -> Result<(), LedgerError> {
    write_file(&workdir.sentinel_path(), b"")
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), LedgerError> {
    fs::write(path, content).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })
}
