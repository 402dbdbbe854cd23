//! Scripted collaborators for exercising the pipeline without network or ffmpeg.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::combiner::MergeBackend;
use super::error::{FetchError, MergeError};
use super::fetcher::Transport;
use super::ledger::RunLedger;

#[derive(Debug, Clone)]
pub enum FakeReply {
    Body(Vec<u8>),
    NotFound,
    Fail,
}

/// Transport answering by URL suffix, writing `data` for unscripted URLs.
#[derive(Default)]
pub struct FakeTransport {
    replies: Vec<(String, FakeReply)>,
    calls: Arc<Mutex<Vec<String>>>,
    observed_ledger: Option<PathBuf>,
    snapshots: Arc<Mutex<Vec<RunLedger>>>,
}

impl FakeTransport {
    pub fn reply(mut self, suffix: &str, reply: FakeReply) -> Self {
        self.replies.push((suffix.to_string(), reply));
        self
    }

    /// Records the ledger on disk at `path` whenever a transfer starts.
    pub fn observe_ledger(mut self, path: PathBuf) -> Self {
        self.observed_ledger = Some(path);
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    pub fn ledger_snapshots(&self) -> Arc<Mutex<Vec<RunLedger>>> {
        Arc::clone(&self.snapshots)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(path) = &self.observed_ledger {
            let content = std::fs::read_to_string(path).unwrap();
            self.snapshots
                .lock()
                .unwrap()
                .push(serde_json::from_str(&content).unwrap());
        }

        let reply = self
            .replies
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| FakeReply::Body(b"data".to_vec()));
        match reply {
            FakeReply::Body(body) => {
                tokio::fs::write(dest, body).await.map_err(|source| FetchError::Io {
                    path: dest.to_path_buf(),
                    source,
                })
            }
            FakeReply::NotFound => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
            FakeReply::Fail => Err(FetchError::Request {
                url: url.to_string(),
                message: "connection reset".to_string(),
            }),
        }
    }
}

/// Merge backend failing its first `failures` calls, then writing both
/// inputs concatenated to the output.
#[derive(Default)]
pub struct FakeMerge {
    failures: Arc<Mutex<u32>>,
    calls: Arc<Mutex<u32>>,
}

impl FakeMerge {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: Arc::new(Mutex::new(failures)),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<Mutex<u32>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl MergeBackend for FakeMerge {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn merge(&self, left: &Path, right: &Path, output: &Path) -> Result<(), MergeError> {
        *self.calls.lock().unwrap() += 1;
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(MergeError::Failed {
                    program: "fake".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "corrupt input".to_string(),
                });
            }
        }
        let mut content = std::fs::read(left).unwrap();
        content.extend(std::fs::read(right).unwrap());
        std::fs::write(output, content).unwrap();
        Ok(())
    }
}
