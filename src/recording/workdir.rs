//! Per-meeting working directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::error::{PipelineError, TemplateError};

pub const LEDGER_FILENAME: &str = "bbb-player-metadata.json";
pub const SENTINEL_FILENAME: &str = "rec_fully_downloaded.txt";
pub const EMAIL_SENT_FILENAME: &str = "EMAIL_SENT.txt";

const SUBDIRECTORIES: [&str; 3] = ["video", "deskshare", "presentation"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    root: PathBuf,
    run_key: String,
}

impl WorkingDirectory {
    pub fn new(downloads_dir: &Path, run_key: &str) -> Self {
        Self {
            root: downloads_dir.join(run_key),
            run_key: run_key.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    pub fn video_dir(&self) -> PathBuf {
        self.root.join("video")
    }

    pub fn deskshare_dir(&self) -> PathBuf {
        self.root.join("deskshare")
    }

    pub fn presentation_dir(&self) -> PathBuf {
        self.root.join("presentation")
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILENAME)
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.root.join(SENTINEL_FILENAME)
    }

    pub fn email_marker_path(&self) -> PathBuf {
        self.root.join(EMAIL_SENT_FILENAME)
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Creates the root and its three asset subdirectories. Already existing
    /// directories are fine.
    pub fn create(&self) -> Result<(), PipelineError> {
        let targets = std::iter::once(self.root.clone())
            .chain(SUBDIRECTORIES.iter().map(|name| self.root.join(name)));
        for dir in targets {
            fs::create_dir_all(&dir).map_err(|source| PipelineError::Prepare {
                path: dir.clone(),
                source,
            })?;
            debug!("Ensured directory {:?}", dir);
        }
        Ok(())
    }

    /// Removes the whole tree. A directory that is already gone is not an error.
    pub fn remove(&self) -> Result<(), PipelineError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PipelineError::io(&self.root, err)),
        }
    }

    /// Recursively copies `template` into the root, overwriting existing files.
    pub fn copy_template(&self, template: &Path) -> Result<usize, TemplateError> {
        if !template.is_dir() {
            return Err(TemplateError::SourceMissing(template.to_path_buf()));
        }

        let mut copied = 0;
        for entry in WalkDir::new(template) {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(template).to_path_buf();
                TemplateError::Io {
                    path,
                    source: err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("template walk failed")),
                }
            })?;
            let relative = match entry.path().strip_prefix(template) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative,
                _ => continue,
            };
            let target = self.root.join(relative);
            let result = if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
            } else {
                fs::copy(entry.path(), &target).map(|_| ())
            };
            result.map_err(|source| TemplateError::Io {
                path: target.clone(),
                source,
            })?;
            if entry.file_type().is_file() {
                copied += 1;
            }
        }
        Ok(copied)
    }
}
