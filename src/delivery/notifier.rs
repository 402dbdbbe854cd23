//! Notifier abstraction and its shell command implementation.
//!
//! The rendered message is piped to a configured command, typically
//! `sendmail -t`, so mail transport stays with the host's MTA.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::notice::DeliveryNotice;
use super::DeliveryError;
use crate::config::DeliveryConfig;

/// Environment variable names for notice fields passed to the command.
pub mod notify_env {
    pub const RECIPIENT: &str = "BBB_NOTIFY_RECIPIENT";
    pub const MEETING_NAME: &str = "BBB_NOTIFY_MEETING_NAME";
    pub const START_TIME: &str = "BBB_NOTIFY_START_TIME";
    pub const DOWNLOAD_LINK: &str = "BBB_NOTIFY_DOWNLOAD_LINK";
    pub const UPLOAD_LINK: &str = "BBB_NOTIFY_UPLOAD_LINK";
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sends `message` for `notice`. Only `Ok` counts as delivered.
    async fn send(&self, notice: &DeliveryNotice, message: &str) -> Result<(), DeliveryError>;
}

/// Executes a shell command per notice.
/// - Pipes the rendered message to stdin
/// - Sets environment variables for the notice fields
/// - Kills the process on timeout
/// - Non-zero exit code is a failed delivery
pub struct ShellCommandNotifier {
    command: String,
    timeout: Duration,
}

impl ShellCommandNotifier {
    pub fn new(command: String, timeout_seconds: u64) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl Notifier for ShellCommandNotifier {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn send(&self, notice: &DeliveryNotice, message: &str) -> Result<(), DeliveryError> {
        info!(
            "Running notify command for {}: {}",
            notice.recipient, self.command
        );

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env(notify_env::RECIPIENT, &notice.recipient)
            .env(notify_env::MEETING_NAME, &notice.meeting_name)
            .env(notify_env::START_TIME, &notice.start_time)
            .env(notify_env::DOWNLOAD_LINK, &notice.download_link)
            .env(notify_env::UPLOAD_LINK, &notice.upload_link)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| DeliveryError::Notify(format!("failed to spawn command: {}", err)))?;

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(|err| DeliveryError::Notify(format!("failed to write message: {}", err)))?;
            // Drop stdin to signal EOF
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                info!("Notification sent to {}", notice.recipient);
                Ok(())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(DeliveryError::Notify(format!(
                    "command exited with status {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Ok(Err(err)) => Err(DeliveryError::Notify(format!(
                "command failed to execute: {}",
                err
            ))),
            Err(_) => Err(DeliveryError::Notify(format!(
                "command timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Writes the notice to the log instead of sending it.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notice: &DeliveryNotice, _message: &str) -> Result<(), DeliveryError> {
        info!(
            "Recording {} of {} for {} is ready: {} (upload: {})",
            notice.meeting_name,
            notice.start_time,
            notice.recipient,
            notice.download_link,
            notice.upload_link
        );
        Ok(())
    }
}

/// Shell command notifier when one is configured, log notifier otherwise.
pub fn notifier_from_config(config: &DeliveryConfig) -> Box<dyn Notifier> {
    let command = config.notify_command.trim();
    if command.is_empty() {
        Box::new(LogNotifier)
    } else {
        Box::new(ShellCommandNotifier::new(
            command.to_string(),
            config.notify_timeout_seconds,
        ))
    }
}
