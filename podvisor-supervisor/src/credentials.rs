//! Periodic credential refresh across session restarts

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Result, SupervisorError};

/// Something that can renew the agent's authentication material
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// Refreshes credentials by running a shell command in the workspace
#[derive(Debug, Clone)]
pub struct CommandCredentialSource {
    command: String,
    working_dir: PathBuf,
}

impl CommandCredentialSource {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for CommandCredentialSource {
    async fn refresh(&self) -> Result<()> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| SupervisorError::Credentials(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(SupervisorError::Credentials(format!("refresh command exited with {}", status)))
        }
    }
}

/// Refresh once immediately, then every `interval` until `lifetime` is cancelled.
pub fn spawn_credential_refresh(
    source: Arc<dyn CredentialSource>,
    interval: Duration,
    lifetime: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match source.refresh().await {
                Ok(()) => debug!("credentials refreshed"),
                Err(e) => warn!(error = %e, "credential refresh failed"),
            }

            tokio::select! {
                biased;
                _ = lifetime.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("credential refresh stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn refresh(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SupervisorError::Credentials("token endpoint down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_on_interval_until_cancelled() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let lifetime = CancellationToken::new();
        let handle =
            spawn_credential_refresh(source.clone(), Duration::from_secs(60), lifetime.clone());

        tokio::time::sleep(Duration::from_secs(150)).await;
        lifetime.cancel();
        handle.await.unwrap();

        // t = 0, 60, 120
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_refresh() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let lifetime = CancellationToken::new();
        let handle =
            spawn_credential_refresh(source.clone(), Duration::from_secs(10), lifetime.clone());

        tokio::time::sleep(Duration::from_secs(25)).await;
        lifetime.cancel();
        handle.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_source() {
        let dir = TempDir::new().unwrap();
        let ok = CommandCredentialSource::new("touch refreshed", dir.path());
        ok.refresh().await.unwrap();
        assert!(dir.path().join("refreshed").exists());

        let failing = CommandCredentialSource::new("exit 4", dir.path());
        assert!(matches!(failing.refresh().await, Err(SupervisorError::Credentials(_))));
    }
}
