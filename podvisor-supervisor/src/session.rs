//! Session runner: one sidecar process per session, plus its lifecycle tasks

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podvisor_core::config::{AGENT_LOG_LEVEL_ENV, SupervisorConfig};
use podvisor_core::sidecar::ControlApi;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::lifecycle::{LifecycleTimings, spawn_lifecycle_tasks};
use crate::{Result, SupervisorError};

/// Result of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Process exit code; 0 when the process ended without one (e.g. killed by a signal)
    pub exit_code: i32,
    /// Wall-clock time from spawn to exit
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
}

impl SessionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a single session to completion
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start a session, optionally resuming `resume`, and wait for it to end.
    ///
    /// `lifetime` is the supervisor-wide scope; when it is cancelled the session
    /// is stopped and its outcome still reported.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Spawn`] if the process could not be started.
    async fn run_once(
        &self,
        resume: Option<&Path>,
        lifetime: &CancellationToken,
    ) -> Result<SessionOutcome>;
}

/// Launches the coop sidecar wrapping the agent command
pub struct CoopSessionRunner {
    config: Arc<SupervisorConfig>,
    api: Arc<dyn ControlApi>,
    timings: LifecycleTimings,
    nudge_message: Arc<str>,
}

impl CoopSessionRunner {
    /// Create a runner driving sessions through `api`
    pub fn new(config: Arc<SupervisorConfig>, api: Arc<dyn ControlApi>) -> Self {
        let nudge_message = Arc::from(config.nudge_message.as_str());
        Self {
            config,
            api,
            timings: LifecycleTimings::default(),
            nudge_message,
        }
    }

    /// Override lifecycle polling timings
    pub fn with_timings(mut self, timings: LifecycleTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Arguments passed to the sidecar binary
    pub fn launch_args(&self, resume: Option<&Path>) -> Vec<OsString> {
        let config = &self.config;
        let mut args: Vec<OsString> = vec![
            "--agent".into(),
            "claude".into(),
            "--port".into(),
            config.coop_port.to_string().into(),
            "--port-health".into(),
            config.health_port.to_string().into(),
        ];
        if let Some(path) = resume {
            args.push("--resume".into());
            args.push(path.as_os_str().to_owned());
        }
        for arg in ["--", "sh", "-c", config.agent_command.as_str()] {
            args.push(OsString::from(arg));
        }
        args
    }

    fn command(&self, resume: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.config.coop_binary);
        cmd.args(self.launch_args(resume))
            .current_dir(&self.config.workspace)
            .env(AGENT_LOG_LEVEL_ENV, &self.config.agent_log_level)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Forward SIGTERM, then kill if the process outlives the grace period
    async fn stop(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        if let Some(pid) = child.id() {
            info!(pid, "stopping session process");
            terminate(pid);
        }

        match timeout(self.config.shutdown_timeout, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    timeout = ?self.config.shutdown_timeout,
                    "session process ignored SIGTERM, killing"
                );
                child.kill().await?;
                child.wait().await
            }
        }
    }
}

#[async_trait]
impl SessionLauncher for CoopSessionRunner {
    async fn run_once(
        &self,
        resume: Option<&Path>,
        lifetime: &CancellationToken,
    ) -> Result<SessionOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = self
            .command(resume)
            .spawn()
            .map_err(|e| SupervisorError::Spawn(format!("{}: {}", self.config.coop_binary, e)))?;

        info!(
            pid = child.id(),
            resume = ?resume.map(|p| p.display().to_string()),
            "session started"
        );

        let scope = lifetime.child_token();
        let mut tasks = JoinSet::new();
        spawn_lifecycle_tasks(
            &mut tasks,
            self.api.clone(),
            self.nudge_message.clone(),
            self.timings,
            &scope,
        );

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = lifetime.cancelled() => None,
        };
        let status = match exited {
            Some(status) => status,
            None => self.stop(&mut child).await,
        };

        // Dropping the set aborts whatever is still mid-request.
        scope.cancel();
        drop(tasks);

        let exit_code = match status {
            Ok(status) => status.code().unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "could not read session exit status");
                0
            }
        };
        let duration = start.elapsed();
        debug!(exit_code, ?duration, "session process exited");

        Ok(SessionOutcome {
            exit_code,
            duration,
            started_at,
        })
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        warn!(pid, error = %std::io::Error::last_os_error(), "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}
