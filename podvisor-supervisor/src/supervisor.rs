//! Restart loop keeping the agent alive across crashes

use podvisor_core::config::SupervisorConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::session::SessionLauncher;
use crate::transcript::{cleanup_hook_pipes, retire_transcript, select_resume_transcript};
use crate::{Result, SupervisorError};

/// Consecutive short-session counter.
///
/// A session lasting at least `min_healthy_runtime` resets the count to zero;
/// anything shorter adds one.
#[derive(Debug, Clone)]
pub struct RestartTracker {
    count: u32,
    max: u32,
    min_healthy_runtime: Duration,
}

impl RestartTracker {
    pub fn new(max: u32, min_healthy_runtime: Duration) -> Self {
        Self {
            count: 0,
            max,
            min_healthy_runtime,
        }
    }

    /// Account for a finished session and return the new count
    pub fn record(&mut self, duration: Duration) -> u32 {
        if duration >= self.min_healthy_runtime {
            self.count = 0;
        } else {
            self.count += 1;
        }
        self.count
    }

    /// Whether the crash-loop limit has been reached
    pub fn exhausted(&self) -> bool {
        self.count >= self.max
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Top-level supervisor running sessions back to back
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    launcher: Arc<dyn SessionLauncher>,
    lifetime: CancellationToken,
}

impl Supervisor {
    /// Create a supervisor; cancelling `lifetime` requests a clean shutdown
    pub fn new(
        config: Arc<SupervisorConfig>,
        launcher: Arc<dyn SessionLauncher>,
        lifetime: CancellationToken,
    ) -> Self {
        Self {
            config,
            launcher,
            lifetime,
        }
    }

    /// Run sessions until a stop is requested or the agent crash-loops.
    ///
    /// Returns `Ok(())` on clean shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::MaxRestartsExceeded`] once `max_restarts`
    /// consecutive sessions ended before `min_healthy_runtime`.
    pub async fn run(&self) -> Result<()> {
        let state_dir = self.config.state_dir();
        let mut restarts =
            RestartTracker::new(self.config.max_restarts, self.config.min_healthy_runtime);
        let mut session: u64 = 0;

        loop {
            if self.lifetime.is_cancelled() {
                info!("stop requested, shutting down");
                return Ok(());
            }
            if restarts.exhausted() {
                error!(
                    restarts = restarts.count(),
                    max = restarts.max(),
                    "agent is crash-looping, giving up"
                );
                return Err(SupervisorError::MaxRestartsExceeded {
                    restarts: restarts.count(),
                    max: restarts.max(),
                });
            }

            cleanup_hook_pipes(&state_dir);
            let resume = select_resume_transcript(&state_dir, self.config.resume_enabled);

            session += 1;
            info!(session, restarts = restarts.count(), "starting session");

            let duration = match self.launcher.run_once(resume.as_deref(), &self.lifetime).await {
                Ok(outcome) => {
                    if self.lifetime.is_cancelled() {
                        info!(session, exit_code = outcome.exit_code, "session ended by shutdown");
                        return Ok(());
                    }
                    if !outcome.succeeded() {
                        if let Some(path) = &resume {
                            retire_transcript(path);
                        }
                    }
                    info!(
                        session,
                        exit_code = outcome.exit_code,
                        duration = ?outcome.duration,
                        "session ended"
                    );
                    outcome.duration
                }
                Err(e) => {
                    error!(session, error = %e, "session failed to start");
                    Duration::ZERO
                }
            };

            let count = restarts.record(duration);
            if count > 0 {
                warn!(session, restarts = count, max = restarts.max(), "short-lived session");
            }

            tokio::select! {
                biased;
                _ = self.lifetime.cancelled() => {
                    info!("stop requested during restart delay, shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.restart_delay) => {}
            }
        }
    }
}
