//! Per-session lifecycle tasks driving the agent through the sidecar
//!
//! Three independent pollers run alongside every session:
//! - [`startup_bypass`] answers interactive prompts that would block startup
//! - [`inject_initial_prompt`] nudges the agent once it first goes idle
//! - [`monitor_exit`] shuts the sidecar down after the inner agent exits
//!
//! They share no state. Each one stops as soon as the session's
//! [`CancellationToken`] fires, and none of them can fail the session.

use podvisor_core::sidecar::{AgentState, ControlApi};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::screen::{BypassAction, ScreenPrompt, classify_screen};

/// Polling intervals and budgets of the lifecycle tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    pub bypass_interval: Duration,
    pub bypass_max_polls: u32,
    /// Heuristic: setup prompts seen without the exit option before giving up
    pub bypass_false_positive_limit: u32,
    pub inject_interval: Duration,
    pub inject_max_polls: u32,
    pub exit_grace: Duration,
    pub exit_interval: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            bypass_interval: Duration::from_secs(2),
            bypass_max_polls: 30,
            bypass_false_positive_limit: 5,
            inject_interval: Duration::from_secs(2),
            inject_max_polls: 60,
            exit_grace: Duration::from_secs(10),
            exit_interval: Duration::from_secs(5),
        }
    }
}

/// How [`startup_bypass`] finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassOutcome {
    /// Agent reached `idle` or `working`
    Ready,
    /// Agent exited before startup completed
    AgentExited,
    /// Setup prompt kept appearing without an exit option
    GaveUp,
    /// Poll budget used up
    Exhausted,
    Cancelled,
}

/// How [`inject_initial_prompt`] finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    Nudged,
    /// Agent was already working; nothing sent
    AlreadyWorking,
    /// Sidecar refused the nudge
    NotDelivered,
    /// Nudge request failed
    Failed,
    Exhausted,
    Cancelled,
}

/// How [`monitor_exit`] finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Agent exited and the sidecar was asked to shut down
    ShutdownRequested,
    /// Control API stopped answering
    SidecarGone,
    Cancelled,
}

/// Sleep for `period`, returning `true` if `cancel` fired first.
async fn pause(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(period) => false,
    }
}

/// Dismiss prompts that would keep the agent from finishing startup.
///
/// Fail-open: running out of polls is logged and the session carries on.
pub async fn startup_bypass(
    api: Arc<dyn ControlApi>,
    timings: LifecycleTimings,
    cancel: CancellationToken,
) -> BypassOutcome {
    let mut false_positives = 0;

    for poll in 1..=timings.bypass_max_polls {
        if pause(&cancel, timings.bypass_interval).await {
            return BypassOutcome::Cancelled;
        }

        let status = match api.agent_status().await {
            Ok(status) => status,
            Err(e) => {
                debug!(poll, error = %e, "startup bypass: sidecar not ready");
                continue;
            }
        };

        match status.state {
            AgentState::Idle | AgentState::Working => {
                debug!(poll, state = %status.state, "startup complete");
                return BypassOutcome::Ready;
            }
            AgentState::Exited => return BypassOutcome::AgentExited,
            AgentState::Starting => {}
        }

        let screen = match api.screen_text().await {
            Ok(screen) => screen,
            Err(e) => {
                debug!(poll, error = %e, "startup bypass: screen unavailable");
                continue;
            }
        };

        let prompt = classify_screen(&screen, &status);
        match prompt {
            ScreenPrompt::SetupWithExit => false_positives = 0,
            ScreenPrompt::SetupWithoutExit => {
                false_positives += 1;
                if false_positives >= timings.bypass_false_positive_limit {
                    warn!(
                        false_positives,
                        "setup prompt never showed an exit option, leaving it alone"
                    );
                    return BypassOutcome::GaveUp;
                }
            }
            _ => {}
        }

        if let Some(action) = prompt.action() {
            let result = match action {
                BypassAction::SendKeys(keys) => api.send_keys(keys).await,
                BypassAction::Respond(option) => api.respond(option).await,
            };
            match result {
                Ok(()) => info!(poll, ?prompt, ?action, "answered startup prompt"),
                Err(e) => warn!(poll, ?prompt, error = %e, "failed to answer startup prompt"),
            }
        }
    }

    warn!(
        polls = timings.bypass_max_polls,
        "agent still starting after startup bypass budget, continuing without it"
    );
    BypassOutcome::Exhausted
}

/// Send the initial work nudge the first time the agent goes idle.
pub async fn inject_initial_prompt(
    api: Arc<dyn ControlApi>,
    message: Arc<str>,
    timings: LifecycleTimings,
    cancel: CancellationToken,
) -> InjectOutcome {
    for poll in 1..=timings.inject_max_polls {
        if pause(&cancel, timings.inject_interval).await {
            return InjectOutcome::Cancelled;
        }

        let state = match api.agent_status().await {
            Ok(status) => status.state,
            Err(e) => {
                debug!(poll, error = %e, "prompt injector: sidecar not ready");
                continue;
            }
        };

        match state {
            AgentState::Working => {
                debug!(poll, "agent already working, skipping initial nudge");
                return InjectOutcome::AlreadyWorking;
            }
            AgentState::Idle => {
                return match api.nudge(&message).await {
                    Ok(outcome) if outcome.delivered => {
                        info!(poll, "initial nudge delivered");
                        InjectOutcome::Nudged
                    }
                    Ok(outcome) => {
                        warn!(reason = ?outcome.reason, "initial nudge not delivered");
                        InjectOutcome::NotDelivered
                    }
                    Err(e) => {
                        warn!(error = %e, "initial nudge failed");
                        InjectOutcome::Failed
                    }
                };
            }
            AgentState::Starting | AgentState::Exited => {}
        }
    }

    warn!(polls = timings.inject_max_polls, "agent never became idle, no initial nudge sent");
    InjectOutcome::Exhausted
}

/// Stop the sidecar once the agent inside it has exited.
///
/// The sidecar outlives its agent; without this the session would never end.
pub async fn monitor_exit(
    api: Arc<dyn ControlApi>,
    timings: LifecycleTimings,
    cancel: CancellationToken,
) -> ExitOutcome {
    if pause(&cancel, timings.exit_grace).await {
        return ExitOutcome::Cancelled;
    }

    loop {
        match api.agent_status().await {
            Ok(status) if status.state == AgentState::Exited => {
                info!("agent exited, shutting down sidecar");
                if let Err(e) = api.shutdown().await {
                    warn!(error = %e, "sidecar shutdown request failed");
                }
                return ExitOutcome::ShutdownRequested;
            }
            Ok(_) => {}
            Err(e) => {
                info!(error = %e, "sidecar unreachable, assuming it has exited");
                return ExitOutcome::SidecarGone;
            }
        }

        if pause(&cancel, timings.exit_interval).await {
            return ExitOutcome::Cancelled;
        }
    }
}

/// Start all three lifecycle tasks for one session.
pub fn spawn_lifecycle_tasks(
    tasks: &mut JoinSet<()>,
    api: Arc<dyn ControlApi>,
    message: Arc<str>,
    timings: LifecycleTimings,
    cancel: &CancellationToken,
) {
    let (bypass_api, bypass_cancel) = (api.clone(), cancel.clone());
    tasks.spawn(async move {
        let outcome = startup_bypass(bypass_api, timings, bypass_cancel).await;
        debug!(?outcome, "startup bypass finished");
    });

    let (inject_api, inject_cancel) = (api.clone(), cancel.clone());
    tasks.spawn(async move {
        let outcome = inject_initial_prompt(inject_api, message, timings, inject_cancel).await;
        debug!(?outcome, "prompt injector finished");
    });

    let exit_cancel = cancel.clone();
    tasks.spawn(async move {
        let outcome = monitor_exit(api, timings, exit_cancel).await;
        debug!(?outcome, "exit monitor finished");
    });
}
