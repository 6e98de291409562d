//! Podvisor Supervisor - PID-1 restart supervisor for agent pods
//!
//! Keeps one long-lived interactive agent alive inside its container. Each
//! session launches the coop sidecar wrapping the agent, and three lifecycle
//! tasks steer it through the sidecar's control API:
//!
//! - **Startup bypass** answers resume pickers, API key and setup dialogs
//! - **Prompt injector** nudges the agent to start working once it is idle
//! - **Exit monitor** shuts the sidecar down when the agent inside it exits
//!
//! Between sessions the [`Supervisor`] counts short-lived sessions, retires
//! transcripts whose resume crashed, and gives up once the agent crash-loops.
//! Fleet registration and credential refresh run for the whole pod lifetime.
//!
//! ## Scopes
//!
//! One root [`tokio_util::sync::CancellationToken`] covers the pod; SIGINT and
//! SIGTERM cancel it. Every session runs under a child token, so ending a
//! session stops its lifecycle tasks without touching pod-wide tasks.

mod credentials;
mod error;
mod fleet;
mod lifecycle;
mod pod;
mod screen;
mod session;
mod signal;
mod supervisor;
mod transcript;

#[cfg(test)]
mod testing;

pub use credentials::{CommandCredentialSource, CredentialSource, spawn_credential_refresh};
pub use error::{Result, SupervisorError};
pub use fleet::{FleetDirectory, HttpFleetDirectory, PodRegistration, spawn_fleet_registration};
pub use lifecycle::{
    BypassOutcome, ExitOutcome, InjectOutcome, LifecycleTimings, inject_initial_prompt,
    monitor_exit, spawn_lifecycle_tasks, startup_bypass,
};
pub use pod::run_pod;
pub use screen::{BypassAction, ScreenPrompt, classify_screen};
pub use session::{CoopSessionRunner, SessionLauncher, SessionOutcome};
pub use signal::spawn_signal_listener;
pub use supervisor::{RestartTracker, Supervisor};
pub use transcript::{
    MAX_STALE_TRANSCRIPTS, STALE_SUFFIX, TranscriptCandidate, TranscriptScan, cleanup_hook_pipes,
    projects_dir, retire_transcript, scan_transcripts, select_resume_transcript,
};
