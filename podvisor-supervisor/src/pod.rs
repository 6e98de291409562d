//! Wiring of the supervisor and its pod-lifetime background tasks

use podvisor_core::config::SupervisorConfig;
use podvisor_core::sidecar::{ControlApi, SidecarClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::credentials::{CommandCredentialSource, spawn_credential_refresh};
use crate::fleet::{HttpFleetDirectory, PodRegistration, spawn_fleet_registration};
use crate::session::CoopSessionRunner;
use crate::signal::spawn_signal_listener;
use crate::supervisor::Supervisor;
use crate::{Result, SupervisorError};

/// Upper bound on waiting for fleet deregistration at exit
const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the pod: signal handling, fleet registration, credential refresh and
/// the restart loop, until a stop signal or a crash loop.
///
/// # Errors
///
/// Returns [`SupervisorError::MaxRestartsExceeded`] when the agent crash-loops,
/// or an error if startup wiring fails.
pub async fn run_pod(config: SupervisorConfig) -> Result<()> {
    let config = Arc::new(config);
    let lifetime = CancellationToken::new();

    let _signals = spawn_signal_listener(lifetime.clone())
        .map_err(|e| SupervisorError::Other(anyhow::anyhow!("installing signal handlers: {}", e)))?;

    let fleet = match &config.fleet_url {
        Some(url) => {
            let directory = Arc::new(HttpFleetDirectory::new(url.as_str())?);
            Some(spawn_fleet_registration(
                directory,
                PodRegistration::from_config(&config),
                lifetime.clone(),
            ))
        }
        None => {
            info!("no fleet directory configured, skipping registration");
            None
        }
    };

    let credentials = config.credential_refresh_command.as_ref().map(|command| {
        let source = Arc::new(CommandCredentialSource::new(
            command.as_str(),
            config.workspace.clone(),
        ));
        spawn_credential_refresh(source, config.credential_refresh_interval, lifetime.clone())
    });

    let api: Arc<dyn ControlApi> = Arc::new(SidecarClient::new(config.control_url())?);
    let runner = Arc::new(CoopSessionRunner::new(config.clone(), api));

    info!(
        workspace = %config.workspace.display(),
        role = %config.role,
        agent = %config.agent_name,
        max_restarts = config.max_restarts,
        "supervisor starting"
    );
    let result = Supervisor::new(config.clone(), runner, lifetime.clone()).run().await;

    // Pod-lifetime tasks end here, whatever the reason for stopping.
    lifetime.cancel();
    if let Some(handle) = fleet {
        if tokio::time::timeout(DEREGISTER_TIMEOUT, handle).await.is_err() {
            warn!("fleet deregistration timed out");
        }
    }
    if let Some(handle) = credentials {
        handle.abort();
    }

    result
}
