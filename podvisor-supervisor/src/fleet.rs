//! Registration of the pod with the fleet directory
//!
//! Registration spans the whole supervisor lifetime rather than a single
//! session, so a crashing agent never drops the pod from the directory.

use async_trait::async_trait;
use podvisor_core::config::SupervisorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Result, SupervisorError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity the pod announces to the fleet directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRegistration {
    pub hostname: String,
    pub control_url: String,
    pub role: String,
    pub agent: String,
    pub pod_name: String,
    pub pod_ip: String,
}

impl PodRegistration {
    /// Build the registration from pod identity; the control URL is reachable
    /// from outside the pod, so it uses the pod IP (or hostname) instead of localhost.
    pub fn from_config(config: &SupervisorConfig) -> Self {
        let host = if config.pod_ip.is_empty() {
            config.hostname.as_str()
        } else {
            config.pod_ip.as_str()
        };
        Self {
            hostname: config.hostname.clone(),
            control_url: format!("http://{}:{}", host, config.coop_port),
            role: config.role.clone(),
            agent: config.agent_name.clone(),
            pod_name: config.pod_name.clone(),
            pod_ip: config.pod_ip.clone(),
        }
    }
}

/// External registry of running agent pods
#[async_trait]
pub trait FleetDirectory: Send + Sync {
    async fn register(&self, registration: &PodRegistration) -> Result<()>;

    async fn deregister(&self, hostname: &str) -> Result<()>;
}

/// Fleet directory reached over HTTP
pub struct HttpFleetDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFleetDirectory {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SupervisorError::Fleet(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

fn check(action: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(SupervisorError::Fleet(format!("{} returned {}", action, status)))
    }
}

#[async_trait]
impl FleetDirectory for HttpFleetDirectory {
    async fn register(&self, registration: &PodRegistration) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/pods", self.base_url))
            .json(registration)
            .send()
            .await
            .map_err(|e| SupervisorError::Fleet(e.to_string()))?;
        check("register", response)
    }

    async fn deregister(&self, hostname: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/pods/{}", self.base_url, hostname))
            .send()
            .await
            .map_err(|e| SupervisorError::Fleet(e.to_string()))?;
        check("deregister", response)
    }
}

/// Register now and deregister when `lifetime` is cancelled.
///
/// Errors are logged; a failed registration skips deregistration.
pub fn spawn_fleet_registration(
    directory: std::sync::Arc<dyn FleetDirectory>,
    registration: PodRegistration,
    lifetime: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let registered = match directory.register(&registration).await {
            Ok(()) => {
                info!(
                    hostname = %registration.hostname,
                    control_url = %registration.control_url,
                    "registered with fleet directory"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "fleet registration failed");
                false
            }
        };

        lifetime.cancelled().await;

        if registered {
            match directory.deregister(&registration.hostname).await {
                Ok(()) => info!(
                    hostname = %registration.hostname,
                    "deregistered from fleet directory"
                ),
                Err(e) => warn!(error = %e, "fleet deregistration failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registration() -> PodRegistration {
        PodRegistration::from_config(&SupervisorConfig {
            hostname: "pod-3".to_string(),
            pod_ip: "10.1.2.3".to_string(),
            pod_name: "gt-polecat-3".to_string(),
            role: "polecat".to_string(),
            agent_name: "nux".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_registration_from_config() {
        let reg = registration();
        assert_eq!(reg.control_url, "http://10.1.2.3:8080");
        assert_eq!(reg.agent, "nux");

        let no_ip = PodRegistration::from_config(&SupervisorConfig {
            hostname: "pod-4".to_string(),
            ..Default::default()
        });
        assert_eq!(no_ip.control_url, "http://pod-4:8080");
    }

    #[tokio::test]
    async fn test_register_then_deregister_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pods"))
            .and(body_json(json!({
                "hostname": "pod-3",
                "control_url": "http://10.1.2.3:8080",
                "role": "polecat",
                "agent": "nux",
                "pod_name": "gt-polecat-3",
                "pod_ip": "10.1.2.3"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/pods/pod-3"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let directory = Arc::new(HttpFleetDirectory::new(server.uri()).unwrap());
        let lifetime = CancellationToken::new();
        let handle = spawn_fleet_registration(directory, registration(), lifetime.clone());

        lifetime.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_registration_skips_deregistration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pods"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let directory = HttpFleetDirectory::new(server.uri()).unwrap();
        assert!(matches!(
            directory.register(&registration()).await,
            Err(SupervisorError::Fleet(_))
        ));

        let lifetime = CancellationToken::new();
        let handle =
            spawn_fleet_registration(Arc::new(directory), registration(), lifetime.clone());
        lifetime.cancel();
        handle.await.unwrap();
    }
}
