//! Client for the coop sidecar control API
//!
//! The sidecar wraps the interactive agent in a terminal and exposes it over
//! `http://localhost:{port}/api/v1`. Everything the supervisor knows about the
//! agent comes from polling these endpoints; there is no event stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{PodvisorError, Result};

/// Per-request timeout for control API calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Agent state as reported by `GET /agent`.
///
/// Any state string the supervisor does not know is read as [`AgentState::Starting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum AgentState {
    Starting,
    Idle,
    Working,
    Exited,
}

impl From<String> for AgentState {
    fn from(s: String) -> Self {
        AgentState::from(s.as_str())
    }
}

impl From<&str> for AgentState {
    fn from(s: &str) -> Self {
        match s {
            "idle" => AgentState::Idle,
            "working" => AgentState::Working,
            "exited" => AgentState::Exited,
            _ => AgentState::Starting,
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Starting => write!(f, "starting"),
            AgentState::Idle => write!(f, "idle"),
            AgentState::Working => write!(f, "working"),
            AgentState::Exited => write!(f, "exited"),
        }
    }
}

/// Interactive prompt the sidecar has detected on screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    #[serde(rename = "type", default)]
    pub prompt_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
}

/// Response body of `GET /agent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub state: AgentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptInfo>,
}

impl AgentStatus {
    /// Status with no prompt attached
    pub fn new(state: AgentState) -> Self {
        Self { state, prompt: None }
    }

    /// Whether the sidecar reports a prompt of the given type
    pub fn has_prompt(&self, prompt_type: &str) -> bool {
        self.prompt
            .as_ref()
            .is_some_and(|p| p.prompt_type == prompt_type)
    }
}

/// Response body of `POST /agent/nudge`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeOutcome {
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize)]
struct KeysRequest<'a> {
    keys: &'a [&'a str],
}

#[derive(Serialize)]
struct RespondRequest {
    option: u32,
}

#[derive(Serialize)]
struct NudgeRequest<'a> {
    message: &'a str,
}

/// Operations the supervisor performs against the sidecar
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// `GET /agent`
    async fn agent_status(&self) -> Result<AgentStatus>;

    /// `GET /screen/text`
    async fn screen_text(&self) -> Result<String>;

    /// `POST /input/keys`
    async fn send_keys(&self, keys: &[&str]) -> Result<()>;

    /// `POST /agent/respond`
    async fn respond(&self, option: u32) -> Result<()>;

    /// `POST /agent/nudge`
    async fn nudge(&self, message: &str) -> Result<NudgeOutcome>;

    /// `POST /shutdown`
    async fn shutdown(&self) -> Result<()>;
}

/// HTTP implementation of [`ControlApi`]
#[derive(Debug, Clone)]
pub struct SidecarClient {
    client: reqwest::Client,
    base_url: String,
}

impl SidecarClient {
    /// Create a client for the given API base URL (e.g. `http://localhost:8080/api/v1`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn check(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(PodvisorError::Sidecar {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            })
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        debug!(endpoint, "sidecar POST");
        let response = self.client.post(self.url(endpoint)).json(body).send().await?;
        Self::check(endpoint, response)
    }
}

#[async_trait]
impl ControlApi for SidecarClient {
    async fn agent_status(&self) -> Result<AgentStatus> {
        let response = self.client.get(self.url("/agent")).send().await?;
        let status = Self::check("/agent", response)?.json::<AgentStatus>().await?;
        Ok(status)
    }

    async fn screen_text(&self) -> Result<String> {
        let response = self.client.get(self.url("/screen/text")).send().await?;
        Ok(Self::check("/screen/text", response)?.text().await?)
    }

    async fn send_keys(&self, keys: &[&str]) -> Result<()> {
        self.post_json("/input/keys", &KeysRequest { keys }).await?;
        Ok(())
    }

    async fn respond(&self, option: u32) -> Result<()> {
        self.post_json("/agent/respond", &RespondRequest { option }).await?;
        Ok(())
    }

    async fn nudge(&self, message: &str) -> Result<NudgeOutcome> {
        let response = self.post_json("/agent/nudge", &NudgeRequest { message }).await?;
        Ok(response.json::<NudgeOutcome>().await?)
    }

    async fn shutdown(&self) -> Result<()> {
        // Response body is meaningless; only transport errors are reported.
        self.client.post(self.url("/shutdown")).send().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> SidecarClient {
        SidecarClient::new(format!("{}/api/v1", server.uri())).unwrap()
    }

    #[test]
    fn test_agent_state_parsing() {
        assert_eq!(AgentState::from("idle"), AgentState::Idle);
        assert_eq!(AgentState::from("working"), AgentState::Working);
        assert_eq!(AgentState::from("exited"), AgentState::Exited);
        assert_eq!(AgentState::from("starting"), AgentState::Starting);
        assert_eq!(AgentState::from("prompt"), AgentState::Starting);
        assert_eq!(AgentState::from(""), AgentState::Starting);
    }

    #[test]
    fn test_agent_status_deserialize() {
        let status: AgentStatus = serde_json::from_value(json!({
            "state": "waiting_for_input",
            "prompt": { "type": "setup", "subtype": "bypass_permissions" }
        }))
        .unwrap();
        assert_eq!(status.state, AgentState::Starting);
        assert!(status.has_prompt("setup"));
        assert!(!status.has_prompt("permission"));

        let bare: AgentStatus = serde_json::from_value(json!({ "state": "idle" })).unwrap();
        assert_eq!(bare, AgentStatus::new(AgentState::Idle));
    }

    #[tokio::test]
    async fn test_agent_status_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "working" })))
            .expect(1)
            .mount(&server)
            .await;

        let status = client_for(&server).await.agent_status().await.unwrap();
        assert_eq!(status.state, AgentState::Working);
    }

    #[tokio::test]
    async fn test_screen_text_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/screen/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Resume Session\n> one"))
            .mount(&server)
            .await;

        let text = client_for(&server).await.screen_text().await.unwrap();
        assert!(text.starts_with("Resume Session"));
    }

    #[tokio::test]
    async fn test_input_requests_send_expected_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/input/keys"))
            .and(body_json(json!({ "keys": ["Up", "Return"] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agent/respond"))
            .and(body_json(json!({ "option": 2 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.send_keys(&["Up", "Return"]).await.unwrap();
        client.respond(2).await.unwrap();
    }

    #[tokio::test]
    async fn test_nudge_reports_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agent/nudge"))
            .and(body_json(json!({ "message": "begin" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "delivered": false, "reason": "busy" })),
            )
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.nudge("begin").await.unwrap();
        assert!(!outcome.delivered);
        assert_eq!(outcome.reason.as_deref(), Some("busy"));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/agent"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).await.agent_status().await.unwrap_err();
        assert!(matches!(err, PodvisorError::Sidecar { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_is_transport_error() {
        // Grab a free port, then close it so nothing is listening there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = SidecarClient::new(format!("http://127.0.0.1:{}/api/v1", port)).unwrap();

        let err = client.agent_status().await.unwrap_err();
        assert!(matches!(err, PodvisorError::Http(_)));
    }

    #[tokio::test]
    async fn test_shutdown_ignores_response_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/shutdown"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client_for(&server).await.shutdown().await.is_ok());
    }
}
