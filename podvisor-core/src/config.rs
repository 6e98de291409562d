//! Configuration types for the podvisor supervisor

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PodvisorError, Result};

/// Default file name looked up in the current directory
pub const CONFIG_FILE: &str = "podvisor.toml";

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "PODVISOR_CONFIG_PATH";

/// Prefix for flat environment overrides (`PODVISOR_MAX_RESTARTS=5`)
pub const ENV_PREFIX: &str = "PODVISOR_";

/// Variable through which the launched sidecar receives its log level
pub const AGENT_LOG_LEVEL_ENV: &str = "COOP_LOG_LEVEL";

/// Startup configuration of the supervisor.
///
/// Built once before the restart loop starts and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Agent workspace; the session process runs here and `.state/` lives under it
    pub workspace: PathBuf,

    /// Sidecar executable launched once per session
    pub coop_binary: String,

    /// Primary sidecar port serving the control API
    pub coop_port: u16,

    /// Sidecar health port
    pub health_port: u16,

    /// Inner agent command handed to the sidecar after `--`
    pub agent_command: String,

    /// Consecutive short sessions tolerated before giving up
    pub max_restarts: u32,

    /// Whether a previous transcript may be resumed
    pub resume_enabled: bool,

    /// Sessions at least this long reset the restart counter
    #[serde(with = "humantime_serde")]
    pub min_healthy_runtime: Duration,

    /// Pause between sessions
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,

    /// Grace period between SIGTERM and SIGKILL when stopping a session process
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Log level exported to the session process
    pub agent_log_level: String,

    /// Agent role (e.g. "polecat", "crew")
    pub role: String,

    /// Project the agent works on
    pub project: String,

    /// Agent name
    pub agent_name: String,

    /// Pod IP address
    pub pod_ip: String,

    /// Pod hostname
    pub hostname: String,

    /// Pod name as known to the scheduler
    pub pod_name: String,

    /// Fleet directory base URL; registration is skipped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_url: Option<String>,

    /// Shell command refreshing credentials; refresh is skipped when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_refresh_command: Option<String>,

    /// Period between credential refreshes
    #[serde(with = "humantime_serde")]
    pub credential_refresh_interval: Duration,

    /// Message sent once the agent first becomes idle
    pub nudge_message: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("/home/agent/workspace"),
            coop_binary: "coop".to_string(),
            coop_port: 8080,
            health_port: 9090,
            agent_command: "claude --dangerously-skip-permissions".to_string(),
            max_restarts: 10,
            resume_enabled: true,
            min_healthy_runtime: Duration::from_secs(30),
            restart_delay: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(10),
            agent_log_level: "warn".to_string(),
            role: String::new(),
            project: String::new(),
            agent_name: String::new(),
            pod_ip: String::new(),
            hostname: String::new(),
            pod_name: String::new(),
            fleet_url: None,
            credential_refresh_command: None,
            credential_refresh_interval: Duration::from_secs(15 * 60),
            nudge_message: default_nudge_message(),
        }
    }
}

fn default_nudge_message() -> String {
    "Your session has started. Check your hook and mail for assigned work, then begin.".to_string()
}

/// Overrides supplied on the command line.
///
/// Only fields that are `Some` take part in the merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coop_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_enabled: Option<bool>,
}

impl SupervisorConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (podvisor.toml or path from PODVISOR_CONFIG_PATH)
    /// 3. `PODVISOR_*` environment overrides
    /// 4. Pod identity variables (`HOSTNAME`, `POD_IP`, `POD_NAME`)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is invalid or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_with(ConfigOverrides::default())
    }

    /// Same as [`SupervisorConfig::load`], with command-line overrides applied last.
    pub fn load_with(overrides: ConfigOverrides) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(SupervisorConfig::default()))
            .merge(Toml::file(CONFIG_FILE));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }

        let config: SupervisorConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG_PATH"]))
            .merge(Env::raw().only(&["HOSTNAME", "POD_IP", "POD_NAME"]))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: SupervisorConfig =
            Figment::from(Serialized::defaults(SupervisorConfig::default()))
                .merge(Toml::file(path))
                .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Root of the per-workspace state tree
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(".state")
    }

    /// Base URL of the sidecar control API
    pub fn control_url(&self) -> String {
        format!("http://localhost:{}/api/v1", self.coop_port)
    }

    /// Sidecar health endpoint
    pub fn health_url(&self) -> String {
        format!("http://localhost:{}/api/v1/health", self.health_port)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_restarts == 0 {
            return Err(PodvisorError::Configuration(
                "max_restarts must be at least 1".to_string(),
            ));
        }
        if self.coop_port == self.health_port {
            return Err(PodvisorError::Configuration(format!(
                "coop_port and health_port must differ (both {})",
                self.coop_port
            )));
        }
        if self.agent_command.trim().is_empty() {
            return Err(PodvisorError::Configuration(
                "agent_command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
