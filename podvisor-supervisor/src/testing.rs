//! Test doubles shared by the unit tests

use async_trait::async_trait;
use podvisor_core::error::{PodvisorError, Result};
use podvisor_core::sidecar::{AgentState, AgentStatus, ControlApi, NudgeOutcome, PromptInfo};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A control API call as seen by [`ScriptedSidecar`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status,
    Screen,
    Keys(Vec<String>),
    Respond(u32),
    Nudge(String),
    Shutdown,
}

/// Sidecar that replays a scripted sequence of `GET /agent` answers.
///
/// Once the script runs out every further status call returns `fallback`,
/// or a transport error when `fallback` is `None`.
pub struct ScriptedSidecar {
    script: Mutex<VecDeque<Option<AgentStatus>>>,
    fallback: Option<AgentStatus>,
    screen: Mutex<String>,
    nudge_delivered: bool,
    nudge_fails: bool,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedSidecar {
    pub fn new(fallback: Option<AgentStatus>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            screen: Mutex::new(String::new()),
            nudge_delivered: true,
            nudge_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn stuck_in(state: AgentState) -> Self {
        Self::new(Some(AgentStatus::new(state)))
    }

    pub fn then(self, state: AgentState) -> Self {
        self.then_status(AgentStatus::new(state))
    }

    pub fn then_status(self, status: AgentStatus) -> Self {
        self.script.lock().unwrap().push_back(Some(status));
        self
    }

    pub fn then_unreachable(self) -> Self {
        self.script.lock().unwrap().push_back(None);
        self
    }

    pub fn with_screen(self, text: &str) -> Self {
        *self.screen.lock().unwrap() = text.to_string();
        self
    }

    pub fn with_nudge_delivered(mut self, delivered: bool) -> Self {
        self.nudge_delivered = delivered;
        self
    }

    /// Make every nudge request fail at the transport level
    pub fn with_nudge_failing(mut self) -> Self {
        self.nudge_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn setup_prompt(state: AgentState) -> AgentStatus {
    AgentStatus {
        state,
        prompt: Some(PromptInfo {
            prompt_type: "setup".to_string(),
            subtype: None,
        }),
    }
}

#[async_trait]
impl ControlApi for ScriptedSidecar {
    async fn agent_status(&self) -> Result<AgentStatus> {
        self.record(Call::Status);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Some(status)) => Ok(status),
            Some(None) => Err(PodvisorError::Other("connection refused".to_string())),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| PodvisorError::Other("connection refused".to_string())),
        }
    }

    async fn screen_text(&self) -> Result<String> {
        self.record(Call::Screen);
        Ok(self.screen.lock().unwrap().clone())
    }

    async fn send_keys(&self, keys: &[&str]) -> Result<()> {
        self.record(Call::Keys(keys.iter().map(|k| k.to_string()).collect()));
        Ok(())
    }

    async fn respond(&self, option: u32) -> Result<()> {
        self.record(Call::Respond(option));
        Ok(())
    }

    async fn nudge(&self, message: &str) -> Result<NudgeOutcome> {
        self.record(Call::Nudge(message.to_string()));
        if self.nudge_fails {
            return Err(PodvisorError::Sidecar {
                endpoint: "/agent/nudge".to_string(),
                status: 502,
            });
        }
        Ok(NudgeOutcome {
            delivered: self.nudge_delivered,
            reason: (!self.nudge_delivered).then(|| "agent busy".to_string()),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        self.record(Call::Shutdown);
        Ok(())
    }
}
