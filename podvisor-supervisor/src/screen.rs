//! Recognition of interactive startup prompts from rendered terminal text
//!
//! Matching is plain substring search on what the sidecar renders. New prompt
//! signatures go here; the polling loop in [`crate::lifecycle`] only acts on
//! the resulting [`ScreenPrompt`].

use podvisor_core::sidecar::AgentStatus;

/// Picker shown when the agent finds earlier conversations
const RESUME_PICKER_MARKERS: &[&str] = &["Resume Session", "Select a conversation to resume"];

/// Dialog asking whether to use an API key found in the environment
const API_KEY_MARKERS: &[&str] = &["Detected a custom API key", "Do you want to use this API key"];

/// Exit choice offered by setup dialogs such as the permissions warning
const EXIT_OPTION_MARKER: &str = "No, exit";

/// Prompt type the sidecar uses for first-run setup dialogs
pub const SETUP_PROMPT_TYPE: &str = "setup";

/// Option index that accepts a setup dialog without exiting
pub const SETUP_ACCEPT_OPTION: u32 = 2;

/// What is currently blocking startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenPrompt {
    /// Session picker; dismissed to start fresh
    ResumePicker,
    /// API key confirmation; the key is accepted
    ApiKeyConfirm,
    /// Setup dialog offering an exit option
    SetupWithExit,
    /// Sidecar reports a setup dialog but the exit option is not on screen
    SetupWithoutExit,
    /// Nothing recognised
    Unrecognized,
}

/// Input that answers a recognised prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassAction {
    /// `POST /input/keys`
    SendKeys(&'static [&'static str]),
    /// `POST /agent/respond`
    Respond(u32),
}

impl ScreenPrompt {
    /// Input to send for this prompt, if any
    pub fn action(self) -> Option<BypassAction> {
        match self {
            ScreenPrompt::ResumePicker => Some(BypassAction::SendKeys(&["Escape"])),
            ScreenPrompt::ApiKeyConfirm => Some(BypassAction::SendKeys(&["Up", "Return"])),
            ScreenPrompt::SetupWithExit => Some(BypassAction::Respond(SETUP_ACCEPT_OPTION)),
            ScreenPrompt::SetupWithoutExit | ScreenPrompt::Unrecognized => None,
        }
    }
}

/// Classify the rendered screen together with the sidecar's prompt report.
pub fn classify_screen(screen: &str, status: &AgentStatus) -> ScreenPrompt {
    if RESUME_PICKER_MARKERS.iter().any(|m| screen.contains(m)) {
        return ScreenPrompt::ResumePicker;
    }
    if API_KEY_MARKERS.iter().any(|m| screen.contains(m)) {
        return ScreenPrompt::ApiKeyConfirm;
    }
    if status.has_prompt(SETUP_PROMPT_TYPE) {
        if screen.contains(EXIT_OPTION_MARKER) {
            return ScreenPrompt::SetupWithExit;
        }
        return ScreenPrompt::SetupWithoutExit;
    }
    ScreenPrompt::Unrecognized
}
