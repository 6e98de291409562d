//! Session transcript discovery, resume selection and retirement
//!
//! The agent writes one `.jsonl` transcript per conversation under
//! `{state}/claude/projects/`. A transcript whose resumed session crashed is
//! renamed with a `.stale` suffix so it is never picked again. Once two such
//! markers exist, resume is switched off for good and every session starts fresh.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Suffix appended to a transcript that broke a resumed session
pub const STALE_SUFFIX: &str = ".stale";

/// Stale markers at which resume is disabled
pub const MAX_STALE_TRANSCRIPTS: usize = 2;

const TRANSCRIPT_EXTENSION: &str = "jsonl";
const SUBAGENTS_DIR: &str = "subagents";
const HOOK_PIPE: &str = "hook.pipe";

/// A transcript that could be resumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptCandidate {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Result of walking the projects tree
#[derive(Debug, Clone, Default)]
pub struct TranscriptScan {
    /// Resumable transcripts, most recently modified first
    pub candidates: Vec<TranscriptCandidate>,
    /// Number of retired transcripts found
    pub stale_count: usize,
}

impl TranscriptScan {
    /// Whether enough resumed sessions have failed to stop resuming
    pub fn resume_blocked(&self) -> bool {
        self.stale_count >= MAX_STALE_TRANSCRIPTS
    }

    /// Most recently modified candidate
    pub fn newest(&self) -> Option<&TranscriptCandidate> {
        self.candidates.first()
    }
}

/// Directory holding the agent's per-project transcripts
pub fn projects_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("claude").join("projects")
}

/// Directory holding per-session sidecar state
pub fn coop_sessions_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("coop").join("sessions")
}

/// Walk the projects tree, skipping `subagents/` subtrees.
///
/// A missing or unreadable tree yields an empty scan.
pub fn scan_transcripts(state_dir: &Path) -> TranscriptScan {
    let root = projects_dir(state_dir);
    let mut scan = TranscriptScan::default();

    let entries = WalkDir::new(&root)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == SUBAGENTS_DIR))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file());

    for entry in entries {
        let path = entry.path();
        if is_stale(path) {
            scan.stale_count += 1;
            continue;
        }
        if path.extension().is_some_and(|ext| ext == TRANSCRIPT_EXTENSION) {
            let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                debug!(path = %path.display(), "skipping transcript without mtime");
                continue;
            };
            scan.candidates.push(TranscriptCandidate {
                path: path.to_path_buf(),
                modified,
            });
        }
    }

    scan.candidates.sort_by(|a, b| b.modified.cmp(&a.modified));
    scan
}

/// Pick the transcript the next session should resume, if any.
pub fn select_resume_transcript(state_dir: &Path, resume_enabled: bool) -> Option<PathBuf> {
    if !resume_enabled {
        return None;
    }

    let scan = scan_transcripts(state_dir);
    if scan.resume_blocked() {
        warn!(
            stale = scan.stale_count,
            "too many failed resumes, starting a fresh session"
        );
        return None;
    }

    let chosen = scan.newest().map(|c| c.path.clone());
    match &chosen {
        Some(path) => info!(path = %path.display(), "resuming previous session"),
        None => debug!("no transcript to resume"),
    }
    chosen
}

/// Path a transcript is moved to when retired
pub fn stale_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(STALE_SUFFIX);
    PathBuf::from(name)
}

/// Retire a transcript after its resumed session failed.
///
/// Returns whether the rename happened. Failures are logged and never retried.
pub fn retire_transcript(path: &Path) -> bool {
    let target = stale_path(path);
    match std::fs::rename(path, &target) {
        Ok(()) => {
            info!(path = %path.display(), "retired transcript after failed resume");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not retire transcript");
            false
        }
    }
}

/// Remove hook pipes left behind by the previous session's sidecar.
///
/// Returns the number of pipes removed.
pub fn cleanup_hook_pipes(state_dir: &Path) -> usize {
    let pipes = WalkDir::new(coop_sessions_dir(state_dir))
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name() == HOOK_PIPE);

    let mut removed = 0;
    for pipe in pipes {
        match std::fs::remove_file(pipe.path()) {
            Ok(()) => {
                debug!(path = %pipe.path().display(), "removed stale hook pipe");
                removed += 1;
            }
            Err(e) => warn!(
                path = %pipe.path().display(),
                error = %e,
                "could not remove hook pipe"
            ),
        }
    }
    removed
}

fn is_stale(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(STALE_SUFFIX))
}
