use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use cascade_core::{
    next_level_up, Analysis, AppliedChange, Decision, Document, FileChange, Level, SessionStatus,
};

// ── Continuation record ──

/// Everything needed to resume a suspended session. Serialized to
/// `sessions/<id>/state.json` at every suspension point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub conversation_id: String,
    pub request_text: String,
    pub document_directory: String,
    pub origin_level: Level,
    pub current_level: Level,
    pub status: SessionStatus,
    /// Snapshot taken at start; a committed level holds its new body.
    pub documents: BTreeMap<Level, Document>,
    #[serde(default)]
    pub applied_changes: Vec<FileChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_analysis: Option<Analysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<Decision>,
    #[serde(default)]
    pub reanalysis_count: u32,
    pub started_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub version: u32,
}

impl SessionState {
    pub fn new(
        session_id: &str,
        conversation_id: &str,
        request_text: &str,
        document_directory: &str,
        origin_level: Level,
        documents: BTreeMap<Level, Document>,
        now: &str,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            conversation_id: conversation_id.to_string(),
            request_text: request_text.to_string(),
            document_directory: document_directory.to_string(),
            origin_level,
            current_level: origin_level,
            status: SessionStatus::AwaitingAnalysis,
            documents,
            applied_changes: Vec::new(),
            pending_analysis: None,
            checkpoint_message: None,
            last_decision: None,
            reanalysis_count: 0,
            started_at: now.to_string(),
            updated_at: now.to_string(),
            version: 0,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == SessionStatus::AwaitingApproval
    }

    pub fn applied_summary(&self) -> Vec<AppliedChange> {
        self.applied_changes.iter().map(AppliedChange::from).collect()
    }
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(SessionStatus, &[SessionStatus])] = &[
    (
        SessionStatus::AwaitingAnalysis,
        &[SessionStatus::AwaitingApproval],
    ),
    (
        SessionStatus::AwaitingApproval,
        &[
            SessionStatus::AwaitingAnalysis,
            SessionStatus::Completed,
            SessionStatus::Rejected,
            SessionStatus::Stopped,
        ],
    ),
    // Completed, Rejected and Stopped are terminal
];

fn is_valid_transition(from: SessionStatus, to: SessionStatus) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

/// Move the session from `from` to `to`.
/// Returns Ok(true) on success, Ok(false) on CAS miss (current != from).
pub fn transition(state: &mut SessionState, from: SessionStatus, to: SessionStatus) -> Result<bool> {
    if state.status != from {
        return Ok(false);
    }
    if !is_valid_transition(from, to) {
        bail!("invalid transition: {} {from} → {to}", state.session_id);
    }
    state.status = to;
    state.version += 1;
    Ok(true)
}

// ── Routing ──

/// What a checkpoint decision does to the pending analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Commit,
    Rollback,
    Reanalyze,
}

pub fn route_decision(decision: Decision) -> Route {
    match decision {
        Decision::Approve | Decision::Stop => Route::Commit,
        Decision::Reject => Route::Rollback,
        Decision::Modify => Route::Reanalyze,
    }
}

/// Where a session goes after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Advance(Level),
    Finish(SessionStatus),
}

/// Propagate one level up only when the analysis asks for it, a higher
/// level exists, and that level has a document. `stop` always finishes.
pub fn decide_propagation(
    state: &SessionState,
    analysis: &Analysis,
    decision: Decision,
) -> Propagation {
    if decision == Decision::Stop {
        return Propagation::Finish(SessionStatus::Stopped);
    }
    if !analysis.requires_propagation {
        return Propagation::Finish(SessionStatus::Completed);
    }
    match next_level_up(state.current_level) {
        Some(next) if state.documents.contains_key(&next) => Propagation::Advance(next),
        _ => Propagation::Finish(SessionStatus::Completed),
    }
}
