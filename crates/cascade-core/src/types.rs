use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CascadeError;
use crate::level::Level;

/// Session ID format: `ses_<ulid>`
pub type SessionId = String;

/// Caller-side conversation key (chat ID, thread ID, ...).
pub type ConversationId = String;

/// A planning document snapshot for one level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub level: Level,
    pub path: String,
    pub content: String,
}

/// Proposed replacement for one level's document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Analysis {
    pub level: Level,
    pub impact_summary: String,
    /// Full replacement body, never a patch.
    pub proposed_content: String,
    pub requires_propagation: bool,
}

impl Analysis {
    /// Placeholder analysis for a level that has no document.
    pub fn no_document(level: Level) -> Self {
        Self {
            level,
            impact_summary: format!("No file found for {level} level"),
            proposed_content: String::new(),
            requires_propagation: false,
        }
    }

    /// True when committing this analysis would write nothing.
    pub fn is_empty(&self) -> bool {
        self.proposed_content.is_empty()
    }
}

/// One committed level. Append-only per session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileChange {
    pub level: Level,
    pub file_path: String,
    pub original_content: String,
    pub new_content: String,
    pub summary: String,
}

/// Reviewer's verdict at a checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Commit and keep cascading.
    Approve,
    /// Roll back the whole session.
    Reject,
    /// Commit, then halt propagation.
    Stop,
    /// Re-analyze the same level with feedback.
    Modify,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
            Decision::Stop => "stop",
            Decision::Modify => "modify",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = CascadeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            "stop" => Ok(Decision::Stop),
            "modify" => Ok(Decision::Modify),
            _ => Err(CascadeError::UnknownDecision(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    AwaitingAnalysis,
    AwaitingApproval,
    Completed,
    Rejected,
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Rejected | SessionStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::AwaitingAnalysis => "awaiting_analysis",
            SessionStatus::AwaitingApproval => "awaiting_approval",
            SessionStatus::Completed => "completed",
            SessionStatus::Rejected => "rejected",
            SessionStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A suspension point presented to the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub level: Level,
    pub message: String,
}

/// Short form of a FileChange returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppliedChange {
    pub level: Level,
    pub summary: String,
}

impl From<&FileChange> for AppliedChange {
    fn from(change: &FileChange) -> Self {
        Self {
            level: change.level,
            summary: change.summary.clone(),
        }
    }
}
