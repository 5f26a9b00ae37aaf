use crate::level::Level;

/// Error taxonomy surfaced at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    /// Missing document directory, or a missing/expired session.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(
        "active session already exists for {conversation_id}: {session_id}. \
         Cancel it first or wait for it to complete."
    )]
    Conflict {
        conversation_id: String,
        session_id: String,
    },

    #[error("level classification failed: {0}")]
    Classification(String),

    #[error("impact analysis failed at {level} level: {message}")]
    Analysis { level: Level, message: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unknown decision: \"{0}\" (expected approve, reject, stop, or modify)")]
    UnknownDecision(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CascadeError {
    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CascadeError::NotFound(_) => "not_found",
            CascadeError::Conflict { .. } => "conflict",
            CascadeError::Classification(_) => "classification",
            CascadeError::Analysis { .. } => "analysis",
            CascadeError::Validation(_) => "validation",
            CascadeError::UnknownDecision(_) => "unknown_decision",
            CascadeError::Storage(_) => "storage",
        }
    }

    pub fn session_not_found(session_id: &str) -> Self {
        CascadeError::NotFound(format!("session {session_id} not found or expired"))
    }
}

pub type CascadeResult<T> = Result<T, CascadeError>;
