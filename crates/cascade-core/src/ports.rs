//! Capability ports consumed by the propagation engine.
//!
//! Implemented by the LLM adapters in `cascade-llm` and by scripted fakes
//! in tests. The engine only relies on the documented output schema.

use std::collections::BTreeMap;

use crate::error::CascadeResult;
use crate::level::Level;
use crate::types::{Document, FileChange};

pub struct ClassifyRequest<'a> {
    pub request_text: &'a str,
    pub documents: &'a BTreeMap<Level, Document>,
    pub credential: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub level: Level,
    pub rationale: String,
}

/// Maps a change request onto its origin level.
///
/// Policy: the lowest level that fully captures the request. Unparsable or
/// out-of-range output must fail with `CascadeError::Classification`.
#[async_trait::async_trait]
pub trait ImpactClassifier: Send + Sync {
    async fn classify(&self, req: &ClassifyRequest<'_>) -> CascadeResult<Classification>;
}

pub struct AnalyzeRequest<'a> {
    pub request_text: &'a str,
    pub level: Level,
    pub content: &'a str,
    /// Already-approved changes at lower levels, oldest first.
    pub prior_changes: &'a [FileChange],
    /// Reviewer feedback from a `modify` decision.
    pub feedback: Option<&'a str>,
    pub credential: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactProposal {
    pub impact_summary: String,
    pub proposed_content: String,
    pub requires_propagation: bool,
}

/// Proposes a whole-file replacement for one level.
#[async_trait::async_trait]
pub trait ImpactAnalyzer: Send + Sync {
    async fn analyze(&self, req: &AnalyzeRequest<'_>) -> CascadeResult<ImpactProposal>;
}
