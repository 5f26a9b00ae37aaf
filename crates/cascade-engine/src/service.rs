//! Boundary operations: start, respond, retry, status, cancel.
//!
//! The service owns the session registry and serializes steps per session
//! through each entry's step lock. Everything else lives in the continuation
//! record on disk.

use std::path::Path;
use std::sync::Arc;

use cascade_core::ports::{ImpactAnalyzer, ImpactClassifier};
use cascade_core::{
    AppliedChange, ApprovalDecision, CascadeError, CascadeResult, Checkpoint, Decision, Level,
    SessionStatus,
};
use cascade_store::StorePaths;
use serde::{Deserialize, Serialize};

use crate::clock::{rfc3339, Clock};
use crate::engine::{PropagationEngine, StepOutcome};
use crate::registry::{Lookup, SessionEntry, SessionRegistry};
use crate::state::machine::SessionState;
use crate::state::persist;

// ── Request / response types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default)]
    pub request_text: String,
    #[serde(default)]
    pub document_directory: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub analyzer_credential: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub session_id: String,
    pub checkpoint: Checkpoint,
}

/// Decision arrives as free text so unknown values map to `UnknownDecision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RespondResponse {
    Checkpoint {
        checkpoint: Checkpoint,
    },
    Finished {
        status: SessionStatus,
        #[serde(rename = "appliedChanges")]
        applied_changes: Vec<AppliedChange>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub session_id: String,
    pub conversation_id: String,
    pub started_at: String,
    pub last_activity_at: String,
    pub current_level: Level,
    pub status: SessionStatus,
    pub applied_change_count: usize,
    pub is_waiting: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
    pub status: String,
}

// ── Service ──

pub struct ReprioritizeService {
    engine: PropagationEngine,
    registry: SessionRegistry,
}

impl ReprioritizeService {
    /// Build a service rooted at `paths`. Creates the state layout.
    pub fn new(
        paths: StorePaths,
        classifier: Arc<dyn ImpactClassifier>,
        analyzer: Arc<dyn ImpactAnalyzer>,
        ttl: time::Duration,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        paths.ensure_layout()?;
        Ok(Self {
            engine: PropagationEngine::new(classifier, analyzer, paths, clock.clone()),
            registry: SessionRegistry::new(ttl, clock),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn paths(&self) -> &StorePaths {
        self.engine.paths()
    }

    /// Classify the request, analyze the origin level, and suspend at the
    /// first checkpoint. All-or-nothing: any failure leaves no session.
    pub async fn start(&self, req: StartRequest) -> CascadeResult<StartResponse> {
        for (field, value) in [
            ("requestText", &req.request_text),
            ("documentDirectory", &req.document_directory),
            ("conversationId", &req.conversation_id),
            ("analyzerCredential", &req.analyzer_credential),
        ] {
            if value.trim().is_empty() {
                return Err(CascadeError::Validation(format!(
                    "missing required field: {field}"
                )));
            }
        }

        if self.paths().overlaps(Path::new(&req.document_directory)) {
            return Err(CascadeError::Validation(
                "documentDirectory must not overlap the state directory".to_string(),
            ));
        }

        let (entry, evicted) = self
            .registry
            .create(&req.conversation_id, &req.analyzer_credential)?;
        for old in evicted {
            self.expire(&old);
        }
        let _step = entry.step.lock().await;
        tracing::info!(
            session_id = %entry.session_id,
            conversation_id = %req.conversation_id,
            "session created"
        );

        match self.begin(&entry, &req).await {
            Ok(checkpoint) => Ok(StartResponse {
                session_id: entry.session_id.clone(),
                checkpoint,
            }),
            Err(e) => {
                tracing::warn!(session_id = %entry.session_id, error = %e, "start failed, discarding session");
                self.registry.remove(&entry.session_id);
                if let Err(cleanup) = self.engine.abort(&entry.session_id) {
                    tracing::warn!(session_id = %entry.session_id, error = %cleanup, "cleanup after failed start");
                }
                Err(e)
            }
        }
    }

    async fn begin(&self, entry: &SessionEntry, req: &StartRequest) -> CascadeResult<Checkpoint> {
        let documents = cascade_store::discover(Path::new(&req.document_directory))?;
        let classification = self
            .engine
            .resolve_level(&req.request_text, &documents, &entry.credential)
            .await?;
        let mut state = SessionState::new(
            &entry.session_id,
            &entry.conversation_id,
            &req.request_text,
            &req.document_directory,
            classification.level,
            documents,
            &rfc3339(entry.started_at),
        );
        self.engine
            .analyze(&mut state, &entry.credential, None)
            .await
    }

    /// Resume a session suspended at a checkpoint.
    pub async fn respond(
        &self,
        session_id: &str,
        req: RespondRequest,
    ) -> CascadeResult<RespondResponse> {
        let decision: Decision = req.decision.parse()?;
        let feedback = req
            .feedback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        if decision == Decision::Modify && feedback.is_none() {
            return Err(CascadeError::Validation(
                "modify requires feedback".to_string(),
            ));
        }

        let entry = self.active_entry(session_id)?;
        let _step = entry.step.lock().await;
        if !self.registry.contains(session_id) {
            return Err(self.release_dropped(session_id));
        }

        let mut state = self.engine.load(session_id)?;
        let outcome = self
            .engine
            .apply_decision(
                &mut state,
                &ApprovalDecision { decision, feedback },
                &entry.credential,
            )
            .await?;

        match outcome {
            StepOutcome::Checkpoint(checkpoint) => {
                if self.registry.touch(session_id).is_none() {
                    return Err(self.release_dropped(session_id));
                }
                Ok(RespondResponse::Checkpoint { checkpoint })
            }
            StepOutcome::Finished {
                status,
                applied_changes,
            } => {
                self.registry.remove(session_id);
                Ok(RespondResponse::Finished {
                    status,
                    applied_changes,
                })
            }
        }
    }

    /// Re-run analysis after an analyzer failure left the session without a
    /// checkpoint.
    pub async fn retry(&self, session_id: &str) -> CascadeResult<Checkpoint> {
        let entry = self.active_entry(session_id)?;
        let _step = entry.step.lock().await;
        if !self.registry.contains(session_id) {
            return Err(self.release_dropped(session_id));
        }

        let mut state = self.engine.load(session_id)?;
        let checkpoint = self.engine.retry(&mut state, &entry.credential).await?;
        if self.registry.touch(session_id).is_none() {
            return Err(self.release_dropped(session_id));
        }
        Ok(checkpoint)
    }

    pub fn status(&self, session_id: &str) -> CascadeResult<StatusResponse> {
        let entry = self.active_entry(session_id)?;
        let state = self.engine.load(session_id)?;
        let last_activity_at = self
            .registry
            .touch(session_id)
            .unwrap_or(entry.last_activity_at);
        Ok(StatusResponse {
            session_id: entry.session_id,
            conversation_id: entry.conversation_id,
            started_at: rfc3339(entry.started_at),
            last_activity_at: rfc3339(last_activity_at),
            current_level: state.current_level,
            status: state.status,
            applied_change_count: state.applied_changes.len(),
            is_waiting: state.is_waiting(),
        })
    }

    /// Roll back everything the session wrote and forget it. Waits for an
    /// in-flight step to finish first.
    pub async fn cancel(&self, session_id: &str) -> CascadeResult<CancelResponse> {
        let entry = self.active_entry(session_id)?;
        let _step = entry.step.lock().await;
        if self.registry.remove(session_id).is_none() {
            return Err(CascadeError::session_not_found(session_id));
        }
        self.engine.abort(session_id)?;
        tracing::info!(session_id, "session cancelled");
        Ok(CancelResponse {
            status: "cancelled".to_string(),
        })
    }

    /// Roll back sessions left on disk by a previous process. The registry
    /// (and the credentials in it) did not survive, so they cannot resume.
    pub fn recover_orphans(&self) -> anyhow::Result<Vec<String>> {
        let mut ids = persist::list_session_records(self.paths())?;
        ids.extend(cascade_store::list_backup_sessions(self.paths())?);
        ids.sort();
        ids.dedup();

        let mut recovered = Vec::new();
        for id in ids {
            if self.registry.contains(&id) {
                continue;
            }
            let restored = self.engine.abort(&id)?;
            tracing::warn!(session_id = %id, restored = restored.len(), "orphaned session rolled back");
            recovered.push(id);
        }
        Ok(recovered)
    }

    fn active_entry(&self, session_id: &str) -> CascadeResult<SessionEntry> {
        match self.registry.get(session_id) {
            Lookup::Active(entry) => Ok(entry),
            Lookup::Expired(entry) => {
                self.expire(&entry);
                Err(CascadeError::session_not_found(session_id))
            }
            Lookup::Missing => Err(CascadeError::session_not_found(session_id)),
        }
    }

    /// Drop an expired session's artifacts. Committed levels stay. A step
    /// still holding the session lock cleans up after itself instead.
    fn expire(&self, entry: &SessionEntry) {
        let Ok(_step) = entry.step.try_lock() else {
            tracing::info!(session_id = %entry.session_id, "session expired mid-step, cleanup deferred");
            return;
        };
        tracing::info!(session_id = %entry.session_id, "session expired");
        if let Err(e) = self.engine.discard(&entry.session_id) {
            tracing::warn!(session_id = %entry.session_id, error = %e, "cleanup of expired session failed");
        }
    }

    /// Called under the step lock once the registry no longer holds the
    /// session. Whatever the step left on disk goes with it.
    fn release_dropped(&self, session_id: &str) -> CascadeError {
        tracing::info!(session_id, "session dropped while a step held it");
        if let Err(e) = self.engine.discard(session_id) {
            tracing::warn!(session_id, error = %e, "cleanup of dropped session failed");
        }
        CascadeError::session_not_found(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respond_response_shapes() {
        let finished = RespondResponse::Finished {
            status: SessionStatus::Completed,
            applied_changes: vec![AppliedChange {
                level: Level::Week,
                summary: "gym moved".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&finished).unwrap(),
            serde_json::json!({
                "status": "completed",
                "appliedChanges": [{"level": "week", "summary": "gym moved"}]
            })
        );

        let checkpoint = RespondResponse::Checkpoint {
            checkpoint: Checkpoint {
                level: Level::Month,
                message: "m".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&checkpoint).unwrap(),
            serde_json::json!({"checkpoint": {"level": "month", "message": "m"}})
        );
    }

    #[test]
    fn start_request_uses_camel_case() {
        let req: StartRequest = serde_json::from_value(serde_json::json!({
            "requestText": "skip gym",
            "documentDirectory": "/plans",
            "conversationId": "chat-1",
            "analyzerCredential": "sk"
        }))
        .unwrap();
        assert_eq!(req.document_directory, "/plans");
        assert_eq!(req.analyzer_credential, "sk");
    }
}
