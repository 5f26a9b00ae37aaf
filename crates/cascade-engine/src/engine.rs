//! Propagation engine: drives one session through
//! analyze → checkpoint → commit/rollback/re-analyze → propagate.
//!
//! Every step takes the continuation record by `&mut` and saves it before
//! returning at a suspension point. Callers load the record from disk at
//! the start of each step, so an unsaved mutation is simply discarded.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use cascade_core::ports::{
    AnalyzeRequest, Classification, ClassifyRequest, ImpactAnalyzer, ImpactClassifier,
};
use cascade_core::{
    Analysis, AppliedChange, ApprovalDecision, CascadeError, CascadeResult, Checkpoint, Document,
    FileChange, Level, SessionStatus,
};
use cascade_store::{BackupSet, StorePaths};

use crate::checkpoint::render_checkpoint;
use crate::clock::{rfc3339, Clock};
use crate::state::machine::{
    decide_propagation, route_decision, transition, Propagation, Route, SessionState,
};
use crate::state::persist;

/// Result of one engine step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Suspended at a new checkpoint.
    Checkpoint(Checkpoint),
    /// Reached a terminal status. Session artifacts are gone.
    Finished {
        status: SessionStatus,
        applied_changes: Vec<AppliedChange>,
    },
}

pub struct PropagationEngine {
    classifier: Arc<dyn ImpactClassifier>,
    analyzer: Arc<dyn ImpactAnalyzer>,
    paths: StorePaths,
    clock: Arc<dyn Clock>,
}

impl PropagationEngine {
    pub fn new(
        classifier: Arc<dyn ImpactClassifier>,
        analyzer: Arc<dyn ImpactAnalyzer>,
        paths: StorePaths,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            classifier,
            analyzer,
            paths,
            clock,
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn now(&self) -> String {
        rfc3339(self.clock.now())
    }

    // ── Persistence ──

    pub fn load(&self, session_id: &str) -> CascadeResult<SessionState> {
        persist::load_state(&self.paths, session_id)?
            .ok_or_else(|| CascadeError::session_not_found(session_id))
    }

    fn save(&self, state: &mut SessionState) -> CascadeResult<()> {
        state.updated_at = self.now();
        persist::save_state(&self.paths, state)?;
        Ok(())
    }

    fn advance_status(
        &self,
        state: &mut SessionState,
        from: SessionStatus,
        to: SessionStatus,
    ) -> CascadeResult<()> {
        if !transition(state, from, to)? {
            return Err(CascadeError::Validation(format!(
                "session {} is {}, expected {from}",
                state.session_id, state.status
            )));
        }
        Ok(())
    }

    // ── Steps ──

    /// Ask the classifier where the request originates.
    pub async fn resolve_level(
        &self,
        request_text: &str,
        documents: &BTreeMap<Level, Document>,
        credential: &str,
    ) -> CascadeResult<Classification> {
        let classification = self
            .classifier
            .classify(&ClassifyRequest {
                request_text,
                documents,
                credential,
            })
            .await?;
        tracing::info!(
            level = %classification.level,
            rationale = %classification.rationale,
            "change level classified"
        );
        Ok(classification)
    }

    /// Analyze the current level and suspend at a checkpoint.
    /// Requires `AwaitingAnalysis`; on success the record is saved as
    /// `AwaitingApproval`.
    pub async fn analyze(
        &self,
        state: &mut SessionState,
        credential: &str,
        feedback: Option<&str>,
    ) -> CascadeResult<Checkpoint> {
        if state.status != SessionStatus::AwaitingAnalysis {
            return Err(CascadeError::Validation(format!(
                "session {} is {}, not awaiting analysis",
                state.session_id, state.status
            )));
        }
        let level = state.current_level;

        let analysis = match state.documents.get(&level) {
            None => {
                tracing::info!(session_id = %state.session_id, %level, "no document at level, skipping analyzer");
                Analysis::no_document(level)
            }
            Some(doc) => {
                let proposal = self
                    .analyzer
                    .analyze(&AnalyzeRequest {
                        request_text: &state.request_text,
                        level,
                        content: &doc.content,
                        prior_changes: &state.applied_changes,
                        feedback,
                        credential,
                    })
                    .await?;
                Analysis {
                    level,
                    impact_summary: proposal.impact_summary,
                    proposed_content: proposal.proposed_content,
                    requires_propagation: proposal.requires_propagation,
                }
            }
        };
        tracing::info!(
            session_id = %state.session_id,
            %level,
            requires_propagation = analysis.requires_propagation,
            "impact analysis complete"
        );

        let checkpoint = render_checkpoint(&analysis);
        state.pending_analysis = Some(analysis);
        state.checkpoint_message = Some(checkpoint.message.clone());
        self.advance_status(
            state,
            SessionStatus::AwaitingAnalysis,
            SessionStatus::AwaitingApproval,
        )?;
        self.save(state)?;
        tracing::info!(session_id = %state.session_id, %level, version = state.version, "suspended at checkpoint");
        Ok(checkpoint)
    }

    /// Apply a reviewer decision to a session suspended at a checkpoint.
    pub async fn apply_decision(
        &self,
        state: &mut SessionState,
        decision: &ApprovalDecision,
        credential: &str,
    ) -> CascadeResult<StepOutcome> {
        if state.status != SessionStatus::AwaitingApproval {
            return Err(CascadeError::Validation(format!(
                "session {} is {}, not awaiting approval",
                state.session_id, state.status
            )));
        }
        tracing::info!(
            session_id = %state.session_id,
            level = %state.current_level,
            decision = %decision.decision,
            "applying decision"
        );
        state.last_decision = Some(decision.decision);

        match route_decision(decision.decision) {
            Route::Rollback => self.reject(state),
            Route::Reanalyze => {
                let feedback = decision
                    .feedback
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| {
                        CascadeError::Validation("modify requires feedback".to_string())
                    })?;
                state.pending_analysis = None;
                state.checkpoint_message = None;
                state.reanalysis_count += 1;
                self.advance_status(
                    state,
                    SessionStatus::AwaitingApproval,
                    SessionStatus::AwaitingAnalysis,
                )?;
                let checkpoint = self.analyze(state, credential, Some(feedback)).await?;
                Ok(StepOutcome::Checkpoint(checkpoint))
            }
            Route::Commit => {
                let analysis = state.pending_analysis.take().ok_or_else(|| {
                    CascadeError::Validation(format!(
                        "session {} has no pending analysis",
                        state.session_id
                    ))
                })?;
                state.checkpoint_message = None;
                self.commit(state, &analysis)?;

                match decide_propagation(state, &analysis, decision.decision) {
                    Propagation::Advance(next) => {
                        self.advance_status(
                            state,
                            SessionStatus::AwaitingApproval,
                            SessionStatus::AwaitingAnalysis,
                        )?;
                        state.current_level = next;
                        self.save(state)?;
                        tracing::info!(session_id = %state.session_id, level = %next, "advancing one level up");
                        let checkpoint = self.analyze(state, credential, None).await?;
                        Ok(StepOutcome::Checkpoint(checkpoint))
                    }
                    Propagation::Finish(status) => self.finish(state, status),
                }
            }
        }
    }

    /// Re-run analysis for a session left in `AwaitingAnalysis` by a failed
    /// analyzer call.
    pub async fn retry(
        &self,
        state: &mut SessionState,
        credential: &str,
    ) -> CascadeResult<Checkpoint> {
        self.analyze(state, credential, None).await
    }

    /// Write the pending analysis to disk and record it. Empty proposals and
    /// levels without a document are no-ops.
    fn commit(&self, state: &mut SessionState, analysis: &Analysis) -> CascadeResult<()> {
        let level = analysis.level;
        if analysis.is_empty() {
            tracing::info!(session_id = %state.session_id, %level, "empty proposal, nothing to commit");
            return Ok(());
        }
        let Some(doc) = state.documents.get_mut(&level) else {
            tracing::info!(session_id = %state.session_id, %level, "no document to commit");
            return Ok(());
        };

        let backups = BackupSet::open(&self.paths, &state.session_id);
        backups.write(&PathBuf::from(&doc.path), &analysis.proposed_content)?;

        let original = std::mem::replace(&mut doc.content, analysis.proposed_content.clone());
        state.applied_changes.push(FileChange {
            level,
            file_path: doc.path.clone(),
            original_content: original,
            new_content: analysis.proposed_content.clone(),
            summary: analysis.impact_summary.clone(),
        });
        tracing::info!(session_id = %state.session_id, %level, path = %doc.path, "change committed");
        Ok(())
    }

    fn reject(&self, state: &mut SessionState) -> CascadeResult<StepOutcome> {
        let restored = BackupSet::open(&self.paths, &state.session_id).rollback()?;
        tracing::info!(
            session_id = %state.session_id,
            restored = restored.len(),
            "session rejected, changes rolled back"
        );
        state.pending_analysis = None;
        state.applied_changes.clear();
        self.finish(state, SessionStatus::Rejected)
    }

    /// Enter a terminal status and drop the session's artifacts. Committed
    /// files stay as they are.
    fn finish(&self, state: &mut SessionState, status: SessionStatus) -> CascadeResult<StepOutcome> {
        self.advance_status(state, SessionStatus::AwaitingApproval, status)?;
        self.discard(&state.session_id)?;
        tracing::info!(
            session_id = %state.session_id,
            %status,
            applied = state.applied_changes.len(),
            "session finished"
        );
        Ok(StepOutcome::Finished {
            status,
            applied_changes: state.applied_summary(),
        })
    }

    // ── Cleanup ──

    /// Restore every file the session touched and remove its artifacts.
    /// Returns the restored paths.
    pub fn abort(&self, session_id: &str) -> CascadeResult<Vec<PathBuf>> {
        let restored = BackupSet::open(&self.paths, session_id).rollback()?;
        persist::remove_state(&self.paths, session_id)?;
        tracing::info!(session_id, restored = restored.len(), "session aborted");
        Ok(restored)
    }

    /// Remove the session's artifacts without restoring anything.
    pub fn discard(&self, session_id: &str) -> CascadeResult<()> {
        BackupSet::open(&self.paths, session_id).cleanup()?;
        persist::remove_state(&self.paths, session_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{proposal, ScriptedAnalyzer, ScriptedClassifier};
    use cascade_core::Decision;
    use std::fs;

    struct Fixture {
        _tmp: tempfile::TempDir,
        docs: PathBuf,
        engine: PropagationEngine,
        analyzer: Arc<ScriptedAnalyzer>,
    }

    fn fixture(script: Vec<CascadeResult<cascade_core::ports::ImpactProposal>>) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("plans");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("week-feb14-20.md"), "# Week\n- gym mon").unwrap();
        fs::write(docs.join("feb-2026.md"), "# Feb\n- 12 gym sessions").unwrap();
        let paths = StorePaths::discover(tmp.path().join("state"));
        paths.ensure_layout().unwrap();
        let analyzer = Arc::new(ScriptedAnalyzer::new(script));
        let engine = PropagationEngine::new(
            Arc::new(ScriptedClassifier::returning(Level::Week)),
            analyzer.clone(),
            paths,
            Arc::new(ManualClock::default()),
        );
        Fixture {
            _tmp: tmp,
            docs,
            engine,
            analyzer,
        }
    }

    fn new_state(f: &Fixture, origin: Level) -> SessionState {
        let documents = cascade_store::discover(&f.docs).unwrap();
        SessionState::new(
            "ses_test",
            "chat-1",
            "skip gym",
            &f.docs.to_string_lossy(),
            origin,
            documents,
            "t0",
        )
    }

    fn decide(decision: Decision, feedback: Option<&str>) -> ApprovalDecision {
        ApprovalDecision {
            decision,
            feedback: feedback.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn analyze_saves_checkpoint() {
        let f = fixture(vec![Ok(proposal("gym moved", "# Week\n- gym thu", true))]);
        let mut state = new_state(&f, Level::Week);
        let cp = f.engine.analyze(&mut state, "k", None).await.unwrap();
        assert_eq!(cp.level, Level::Week);

        let saved = f.engine.load("ses_test").unwrap();
        assert_eq!(saved.status, SessionStatus::AwaitingApproval);
        assert_eq!(saved.checkpoint_message.as_deref(), Some(cp.message.as_str()));
        assert_eq!(saved.version, 1);
    }

    #[tokio::test]
    async fn missing_origin_document_skips_analyzer() {
        let f = fixture(vec![]);
        let mut state = new_state(&f, Level::Day);
        let cp = f.engine.analyze(&mut state, "k", None).await.unwrap();
        assert!(cp.message.contains("No file found for day level"));
        assert!(f.analyzer.calls().is_empty());

        let outcome = f
            .engine
            .apply_decision(&mut state, &decide(Decision::Approve, None), "k")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Finished {
                status: SessionStatus::Completed,
                applied_changes: vec![],
            }
        );
    }

    #[tokio::test]
    async fn empty_proposal_commits_nothing() {
        let f = fixture(vec![Ok(proposal("no change needed", "", false))]);
        let mut state = new_state(&f, Level::Week);
        f.engine.analyze(&mut state, "k", None).await.unwrap();
        f.engine
            .apply_decision(&mut state, &decide(Decision::Approve, None), "k")
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(f.docs.join("week-feb14-20.md")).unwrap(),
            "# Week\n- gym mon"
        );
        assert!(state.applied_changes.is_empty());
    }

    #[tokio::test]
    async fn modify_without_feedback_is_rejected() {
        let f = fixture(vec![Ok(proposal("s", "b", true))]);
        let mut state = new_state(&f, Level::Week);
        f.engine.analyze(&mut state, "k", None).await.unwrap();
        let err = f
            .engine
            .apply_decision(&mut state, &decide(Decision::Modify, Some("  ")), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Validation(_)));
    }

    #[tokio::test]
    async fn failed_advance_leaves_record_awaiting_analysis() {
        let f = fixture(vec![
            Ok(proposal("gym moved", "# Week\n- gym thu", true)),
            Err(CascadeError::Analysis {
                level: Level::Month,
                message: "timeout".into(),
            }),
            Ok(proposal("month adjusted", "# Feb\n- 11 gym sessions", false)),
        ]);
        let mut state = new_state(&f, Level::Week);
        f.engine.analyze(&mut state, "k", None).await.unwrap();
        let err = f
            .engine
            .apply_decision(&mut state, &decide(Decision::Approve, None), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Analysis { .. }));

        let mut saved = f.engine.load("ses_test").unwrap();
        assert_eq!(saved.status, SessionStatus::AwaitingAnalysis);
        assert_eq!(saved.current_level, Level::Month);
        assert_eq!(saved.applied_changes.len(), 1);

        let cp = f.engine.retry(&mut saved, "k").await.unwrap();
        assert_eq!(cp.level, Level::Month);
    }

    #[tokio::test]
    async fn decision_outside_checkpoint_is_rejected() {
        let f = fixture(vec![]);
        let mut state = new_state(&f, Level::Week);
        let err = f
            .engine
            .apply_decision(&mut state, &decide(Decision::Approve, None), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Validation(_)));
    }

    #[tokio::test]
    async fn abort_restores_and_removes_record() {
        let f = fixture(vec![
            Ok(proposal("gym moved", "# Week\n- gym thu", true)),
            Ok(proposal("m", "# Feb\n- 11", false)),
        ]);
        let mut state = new_state(&f, Level::Week);
        f.engine.analyze(&mut state, "k", None).await.unwrap();
        f.engine
            .apply_decision(&mut state, &decide(Decision::Approve, None), "k")
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(f.docs.join("week-feb14-20.md")).unwrap(),
            "# Week\n- gym thu"
        );

        let restored = f.engine.abort("ses_test").unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(
            fs::read_to_string(f.docs.join("week-feb14-20.md")).unwrap(),
            "# Week\n- gym mon"
        );
        assert!(f.engine.load("ses_test").is_err());
    }
}
