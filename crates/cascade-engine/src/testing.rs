//! Scripted capability fakes for driving the engine deterministically.

use std::collections::VecDeque;
use std::sync::Mutex;

use cascade_core::ports::{
    AnalyzeRequest, Classification, ClassifyRequest, ImpactAnalyzer, ImpactClassifier,
    ImpactProposal,
};
use cascade_core::{CascadeError, CascadeResult, Level};

pub fn proposal(summary: &str, content: &str, requires_propagation: bool) -> ImpactProposal {
    ImpactProposal {
        impact_summary: summary.to_string(),
        proposed_content: content.to_string(),
        requires_propagation,
    }
}

/// Classifier that always answers the same way.
pub struct ScriptedClassifier {
    answer: Result<Level, String>,
}

impl ScriptedClassifier {
    pub fn returning(level: Level) -> Self {
        Self { answer: Ok(level) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl ImpactClassifier for ScriptedClassifier {
    async fn classify(&self, _req: &ClassifyRequest<'_>) -> CascadeResult<Classification> {
        match &self.answer {
            Ok(level) => Ok(Classification {
                level: *level,
                rationale: "scripted".to_string(),
            }),
            Err(message) => Err(CascadeError::Classification(message.clone())),
        }
    }
}

/// What the analyzer was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeCall {
    pub level: Level,
    pub content: String,
    pub prior_levels: Vec<Level>,
    pub feedback: Option<String>,
}

/// Analyzer that replays a fixed list of results, one per call.
pub struct ScriptedAnalyzer {
    script: Mutex<VecDeque<CascadeResult<ImpactProposal>>>,
    calls: Mutex<Vec<AnalyzeCall>>,
}

impl ScriptedAnalyzer {
    pub fn new(script: Vec<CascadeResult<ImpactProposal>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<AnalyzeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ImpactAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, req: &AnalyzeRequest<'_>) -> CascadeResult<ImpactProposal> {
        self.calls.lock().unwrap().push(AnalyzeCall {
            level: req.level,
            content: req.content.to_string(),
            prior_levels: req.prior_changes.iter().map(|c| c.level).collect(),
            feedback: req.feedback.map(str::to_string),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(CascadeError::Analysis {
                    level: req.level,
                    message: "analyzer script exhausted".to_string(),
                })
            })
    }
}
