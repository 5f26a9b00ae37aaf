use cascade_core::ports::{
    AnalyzeRequest, Classification, ClassifyRequest, ImpactAnalyzer, ImpactClassifier,
    ImpactProposal,
};
use cascade_core::{CascadeError, CascadeResult, Level};
use serde::Deserialize;
use std::sync::Arc;

use crate::client::LlmClient;
use crate::prompts;

/// Slice out the outermost `{...}` span of a model reply.
/// Models often wrap JSON in prose or code fences.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[derive(Deserialize)]
struct LevelReply {
    level: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImpactReply {
    impact_summary: String,
    proposed_content: String,
    requires_propagation: bool,
}

pub fn parse_classification(raw: &str) -> Result<Classification, String> {
    let json = extract_json_object(raw)
        .ok_or_else(|| format!("no JSON object in level detection response: {raw}"))?;
    let reply: LevelReply =
        serde_json::from_str(json).map_err(|e| format!("malformed level detection JSON: {e}"))?;
    let level: Level = reply.level.parse().map_err(|e| format!("{e}"))?;
    Ok(Classification {
        level,
        rationale: reply.reasoning,
    })
}

pub fn parse_proposal(raw: &str) -> Result<ImpactProposal, String> {
    let json = extract_json_object(raw)
        .ok_or_else(|| format!("no JSON object in impact analysis response: {raw}"))?;
    let reply: ImpactReply =
        serde_json::from_str(json).map_err(|e| format!("malformed impact analysis JSON: {e}"))?;
    Ok(ImpactProposal {
        impact_summary: reply.impact_summary,
        proposed_content: reply.proposed_content,
        requires_propagation: reply.requires_propagation,
    })
}

/// Impact classifier backed by an LLM.
pub struct LlmClassifier {
    client: Arc<dyn LlmClient>,
}

impl LlmClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ImpactClassifier for LlmClassifier {
    async fn classify(&self, req: &ClassifyRequest<'_>) -> CascadeResult<Classification> {
        let prompt = prompts::build_classify_prompt(req.request_text, req.documents);
        let raw = self
            .client
            .complete(prompts::CLASSIFY_SYSTEM, &prompt, req.credential)
            .await
            .map_err(|e| CascadeError::Classification(e.to_string()))?;
        parse_classification(&raw).map_err(CascadeError::Classification)
    }
}

/// Impact analyzer backed by an LLM.
pub struct LlmAnalyzer {
    client: Arc<dyn LlmClient>,
}

impl LlmAnalyzer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ImpactAnalyzer for LlmAnalyzer {
    async fn analyze(&self, req: &AnalyzeRequest<'_>) -> CascadeResult<ImpactProposal> {
        let prompt = prompts::build_analyze_prompt(
            req.request_text,
            req.level,
            req.content,
            req.prior_changes,
            req.feedback,
        );
        let to_err = |message: String| CascadeError::Analysis {
            level: req.level,
            message,
        };
        let raw = self
            .client
            .complete(prompts::ANALYZE_SYSTEM, &prompt, req.credential)
            .await
            .map_err(|e| to_err(e.to_string()))?;
        parse_proposal(&raw).map_err(to_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LlmError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Replies with canned text and records the prompts it saw.
    struct CannedClient {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for CannedClient {
        async fn complete(
            &self,
            _system: &str,
            prompt: &str,
            _credential: &str,
        ) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|m| LlmError::Api { status: 500, message: m })
        }
    }

    #[test]
    fn extract_handles_fences_and_prose() {
        let raw = "Sure!\n```json\n{\"level\": \"week\", \"reasoning\": \"x\"}\n```";
        assert_eq!(
            extract_json_object(raw),
            Some("{\"level\": \"week\", \"reasoning\": \"x\"}")
        );
        assert_eq!(extract_json_object("no braces here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn classification_rejects_unknown_level() {
        let err = parse_classification(r#"{"level":"decade"}"#).unwrap_err();
        assert!(err.contains("decade"));
        let ok = parse_classification(r#"{"level":"Month","reasoning":"targets"}"#).unwrap();
        assert_eq!(ok.level, Level::Month);
        assert_eq!(ok.rationale, "targets");
    }

    #[test]
    fn proposal_requires_all_fields() {
        assert!(parse_proposal(r#"{"impactSummary":"x","proposedContent":"y"}"#).is_err());
        let p = parse_proposal(
            r#"{"impactSummary":"s","proposedContent":"body","requiresPropagation":true,"reasoning":"r"}"#,
        )
        .unwrap();
        assert!(p.requires_propagation);
        assert_eq!(p.proposed_content, "body");
    }

    #[tokio::test]
    async fn classifier_maps_reply() {
        let client = CannedClient::ok(r#"{"level":"week","reasoning":"this week's plan"}"#);
        let classifier = LlmClassifier::new(client.clone());
        let docs = BTreeMap::new();
        let out = classifier
            .classify(&ClassifyRequest {
                request_text: "skip gym",
                documents: &docs,
                credential: "sk-test",
            })
            .await
            .unwrap();
        assert_eq!(out.level, Level::Week);
        assert!(client.prompts.lock().unwrap()[0].contains("skip gym"));
    }

    #[tokio::test]
    async fn classifier_client_failure_is_classification_error() {
        let classifier = LlmClassifier::new(CannedClient::failing("overloaded"));
        let docs = BTreeMap::new();
        let err = classifier
            .classify(&ClassifyRequest {
                request_text: "x",
                documents: &docs,
                credential: "k",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Classification(_)));
    }

    #[tokio::test]
    async fn analyzer_garbage_is_analysis_error_at_level() {
        let analyzer = LlmAnalyzer::new(CannedClient::ok("I think it's fine."));
        let err = analyzer
            .analyze(&AnalyzeRequest {
                request_text: "x",
                level: Level::Quarter,
                content: "# Q1",
                prior_changes: &[],
                feedback: None,
                credential: "k",
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CascadeError::Analysis {
                level: Level::Quarter,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn analyzer_passes_feedback_into_prompt() {
        let client = CannedClient::ok(
            r#"{"impactSummary":"s","proposedContent":"b","requiresPropagation":false}"#,
        );
        let analyzer = LlmAnalyzer::new(client.clone());
        analyzer
            .analyze(&AnalyzeRequest {
                request_text: "x",
                level: Level::Week,
                content: "# W",
                prior_changes: &[],
                feedback: Some("less aggressive"),
                credential: "k",
            })
            .await
            .unwrap();
        assert!(client.prompts.lock().unwrap()[0].contains("less aggressive"));
    }
}
