use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Single-turn completion. The credential is supplied per call (bring your
/// own key), so one client serves every session.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, credential: &str)
        -> Result<String, LlmError>;
}

/// Model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
pub struct AnthropicClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl AnthropicClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { http, settings })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.settings.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, system: &str, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": prompt }],
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Pull the first text block out of a Messages API response body.
fn first_text_block(body: &str) -> Result<String, LlmError> {
    let parsed: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("malformed response body: {e}")))?;
    let block = parsed
        .content
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no content blocks".into()))?;
    if block.kind != "text" {
        return Err(LlmError::InvalidResponse(format!(
            "unexpected content block type: {}",
            block.kind
        )));
    }
    block
        .text
        .ok_or_else(|| LlmError::InvalidResponse("text block without text".into()))
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        credential: &str,
    ) -> Result<String, LlmError> {
        tracing::debug!(model = %self.settings.model, "sending completion request");
        let resp = self
            .http
            .post(self.endpoint())
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(system, prompt))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        first_text_block(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = AnthropicClient::new(LlmSettings {
            base_url: "http://localhost:9999/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9999/v1/messages");
    }

    #[test]
    fn request_body_shape() {
        let client = AnthropicClient::new(LlmSettings::default()).unwrap();
        let body = client.request_body("sys", "hello");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn extracts_first_text_block() {
        let body = r#"{"content":[{"type":"text","text":"{\"level\":\"week\"}"}]}"#;
        assert_eq!(first_text_block(body).unwrap(), r#"{"level":"week"}"#);
    }

    #[test]
    fn rejects_non_text_block() {
        let body = r#"{"content":[{"type":"tool_use","id":"x"}]}"#;
        assert!(matches!(
            first_text_block(body),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(first_text_block(r#"{"content":[]}"#).is_err());
        assert!(first_text_block("not json").is_err());
    }

    #[test]
    fn settings_fill_missing_fields() {
        let s: LlmSettings = serde_json::from_str(r#"{"model":"claude-haiku-4-5"}"#).unwrap();
        assert_eq!(s.model, "claude-haiku-4-5");
        assert_eq!(s.max_tokens, 4096);
        assert_eq!(s.base_url, "https://api.anthropic.com");
    }
}
