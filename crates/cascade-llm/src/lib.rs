//! Default capability adapters: prompt a model, parse its JSON reply.

pub mod adapters;
pub mod client;
pub mod prompts;

pub use adapters::{LlmAnalyzer, LlmClassifier};
pub use client::{AnthropicClient, LlmClient, LlmError, LlmSettings};
