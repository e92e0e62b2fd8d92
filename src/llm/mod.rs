//! LLM Client (spec §4.5 item "LLM Client"): request/response + streaming
//! abstraction, returning tokens, tool-call intents, and usage.

pub mod mock;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallIntent {
    pub id: String,
    pub tool_name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallIntent>,
    pub usage: Usage,
}

#[derive(Debug, Clone)]
pub enum LlmStreamEvent {
    Token(String),
    /// A reasoning-model "thinking" chunk. Stripped before persistence
    /// (§9 open question, resolved in DESIGN.md) but still forwarded to the
    /// caller so a UI may choose to show it live.
    Reasoning(String),
    ToolCall(ToolCallIntent),
    Done(Usage),
}

pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmStreamEvent, AgentError>> + Send>>;

/// Request/response + streaming abstraction over a concrete provider, which
/// is out of scope here (spec §1).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[LlmMessage], tools: &[(String, String)]) -> Result<LlmResponse, AgentError>;

    async fn stream(&self, messages: &[LlmMessage], tools: &[(String, String)]) -> Result<LlmStream, AgentError>;

    /// Structured-output request used by the planner (§4.4 step 2): the
    /// response is expected to be (possibly prose-wrapped) JSON.
    async fn complete_json(&self, messages: &[LlmMessage]) -> Result<String, AgentError> {
        Ok(self.complete(messages, &[]).await?.content)
    }
}

/// Strips known reasoning-model "thinking" markers before persistence
/// (§9). The exact token list is deployment-specific; this covers the
/// common `<think>...</think>` and `<reasoning>...</reasoning>` wrappers.
pub fn strip_reasoning(content: &str) -> String {
    let mut out = content.to_string();
    for (open, close) in [("<think>", "</think>"), ("<reasoning>", "</reasoning>")] {
        while let (Some(start), Some(end_rel)) = (out.find(open), out.find(close)) {
            let end = end_rel + close.len();
            if end <= start {
                break;
            }
            out.replace_range(start..end, "");
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_think_blocks() {
        let raw = "<think>internal reasoning</think>The answer is 4.";
        assert_eq!(strip_reasoning(raw), "The answer is 4.");
    }

    #[test]
    fn leaves_plain_content_untouched() {
        let raw = "just an answer";
        assert_eq!(strip_reasoning(raw), "just an answer");
    }
}
