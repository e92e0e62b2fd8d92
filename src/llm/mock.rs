//! Scripted LLM client for deterministic, offline tests (grounded on the
//! teacher's `tests/mock_llm.rs` pattern).

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use super::{LlmClient, LlmMessage, LlmResponse, LlmStream, LlmStreamEvent, Usage};
use crate::error::{AgentError, ErrorKind};

pub struct MockLlmClient {
    responses: Mutex<Vec<LlmResponse>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    pub fn with_json_plans(plans: Vec<String>) -> Self {
        Self::new(
            plans
                .into_iter()
                .map(|content| LlmResponse {
                    content,
                    tool_calls: Vec::new(),
                    usage: Usage::default(),
                })
                .collect(),
        )
    }

    fn next(&self) -> Result<LlmResponse, AgentError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(AgentError::new(ErrorKind::LlmFailed, "mock LLM exhausted its scripted responses"));
        }
        Ok(responses.remove(0))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[LlmMessage], _tools: &[(String, String)]) -> Result<LlmResponse, AgentError> {
        self.next()
    }

    async fn stream(&self, _messages: &[LlmMessage], _tools: &[(String, String)]) -> Result<LlmStream, AgentError> {
        let response = self.next()?;
        let mut events = vec![LlmStreamEvent::Token(response.content)];
        for call in response.tool_calls {
            events.push(LlmStreamEvent::ToolCall(call));
        }
        events.push(LlmStreamEvent::Done(response.usage));
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}
