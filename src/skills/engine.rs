//! Skill Engine (spec §4.8): runs a skill's bounded tool-calling loop,
//! enforcing its permitted-tool scope and mediating human-in-the-loop
//! confirmation for tools its policy flags.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::llm::{LlmClient, LlmMessage};
use crate::tools::{Ambient, ToolCall, ToolRegistry};

use super::Skill;

/// Persisted on `Conversation.pending_hitl` while a skill is paused waiting
/// on a human answer (§4.8, §8 scenario 6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HitlSuspension {
    pub skill_id: String,
    pub pending_tool_call: ToolCall,
    pub transcript: Vec<LlmMessage>,
    pub question: String,
    pub suspended_at: chrono::DateTime<chrono::Utc>,
    pub ttl_s: u64,
}

impl HitlSuspension {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let age = (now - self.suspended_at).num_seconds().max(0) as u64;
        age > self.ttl_s
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkillRunOutcome {
    Completed(String),
    Suspended(HitlSuspension),
    Failed(ErrorKind, String),
}

pub struct SkillEngine {
    llm: Arc<dyn LlmClient>,
    max_tool_calls: u32,
    step_timeout: Duration,
}

impl SkillEngine {
    pub fn new(llm: Arc<dyn LlmClient>, max_tool_calls: u32, step_timeout: Duration) -> Self {
        Self {
            llm,
            max_tool_calls,
            step_timeout,
        }
    }

    /// Runs `skill` against `prompt` within the scoped `tools` registry.
    /// Fails closed (`ContextDenied`) if a required context field is
    /// missing, and refuses any tool call outside the skill's permitted
    /// set regardless of what the registry otherwise allows.
    pub async fn run(
        &self,
        skill: &Skill,
        prompt: &str,
        context_fields: &std::collections::HashMap<String, serde_json::Value>,
        tools: &ToolRegistry,
        ambient: Ambient,
        rate_limit_scope: &str,
    ) -> SkillRunOutcome {
        for field in &skill.required_context {
            if !context_fields.contains_key(field) {
                return SkillRunOutcome::Failed(
                    ErrorKind::ContextDenied,
                    format!("skill '{}' requires context field '{field}' which is not present", skill.id),
                );
            }
        }

        let mut transcript = vec![
            LlmMessage::system(skill.system_prompt.clone()),
            LlmMessage::user(prompt.to_string()),
        ];
        self.drive(skill, transcript.as_mut(), tools, ambient, rate_limit_scope).await
    }

    /// Resumes a suspended run with the human's answer appended as a tool
    /// result, then continues the loop.
    pub async fn resume(
        &self,
        skill: &Skill,
        suspension: HitlSuspension,
        answer: &str,
        tools: &ToolRegistry,
        ambient: Ambient,
        rate_limit_scope: &str,
    ) -> SkillRunOutcome {
        let mut transcript = suspension.transcript;
        transcript.push(LlmMessage::user(format!(
            "Human answered the confirmation for tool '{}': {answer}",
            suspension.pending_tool_call.tool_name
        )));
        self.drive(skill, transcript.as_mut(), tools, ambient, rate_limit_scope).await
    }

    async fn drive(
        &self,
        skill: &Skill,
        transcript: &mut Vec<LlmMessage>,
        tools: &ToolRegistry,
        ambient: Ambient,
        rate_limit_scope: &str,
    ) -> SkillRunOutcome {
        let catalogue: Vec<(String, String)> = tools
            .catalogue()
            .into_iter()
            .filter(|(name, _)| skill.permitted_tools.contains(name))
            .collect();

        for _ in 0..self.max_tool_calls {
            let call_fut = self.llm.complete(transcript, &catalogue);
            let response = match tokio::time::timeout(self.step_timeout, call_fut).await {
                Err(_) => {
                    return SkillRunOutcome::Failed(ErrorKind::RequestTimeout, "skill step timed out".to_string())
                }
                Ok(Err(e)) => return SkillRunOutcome::Failed(e.kind(), e.user_message()),
                Ok(Ok(response)) => response,
            };

            if response.tool_calls.is_empty() {
                return SkillRunOutcome::Completed(response.content);
            }

            for intent in response.tool_calls {
                if !skill.permitted_tools.contains(&intent.tool_name) {
                    return SkillRunOutcome::Failed(
                        ErrorKind::ToolNotPermitted,
                        format!("skill '{}' is not permitted to call tool '{}'", skill.id, intent.tool_name),
                    );
                }

                let tool_call = ToolCall {
                    id: intent.id,
                    tool_name: intent.tool_name,
                    args: intent.args,
                };

                if let Some(policy) = &skill.hitl_policy {
                    if policy.confirm_tools.contains(&tool_call.tool_name) {
                        return SkillRunOutcome::Suspended(HitlSuspension {
                            skill_id: skill.id.clone(),
                            pending_tool_call: tool_call.clone(),
                            transcript: transcript.clone(),
                            question: format!(
                                "Confirm running '{}' with args {}?",
                                tool_call.tool_name,
                                serde_json::Value::Object(tool_call.args.clone())
                            ),
                            suspended_at: chrono::Utc::now(),
                            ttl_s: 3600,
                        });
                    }
                }

                match tools.invoke(&tool_call, ambient.clone(), rate_limit_scope).await {
                    Ok(output) => transcript.push(LlmMessage::assistant(output)),
                    Err((kind, message)) => {
                        if !kind.retryable() {
                            return SkillRunOutcome::Failed(kind, message);
                        }
                        transcript.push(LlmMessage::system(format!("tool call failed: {message}")));
                    }
                }
            }
        }

        SkillRunOutcome::Failed(
            ErrorKind::Internal,
            format!("skill '{}' exceeded its bounded tool-call budget", skill.id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::llm::{LlmResponse, Usage};
    use crate::tools::{builtin_tools, ToolRegistry};
    use std::collections::{HashMap, HashSet};

    fn skill(permitted: &[&str]) -> Skill {
        Skill {
            id: "test_skill".to_string(),
            display_name: "Test Skill".to_string(),
            system_prompt: "help".to_string(),
            permitted_tools: permitted.iter().map(|s| s.to_string()).collect(),
            required_context: Vec::new(),
            hitl_policy: None,
            trigger_patterns: Vec::new(),
        }
    }

    fn ambient() -> Ambient {
        Ambient {
            context_id: "ctx-1".to_string(),
            cwd: None,
            user_email: None,
            oauth_token: None,
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::from_tools(builtin_tools(), Duration::from_secs(5), 10)
    }

    #[tokio::test]
    async fn completes_without_tool_calls() {
        let llm = Arc::new(MockLlmClient::new(vec![LlmResponse {
            content: "all done".to_string(),
            tool_calls: Vec::new(),
            usage: Usage::default(),
        }]));
        let engine = SkillEngine::new(llm, 5, Duration::from_secs(5));
        let outcome = engine
            .run(&skill(&[]), "do it", &HashMap::new(), &registry(), ambient(), "scope")
            .await;
        assert_eq!(outcome, SkillRunOutcome::Completed("all done".to_string()));
    }

    #[tokio::test]
    async fn missing_required_context_is_denied() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let engine = SkillEngine::new(llm, 5, Duration::from_secs(5));
        let mut s = skill(&[]);
        s.required_context.push("user_id".to_string());
        let outcome = engine
            .run(&s, "do it", &HashMap::new(), &registry(), ambient(), "scope")
            .await;
        assert!(matches!(outcome, SkillRunOutcome::Failed(ErrorKind::ContextDenied, _)));
    }

    #[tokio::test]
    async fn tool_call_outside_permitted_set_is_refused() {
        use crate::llm::ToolCallIntent;
        let llm = Arc::new(MockLlmClient::new(vec![LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCallIntent {
                id: "c1".to_string(),
                tool_name: "send_email".to_string(),
                args: Default::default(),
            }],
            usage: Usage::default(),
        }]));
        let engine = SkillEngine::new(llm, 5, Duration::from_secs(5));
        let outcome = engine
            .run(&skill(&["web_fetch"]), "do it", &HashMap::new(), &registry(), ambient(), "scope")
            .await;
        assert!(matches!(outcome, SkillRunOutcome::Failed(ErrorKind::ToolNotPermitted, _)));
    }

    #[tokio::test]
    async fn confirm_tool_suspends_for_hitl() {
        use crate::llm::ToolCallIntent;
        use super::super::HitlPolicy;
        let llm = Arc::new(MockLlmClient::new(vec![LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCallIntent {
                id: "c1".to_string(),
                tool_name: "send_email".to_string(),
                args: Default::default(),
            }],
            usage: Usage::default(),
        }]));
        let mut s = skill(&["send_email"]);
        s.hitl_policy = Some(HitlPolicy {
            confirm_tools: HashSet::from(["send_email".to_string()]),
        });
        let engine = SkillEngine::new(llm, 5, Duration::from_secs(5));
        let outcome = engine
            .run(&s, "do it", &HashMap::new(), &registry(), ambient(), "scope")
            .await;
        assert!(matches!(outcome, SkillRunOutcome::Suspended(_)));
    }
}
