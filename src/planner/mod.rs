//! Planner (spec §4.4): generates a structured Plan from an AgentRequest.

mod extract;

pub use extract::extract_json_fragment;

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{LlmClient, LlmMessage};
use crate::plan::{ExecutorKind, Plan, PlanStep};
use crate::types::{AgentRequest, Message};

const GREETINGS: &[&str] = &["hello", "hi", "hey", "thanks", "thank you", "ok", "okay"];

#[derive(Debug, Deserialize)]
struct RawPlan {
    description: String,
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    label: String,
    executor: String,
    #[serde(alias = "tool")]
    action: Option<String>,
    #[serde(default)]
    args: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    depends_on: Vec<String>,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    max_retries: u32,
    input_char_cap: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, max_retries: u32, input_char_cap: usize) -> Self {
        Self {
            llm,
            max_retries,
            input_char_cap,
        }
    }

    fn truncate_prompt(&self, prompt: &str) -> String {
        if prompt.chars().count() <= self.input_char_cap {
            prompt.to_string()
        } else {
            let truncated: String = prompt.chars().take(self.input_char_cap).collect();
            format!("{truncated}\n[...truncated, {} more characters omitted...]", prompt.chars().count() - self.input_char_cap)
        }
    }

    fn build_prompt(
        &self,
        request: &AgentRequest,
        history: &[Message],
        tool_catalogue: &[(String, String)],
        skill_catalogue: &[(String, String)],
        feedback: Option<&str>,
    ) -> Vec<LlmMessage> {
        let mut system = String::from(
            "You are a planning assistant. Produce a JSON object of the shape \
             {\"description\": string, \"steps\": [{\"id\": string, \"label\": string, \
             \"executor\": \"tool\"|\"skill\"|\"completion\"|\"litellm\", \"tool\": string, \
             \"args\": object, \"depends_on\": [string]}]}. Emit nothing but that object, \
             though it may be preceded or followed by prose.\n\nAvailable tools:\n",
        );
        for (name, desc) in tool_catalogue {
            system.push_str(&format!("- {name}: {desc}\n"));
        }
        system.push_str("\nAvailable skills:\n");
        for (name, desc) in skill_catalogue {
            system.push_str(&format!("- {name}: {desc}\n"));
        }

        let mut messages = vec![LlmMessage::system(system)];
        for turn in history {
            match turn.role {
                crate::types::Role::User => messages.push(LlmMessage::user(turn.content.clone())),
                crate::types::Role::Assistant => messages.push(LlmMessage::assistant(turn.content.clone())),
                crate::types::Role::Tool => {}
            }
        }
        messages.push(LlmMessage::user(self.truncate_prompt(&request.prompt)));
        if let Some(fb) = feedback {
            messages.push(LlmMessage::system(format!(
                "The last output was invalid because: {fb}. Try again."
            )));
        }
        messages
    }

    pub fn looks_conversational(prompt: &str) -> bool {
        let normalized = prompt.trim().trim_end_matches(['.', '!']).to_lowercase();
        GREETINGS.contains(&normalized.as_str())
    }

    fn looks_like_prompt_echo(raw: &str) -> bool {
        raw.contains("You are a planning assistant") || raw.contains("Available tools:")
    }

    fn parse(&self, fragment: &str) -> Result<Plan, String> {
        let raw: RawPlan = serde_json::from_str(fragment).map_err(|e| e.to_string())?;
        if raw.steps.is_empty() && raw.description.trim().is_empty() {
            return Err("plan has neither a description nor steps".to_string());
        }
        let steps = raw
            .steps
            .into_iter()
            .map(|s| -> Result<PlanStep, String> {
                let executor = match s.executor.as_str() {
                    "tool" => ExecutorKind::Tool,
                    "skill" => ExecutorKind::Skill,
                    "completion" => ExecutorKind::Completion,
                    "litellm" => ExecutorKind::Litellm,
                    other => return Err(format!("unknown executor kind '{other}'")),
                };
                Ok(PlanStep {
                    id: s.id,
                    label: s.label,
                    executor,
                    target: s.action,
                    args: s.args,
                    depends_on: s.depends_on.into_iter().collect(),
                    retry_feedback: None,
                    retries_used: 0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Plan {
            description: raw.description,
            steps,
            warnings: Vec::new(),
        })
    }

    /// Runs the deterministic skeleton of §4.4: build prompt, call LLM,
    /// extract JSON, validate, retry with feedback, and fall back to a
    /// conversational or explanatory plan once retries are exhausted.
    pub async fn plan(
        &self,
        request: &AgentRequest,
        history: &[Message],
        tool_catalogue: &[(String, String)],
        skill_catalogue: &[(String, String)],
    ) -> Plan {
        let mut feedback: Option<String> = None;
        let mut last_raw = String::new();

        for _attempt in 0..=self.max_retries {
            let messages = self.build_prompt(request, history, tool_catalogue, skill_catalogue, feedback.as_deref());
            let raw = match self.llm.complete_json(&messages).await {
                Ok(text) => text,
                Err(e) => {
                    feedback = Some(e.to_string());
                    continue;
                }
            };
            last_raw = raw.clone();
            let Some(fragment) = extract_json_fragment(&raw) else {
                feedback = Some("no JSON object found in the output".to_string());
                continue;
            };
            match self.parse(&fragment) {
                Ok(plan) => return plan,
                Err(e) => feedback = Some(e),
            }
        }

        if Self::looks_conversational(&request.prompt) || Self::looks_like_prompt_echo(&last_raw) {
            Plan::conversational("conversational response")
        } else {
            let mut plan = Plan::empty_failed(format!(
                "planning failed after {} attempts: {}",
                self.max_retries + 1,
                feedback.unwrap_or_default()
            ));
            plan.warnings.push("planner exhausted its retry budget".to_string());
            plan
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use std::collections::HashMap;

    fn request(prompt: &str) -> AgentRequest {
        AgentRequest {
            prompt: prompt.to_string(),
            conversation_id: "conv-1".to_string(),
            metadata: HashMap::new(),
            messages: None,
        }
    }

    #[tokio::test]
    async fn greeting_prompts_produce_a_conversational_plan() {
        let llm = Arc::new(MockLlmClient::with_json_plans(vec!["not json".to_string(); 4]));
        let planner = Planner::new(llm, 3, 8000);
        for greeting in ["Hello", "Hi", "thanks"] {
            let plan = planner.plan(&request(greeting), &[], &[], &[]).await;
            assert!(plan.is_conversational(), "expected conversational plan for {greeting}");
        }
    }

    #[tokio::test]
    async fn valid_plan_json_is_parsed() {
        let json = r#"Sure, here you go:
        {"description": "fetch and summarize", "steps": [
            {"id": "s1", "label": "fetch", "executor": "tool", "tool": "web_fetch", "args": {"url": "https://example.com"}, "depends_on": []}
        ]}
        Hope that helps!"#;
        let llm = Arc::new(MockLlmClient::with_json_plans(vec![json.to_string()]));
        let planner = Planner::new(llm, 3, 8000);
        let plan = planner.plan(&request("summarize example.com"), &[], &[], &[]).await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].target.as_deref(), Some("web_fetch"));
    }

    #[tokio::test]
    async fn exhausted_retries_on_non_conversational_input_yields_zero_step_plan() {
        let llm = Arc::new(MockLlmClient::with_json_plans(vec!["garbage".to_string(); 4]));
        let planner = Planner::new(llm, 3, 8000);
        let plan = planner
            .plan(&request("orchestrate a twelve-step supply chain migration"), &[], &[], &[])
            .await;
        assert!(plan.steps.is_empty());
        assert!(!plan.description.is_empty());
    }
}
